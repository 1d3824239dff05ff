//! Negated conjunctions: NCC node and partner
//!
//! ```text
//!            anchor memory
//!           /             \
//!   inner joins ...     dummy join (placeholder fact)
//!          |                 |
//!     ncc partner ──────▶ ncc node ──▶ rest of the production
//! ```
//!
//! The NCC node owns one token per anchor token; that token is visible
//! downstream only while its result list is empty. The partner turns each
//! inner match into a result of the NCC token found by stripping `levels`
//! links off the match, or buffers it until that NCC token exists.

use crate::error::ReteResult;
use crate::network::{Network, NodeId};
use ahash::AHashMap;
use ripple_types::{FactId, TokenId};
use tracing::debug;

#[derive(Debug)]
pub struct NccNode {
    pub id: NodeId,
    /// The dummy join feeding this node
    pub parent: NodeId,
    pub partner: NodeId,
    pub items: Vec<TokenId>,
    /// Inner matches blocking each token
    pub results: AHashMap<TokenId, Vec<TokenId>>,
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
pub struct NccPartner {
    pub id: NodeId,
    /// Last emitter of the inner chain
    pub parent: NodeId,
    pub ncc: NodeId,
    /// Number of inner conditions
    pub levels: usize,
    /// Inner matches whose NCC token does not exist yet
    pub buffer: Vec<TokenId>,
}

impl Network {
    /// NCC token anchored at `owner`, if any
    fn ncc_token_for(&self, ncc: NodeId, owner: Option<TokenId>) -> ReteResult<Option<TokenId>> {
        for token in &self.ncc(ncc)?.items {
            if self.tokens.get(*token)?.parent == owner {
                return Ok(Some(*token));
            }
        }
        Ok(None)
    }

    /// Links of the tokens currently passed downstream
    pub(crate) fn ncc_visible_links(
        &self,
        ncc: NodeId,
    ) -> ReteResult<Vec<(Option<TokenId>, FactId)>> {
        let node = self.ncc(ncc)?;
        let mut links = Vec::new();
        for token in &node.items {
            if node.results.get(token).is_none_or(|r| r.is_empty()) {
                let link = self.tokens.get(*token)?;
                links.push((link.parent, link.fact));
            }
        }
        Ok(links)
    }

    pub(crate) fn ncc_activate(
        &mut self,
        ncc: NodeId,
        parent: Option<TokenId>,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        if is_add {
            let token = self.tokens.create(parent, fact)?;
            let partner_id = self.ncc(ncc)?.partner;
            let partner = self.partner(partner_id)?;
            let levels = partner.levels;
            let mut results = Vec::new();
            let mut waiting = Vec::new();
            for inner in partner.buffer.iter().copied() {
                if self.tokens.ancestor(Some(inner), levels)? == parent {
                    results.push(inner);
                } else {
                    waiting.push(inner);
                }
            }
            self.partner_mut(partner_id)?.buffer = waiting;

            let blocked = !results.is_empty();
            let node = self.ncc_mut(ncc)?;
            node.items.insert(0, token);
            node.results.insert(token, results);
            if blocked {
                debug!(ncc_node = %ncc, token_id = %token, "Negated conjunction already matched");
            } else {
                self.emit(ncc, parent, fact, true)?;
            }
            return Ok(());
        }

        let node = self.ncc(ncc)?;
        let found = node.items.iter().copied().find(|t| self.tokens.is_link(*t, parent, fact));
        let Some(token) = found else {
            debug!(ncc_node = %ncc, fact_id = %fact, "No NCC token to remove");
            return Ok(());
        };
        let blocked = node.results.get(&token).is_some_and(|r| !r.is_empty());
        if !blocked {
            self.emit(ncc, parent, fact, false)?;
        }
        let node = self.ncc_mut(ncc)?;
        node.items.retain(|t| *t != token);
        let returned = node.results.remove(&token).unwrap_or_default();
        let partner = node.partner;
        self.partner_mut(partner)?.buffer.extend(returned);
        self.tokens.remove(token)?;
        Ok(())
    }

    pub(crate) fn partner_activate(
        &mut self,
        partner: NodeId,
        parent: Option<TokenId>,
        fact: FactId,
        is_add: bool,
    ) -> ReteResult<()> {
        let node = self.partner(partner)?;
        let ncc = node.ncc;
        let levels = node.levels;
        let owner = self.tokens.ancestor(parent, levels - 1)?;
        let owner_token = self.ncc_token_for(ncc, owner)?;
        let dummy = self.dummy_fact;

        if is_add {
            let inner = self.tokens.create(parent, fact)?;
            match owner_token {
                Some(owner_token) => {
                    let results = self.ncc_mut(ncc)?.results.entry(owner_token).or_default();
                    results.push(inner);
                    if results.len() == 1 {
                        debug!(ncc_node = %ncc, token_id = %owner_token, "Negation became false");
                        self.emit(ncc, owner, dummy, false)?;
                    }
                }
                None => self.partner_mut(partner)?.buffer.push(inner),
            }
            return Ok(());
        }

        if let Some(owner_token) = owner_token {
            let results = self.ncc(ncc)?.results.get(&owner_token);
            let found = results
                .and_then(|r| r.iter().copied().find(|t| self.tokens.is_link(*t, parent, fact)));
            if let Some(inner) = found {
                let results = self.ncc_mut(ncc)?.results.entry(owner_token).or_default();
                results.retain(|t| *t != inner);
                if results.is_empty() {
                    debug!(ncc_node = %ncc, token_id = %owner_token, "Negation became true");
                    self.emit(ncc, owner, dummy, true)?;
                }
                self.tokens.remove(inner)?;
                return Ok(());
            }
        }

        let buffer = &self.partner(partner)?.buffer;
        let found = buffer.iter().copied().find(|t| self.tokens.is_link(*t, parent, fact));
        match found {
            Some(inner) => {
                self.partner_mut(partner)?.buffer.retain(|t| *t != inner);
                self.tokens.remove(inner)?;
            }
            None => {
                debug!(ncc_partner = %partner, fact_id = %fact, "No inner match to remove");
            }
        }
        Ok(())
    }
}

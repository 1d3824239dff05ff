//! Tokens: immutable, parent-linked chains of facts
//!
//! A token at depth `d` holds the fact matched by condition `d - 1` and
//! points at the token for the first `d - 1` conditions. Tokens are never
//! mutated after creation; children share their parent. The store owns
//! every live token and hands out [`TokenId`]s, which nodes keep in their
//! memories. The node that created a token is the only one that deletes it.

use crate::error::{ReteError, ReteResult};
use ahash::AHashMap;
use ripple_types::{FactId, TokenId};

/// One link of a partial match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub parent: Option<TokenId>,
    pub fact: FactId,
    pub depth: usize,
}

/// Owner of all live tokens of one engine
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: AHashMap<TokenId, Token>,
    next_id: u64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend `parent` (or the empty chain) by `fact`
    pub fn create(&mut self, parent: Option<TokenId>, fact: FactId) -> ReteResult<TokenId> {
        let depth = self.depth(parent)? + 1;
        self.next_id += 1;
        let id = TokenId(self.next_id);
        self.tokens.insert(id, Token { parent, fact, depth });
        Ok(id)
    }

    pub fn get(&self, id: TokenId) -> ReteResult<&Token> {
        self.tokens.get(&id).ok_or(ReteError::MissingToken { token_id: id })
    }

    pub fn remove(&mut self, id: TokenId) -> ReteResult<Token> {
        self.tokens.remove(&id).ok_or(ReteError::MissingToken { token_id: id })
    }

    pub fn contains(&self, id: TokenId) -> bool {
        self.tokens.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Chain length; the empty chain has depth 0
    pub fn depth(&self, token: Option<TokenId>) -> ReteResult<usize> {
        match token {
            Some(id) => Ok(self.get(id)?.depth),
            None => Ok(0),
        }
    }

    /// Whether `token` is exactly the link `(parent, fact)`
    pub fn is_link(&self, token: TokenId, parent: Option<TokenId>, fact: FactId) -> bool {
        self.tokens.get(&token).is_some_and(|t| t.parent == parent && t.fact == fact)
    }

    /// Fact matched by condition `index` (0-based) of the chain
    pub fn fact_at(&self, token: Option<TokenId>, index: usize) -> ReteResult<FactId> {
        let depth = self.depth(token)?;
        if index >= depth {
            return Err(ReteError::TokenIndexOutOfBounds { index, depth });
        }
        let target = self.ancestor(token, depth - 1 - index)?;
        match target {
            Some(id) => Ok(self.get(id)?.fact),
            None => Err(ReteError::TokenIndexOutOfBounds { index, depth }),
        }
    }

    /// Walk `levels` parent links up from `start`
    pub fn ancestor(&self, start: Option<TokenId>, levels: usize) -> ReteResult<Option<TokenId>> {
        let depth = self.depth(start)?;
        if levels > depth {
            return Err(ReteError::TokenIndexOutOfBounds { index: levels, depth });
        }
        let mut current = start;
        for _ in 0..levels {
            current = match current {
                Some(id) => self.get(id)?.parent,
                None => None,
            };
        }
        Ok(current)
    }

    /// Facts of the chain, first condition first
    pub fn chain(&self, token: Option<TokenId>) -> ReteResult<Vec<FactId>> {
        let mut facts = Vec::with_capacity(self.depth(token)?);
        let mut current = token;
        while let Some(id) = current {
            let link = self.get(id)?;
            facts.push(link.fact);
            current = link.parent;
        }
        facts.reverse();
        Ok(facts)
    }
}

//! Interned tokens and per-item token sequences.
//!
//! A [`Token`] is a small `Copy` value: the vocabulary hands out copies and
//! items keep their own, so scoring never needs to touch the vocabulary.
//!
//! A [`TokenSequence`] builds its token → positions map eagerly at
//! construction. The map is immutable afterwards, which lets any number of
//! scoring tasks read it concurrently without synchronisation.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Process-wide token identifier. Never reused within a vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u32);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default relevance weight of a token.
pub const DEFAULT_WEIGHT: f32 = 1.0;

/// An interned token: id, text length in characters, relevance weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub id: TokenId,
    pub len: u32,
    pub weight: f32,
}

impl Token {
    #[must_use]
    pub const fn new(id: TokenId, len: u32, weight: f32) -> Self {
        Self { id, len, weight }
    }

    /// `true` when the weight differs from [`DEFAULT_WEIGHT`] enough to be
    /// worth persisting.
    #[must_use]
    pub fn has_custom_weight(&self) -> bool {
        (self.weight - DEFAULT_WEIGHT).abs() > 0.0001
    }
}

/// Ordered token occurrences of one item plus the derived position map.
#[derive(Debug, Clone, Default)]
pub struct TokenSequence {
    tokens: Vec<Token>,
    positions: HashMap<TokenId, Vec<usize>>,
}

impl TokenSequence {
    /// Build a sequence and its position map.
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut positions: HashMap<TokenId, Vec<usize>> = HashMap::new();
        for (i, token) in tokens.iter().enumerate() {
            positions.entry(token.id).or_default().push(i);
        }
        Self { tokens, positions }
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Total token count, repetitions included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of distinct token ids.
    #[must_use]
    pub fn distinct_count(&self) -> usize {
        self.positions.len()
    }

    /// Sorted occurrence positions of `id`, if the sequence contains it.
    #[must_use]
    pub fn positions(&self, id: TokenId) -> Option<&[usize]> {
        self.positions.get(&id).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, id: TokenId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Distinct tokens in order of first occurrence.
    #[must_use]
    pub fn distinct(&self) -> Vec<Token> {
        let mut seen = HashSet::with_capacity(self.positions.len());
        self.tokens
            .iter()
            .filter(|t| seen.insert(t.id))
            .copied()
            .collect()
    }

    /// Token ids in sequence order, the compact persisted form.
    #[must_use]
    pub fn ids(&self) -> Vec<TokenId> {
        self.tokens.iter().map(|t| t.id).collect()
    }
}

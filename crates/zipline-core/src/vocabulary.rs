//! Token interning shared by every cluster of an engine.
//!
//! The vocabulary only grows: ids are handed out sequentially and never
//! reused. Interning needs `&mut self`, so it can only happen while the
//! orchestrator tokenizes an item, strictly before scoring fans out. Scoring
//! reads the token copies held by items and never touches the vocabulary.
//!
//! # Token weights
//!
//! Weights come from the configured `weighted_tokens` patterns, evaluated once
//! at interning time: the largest matching weight, scaled by
//! `max(1, ln(text length))`. Evaluation is bounded. A pattern that exceeds
//! the compile budget is dropped and a token longer than
//! [`MAX_WEIGHTED_TOKEN_CHARS`] is not evaluated; both cases log a warning and
//! fall back to [`DEFAULT_WEIGHT`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ClusterError;
use crate::lexer::Tokenizer;
use crate::token::{DEFAULT_WEIGHT, Token, TokenId, TokenSequence};

/// Compiled-size budget of a single weighted-token pattern, in bytes.
pub const PATTERN_SIZE_LIMIT: usize = 256 * 1024;

/// Tokens longer than this are not matched against weighted patterns.
pub const MAX_WEIGHTED_TOKEN_CHARS: usize = 1024;

// ---------------------------------------------------------------------------
// Weighting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct TokenWeigher {
    patterns: Vec<(Regex, f32)>,
}

impl TokenWeigher {
    fn new(weighted_tokens: &BTreeMap<String, f32>) -> Self {
        let mut patterns = Vec::with_capacity(weighted_tokens.len());
        for (pattern, weight) in weighted_tokens {
            let core = pattern.strip_prefix('^').unwrap_or(pattern);
            let core = core.strip_suffix('$').unwrap_or(core);
            let anchored = format!("^(?:{core})$");

            match RegexBuilder::new(&anchored)
                .size_limit(PATTERN_SIZE_LIMIT)
                .dfa_size_limit(PATTERN_SIZE_LIMIT)
                .build()
            {
                Ok(regex) => patterns.push((regex, *weight)),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "weighted token pattern skipped, its tokens use weight 1.0");
                }
            }
        }
        Self { patterns }
    }

    fn weight(&self, text: &str) -> f32 {
        if self.patterns.is_empty() {
            return DEFAULT_WEIGHT;
        }

        let len = text.chars().count();
        if len > MAX_WEIGHTED_TOKEN_CHARS {
            warn!(len, "token weight evaluation skipped for oversized token, assigning weight=1.0");
            return DEFAULT_WEIGHT;
        }

        self.patterns
            .iter()
            .filter(|(regex, _)| regex.is_match(text))
            .map(|(_, weight)| *weight)
            .reduce(f32::max)
            .map_or(DEFAULT_WEIGHT, |w| w * (len as f32).ln().max(1.0))
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// Compact persisted form of a token: `id|len` or `id|len|weight`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenRecord(pub Token);

impl fmt::Display for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.0;
        if t.has_custom_weight() {
            write!(f, "{}|{}|{}", t.id, t.len, t.weight)
        } else {
            write!(f, "{}|{}", t.id, t.len)
        }
    }
}

impl FromStr for TokenRecord {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ClusterError::Persistence(format!("malformed token record '{s}'"));
        let mut parts = s.split('|');
        let id = parts.next().ok_or_else(bad)?.parse::<u32>().map_err(|_| bad())?;
        let len = parts.next().ok_or_else(bad)?.parse::<u32>().map_err(|_| bad())?;
        let weight = match parts.next() {
            Some(w) => w.parse::<f32>().map_err(|_| bad())?,
            None => DEFAULT_WEIGHT,
        };
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(Self(Token::new(TokenId(id), len, weight)))
    }
}

impl TryFrom<String> for TokenRecord {
    type Error = ClusterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TokenRecord> for String {
    fn from(record: TokenRecord) -> Self {
        record.to_string()
    }
}

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Entry {
    token: Token,
    text: String,
}

/// Interns token text to stable ids and weights.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    by_text: HashMap<String, TokenId>,
    by_id: HashMap<TokenId, Entry>,
    next_id: u32,
    weigher: TokenWeigher,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(&BTreeMap::new())
    }
}

impl Vocabulary {
    #[must_use]
    pub fn new(weighted_tokens: &BTreeMap<String, f32>) -> Self {
        Self {
            by_text: HashMap::new(),
            by_id: HashMap::new(),
            next_id: 1,
            weigher: TokenWeigher::new(weighted_tokens),
        }
    }

    /// Rebuild a vocabulary from its persisted records.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::InconsistentState`] if two texts claim the
    /// same id or one text appears twice under different casing.
    pub fn from_records(
        records: &BTreeMap<String, TokenRecord>,
        weighted_tokens: &BTreeMap<String, f32>,
    ) -> Result<Self, ClusterError> {
        let mut vocab = Self::new(weighted_tokens);
        for (text, record) in records {
            let token = record.0;
            let key = text.to_lowercase();
            if vocab.by_text.insert(key, token.id).is_some() {
                return Err(ClusterError::InconsistentState(format!(
                    "vocabulary text '{text}' appears twice"
                )));
            }
            let previous = vocab.by_id.insert(
                token.id,
                Entry {
                    token,
                    text: text.clone(),
                },
            );
            if previous.is_some() {
                return Err(ClusterError::InconsistentState(format!(
                    "vocabulary id {} is assigned to more than one text",
                    token.id
                )));
            }
            vocab.next_id = vocab.next_id.max(token.id.0 + 1);
        }
        Ok(vocab)
    }

    /// Persisted records, keyed by token text.
    #[must_use]
    pub fn records(&self) -> BTreeMap<String, TokenRecord> {
        self.by_id
            .values()
            .map(|e| (e.text.clone(), TokenRecord(e.token)))
            .collect()
    }

    /// Return the token for `text`, creating it on first sight.
    ///
    /// Lookup is case-insensitive; the first spelling seen is kept as text.
    pub fn intern(&mut self, text: &str) -> Token {
        let key = text.to_lowercase();
        if let Some(entry) = self.by_text.get(&key).and_then(|id| self.by_id.get(id)) {
            return entry.token;
        }

        let id = TokenId(self.next_id);
        self.next_id += 1;
        let len = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        let token = Token::new(id, len, self.weigher.weight(text));

        self.by_text.insert(key, id);
        self.by_id.insert(
            id,
            Entry {
                token,
                text: text.to_string(),
            },
        );
        token
    }

    /// Look up a token by id.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::TokenNotFound`] for ids this vocabulary never
    /// issued.
    pub fn resolve(&self, id: TokenId) -> Result<Token, ClusterError> {
        self.by_id
            .get(&id)
            .map(|e| e.token)
            .ok_or(ClusterError::TokenNotFound { id })
    }

    #[must_use]
    pub fn text_of(&self, id: TokenId) -> Option<&str> {
        self.by_id.get(&id).map(|e| e.text.as_str())
    }

    /// Split `content` and intern every piece, in order.
    pub fn tokenize(&mut self, tokenizer: &dyn Tokenizer, content: &str) -> TokenSequence {
        let tokens = tokenizer
            .split(content)
            .into_iter()
            .map(|text| self.intern(text))
            .collect();
        TokenSequence::new(tokens)
    }

    /// Resolve a persisted id list back into a sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::TokenNotFound`] for the first unknown id.
    pub fn sequence_of(&self, ids: &[TokenId]) -> Result<TokenSequence, ClusterError> {
        let tokens = ids
            .iter()
            .map(|id| self.resolve(*id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TokenSequence::new(tokens))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

//! Items submitted for clustering and their content hash.

use crate::token::TokenSequence;

const HASH_SUFFIX: &str = "|B3";

/// Format-stable dedup key of a piece of content.
///
/// Layout: the first three characters, 16 hex digits taken from the first
/// eight bytes of the BLAKE3 digest (little endian), the character count,
/// then `|B3`. Empty content hashes to `0|B3`.
#[must_use]
pub fn content_hash(content: &str) -> String {
    if content.is_empty() {
        return format!("0{HASH_SUFFIX}");
    }

    let digest = blake3::hash(content.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    let value = u64::from_le_bytes(head);

    let prefix: String = content.chars().take(3).collect();
    let len = content.chars().count();
    format!("{prefix}{value:016x}{len}{HASH_SUFFIX}")
}

/// One clustered unit of content.
///
/// The content itself is not retained: an item keeps its tokens, its
/// length and its hash. The hash is `None` only for items restored from a
/// state document that did not preserve it.
#[derive(Debug, Clone)]
pub struct ClusterItem {
    id: String,
    text_len: usize,
    hash: Option<String>,
    tokens: TokenSequence,
    affinity: f32,
    preserve_hash: bool,
}

impl ClusterItem {
    #[must_use]
    pub fn new(id: impl Into<String>, content: &str, tokens: TokenSequence) -> Self {
        Self {
            id: id.into(),
            text_len: content.chars().count(),
            hash: Some(content_hash(content)),
            tokens,
            affinity: 0.0,
            preserve_hash: true,
        }
    }

    /// Rebuild an item from persisted parts.
    #[must_use]
    pub(crate) fn restored(
        id: String,
        text_len: usize,
        hash: Option<String>,
        tokens: TokenSequence,
        affinity: f32,
    ) -> Self {
        let preserve_hash = hash.is_some();
        Self {
            id,
            text_len,
            hash,
            tokens,
            affinity,
            preserve_hash,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Content length in characters.
    #[must_use]
    pub const fn text_len(&self) -> usize {
        self.text_len
    }

    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenSequence {
        &self.tokens
    }

    /// Affinity the item was admitted with; 0 before admission.
    #[must_use]
    pub const fn affinity(&self) -> f32 {
        self.affinity
    }

    /// Whether the hash is written to the state document.
    ///
    /// Cleared when the owning cluster already caches an identical hash.
    #[must_use]
    pub const fn preserve_hash(&self) -> bool {
        self.preserve_hash
    }

    pub(crate) const fn set_affinity(&mut self, affinity: f32) {
        self.affinity = affinity;
    }

    pub(crate) const fn clear_preserve_hash(&mut self) {
        self.preserve_hash = false;
    }
}

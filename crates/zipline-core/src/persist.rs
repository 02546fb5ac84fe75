//! State document: structural snapshot plus an explicit finalize step.
//!
//! Decoding a document only rebuilds plain data ([`ClusteringSnapshot`]).
//! [`ClusteringSnapshot::finalize`] then re-resolves every token id against
//! the restored vocabulary, rebuilds the zip-chain trees, the hash caches and
//! the owner index, and hands back a usable [`Clustering`].
//!
//! Items persist their token ids, text length and admitted affinity; the
//! content hash is kept only for items that still preserve it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cluster::{Algorithm, Cluster, ClusterId, ClusterStatistics, LastItem};
use crate::clustering::Clustering;
use crate::config::ClusteringConfig;
use crate::error::Result;
use crate::item::ClusterItem;
use crate::lexer::{RegexLexer, Tokenizer};
use crate::token::TokenId;
use crate::vocabulary::{TokenRecord, Vocabulary};
use crate::zipchain::{NodeSnapshot, ZipChainIndex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSnapshot {
    pub config: ClusteringConfig,
    pub vocabulary: BTreeMap<String, TokenRecord>,
    pub clusters: Vec<ClusterSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub id: ClusterId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_from: Option<ClusterId>,

    pub statistics: ClusterStatistics,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_item: Option<LastItem>,

    pub items: BTreeMap<String, ItemSnapshot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub tokens: Vec<TokenId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    pub text_len: usize,
    pub affinity: f32,
}

impl ItemSnapshot {
    fn of(item: &ClusterItem) -> Self {
        Self {
            tokens: item.tokens().ids(),
            hash: item
                .preserve_hash()
                .then(|| item.hash().map(str::to_string))
                .flatten(),
            text_len: item.text_len(),
            affinity: item.affinity(),
        }
    }
}

impl ClusterSnapshot {
    fn of(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id(),
            split_from: cluster.split_from(),
            statistics: *cluster.statistics(),
            last_item: cluster.last_item().cloned(),
            items: cluster
                .items()
                .map(|i| (i.id().to_string(), ItemSnapshot::of(i)))
                .collect(),
            tree: cluster.index().snapshot(),
        }
    }

    fn restore(self, vocabulary: &Vocabulary) -> Result<Cluster> {
        let mut items = BTreeMap::new();
        for (id, item) in self.items {
            let tokens = vocabulary.sequence_of(&item.tokens)?;
            let restored =
                ClusterItem::restored(id.clone(), item.text_len, item.hash, tokens, item.affinity);
            items.insert(id, restored);
        }

        let index = match &self.tree {
            Some(tree) => ZipChainIndex::restore(tree, vocabulary)?,
            None => ZipChainIndex::new(),
        };

        Ok(Cluster::restored(
            self.id,
            self.split_from,
            self.statistics,
            items,
            self.last_item,
            Algorithm::ZipChain(index),
        ))
    }
}

impl ClusteringSnapshot {
    /// Build a working engine with the default regex lexer.
    ///
    /// # Errors
    ///
    /// - [`ClusterError::InvalidConfig`](crate::ClusterError::InvalidConfig)
    ///   for a persisted config that no longer validates.
    /// - [`ClusterError::TokenNotFound`](crate::ClusterError::TokenNotFound)
    ///   when an item or tree references a token the vocabulary lacks.
    /// - [`ClusterError::InconsistentState`](crate::ClusterError::InconsistentState)
    ///   for duplicate vocabulary entries or an item held by two clusters.
    pub fn finalize(self) -> Result<Clustering> {
        self.config.validate()?;
        let lexer = RegexLexer::new(&self.config.lexer_pattern)?;
        self.finalize_with_tokenizer(Box::new(lexer))
    }

    /// Same as [`finalize`](Self::finalize) with a host-provided tokenizer.
    ///
    /// # Errors
    ///
    /// See [`finalize`](Self::finalize).
    pub fn finalize_with_tokenizer(self, tokenizer: Box<dyn Tokenizer>) -> Result<Clustering> {
        self.config.validate()?;
        let vocabulary = Vocabulary::from_records(&self.vocabulary, &self.config.weighted_tokens)?;
        let clusters = self
            .clusters
            .into_iter()
            .map(|c| c.restore(&vocabulary))
            .collect::<Result<Vec<_>>>()?;
        Clustering::from_parts(self.config, vocabulary, clusters, tokenizer)
    }
}

impl Clustering {
    #[must_use]
    pub fn snapshot(&self) -> ClusteringSnapshot {
        ClusteringSnapshot {
            config: self.config().clone(),
            vocabulary: self.vocabulary().records(),
            clusters: self.clusters().iter().map(ClusterSnapshot::of).collect(),
        }
    }

    /// Encode the full engine state as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Persistence`](crate::ClusterError::Persistence)
    /// if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Decode and finalize a JSON state document.
    ///
    /// # Errors
    ///
    /// [`ClusterError::Persistence`](crate::ClusterError::Persistence) for a
    /// malformed document, otherwise the errors of
    /// [`ClusteringSnapshot::finalize`].
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: ClusteringSnapshot = serde_json::from_str(json)?;
        snapshot.finalize()
    }
}

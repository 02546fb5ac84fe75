//! A single cluster: members, running statistics and the algorithm index.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ClusteringConfig;
use crate::gate::{AffinityGate, GateOutcome};
use crate::item::ClusterItem;
use crate::stats::RunningStat;
use crate::zipchain::ZipChainIndex;

/// Upper bound on cached member hashes per cluster.
pub const HASH_CACHE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub Uuid);

impl ClusterId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Running statistics over every item ever admitted. Removal does not
/// retract samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatistics {
    pub text_length: RunningStat,
    pub token_count: RunningStat,
    pub affinity: RunningStat,
}

/// The most recently admitted item, by id, and the last hash seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastItem {
    pub id: String,
    pub hash: Option<String>,
}

/// What a cluster needs from its clustering algorithm.
pub trait ClusterAlgorithm: Send + Sync {
    /// Raw affinity of `item` to a cluster currently holding `item_count` items.
    fn affinity(&self, item: &ClusterItem, item_count: usize, config: &ClusteringConfig) -> f32;

    /// Fold an admitted item into the algorithm's model.
    fn admit(&mut self, item: &ClusterItem);
}

impl ClusterAlgorithm for ZipChainIndex {
    fn affinity(&self, item: &ClusterItem, item_count: usize, config: &ClusteringConfig) -> f32 {
        self.score(item.tokens(), item_count, config.min_cluster_affinity)
    }

    fn admit(&mut self, item: &ClusterItem) {
        self.append(&item.tokens().distinct());
        self.compact();
    }
}

/// Algorithms a cluster can be built on.
#[derive(Debug, Clone)]
pub enum Algorithm {
    ZipChain(ZipChainIndex),
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::ZipChain(ZipChainIndex::new())
    }
}

impl ClusterAlgorithm for Algorithm {
    fn affinity(&self, item: &ClusterItem, item_count: usize, config: &ClusteringConfig) -> f32 {
        match self {
            Self::ZipChain(index) => index.affinity(item, item_count, config),
        }
    }

    fn admit(&mut self, item: &ClusterItem) {
        match self {
            Self::ZipChain(index) => index.admit(item),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cluster {
    id: ClusterId,
    split_from: Option<ClusterId>,
    stats: ClusterStatistics,
    items: BTreeMap<String, ClusterItem>,
    hash_cache: HashSet<String>,
    last_item: Option<LastItem>,
    algorithm: Algorithm,
}

impl Cluster {
    #[must_use]
    pub fn new(id: ClusterId) -> Self {
        Self {
            id,
            split_from: None,
            stats: ClusterStatistics::default(),
            items: BTreeMap::new(),
            hash_cache: HashSet::new(),
            last_item: None,
            algorithm: Algorithm::default(),
        }
    }

    /// Reassemble a persisted cluster and rebuild its hash cache.
    pub(crate) fn restored(
        id: ClusterId,
        split_from: Option<ClusterId>,
        stats: ClusterStatistics,
        items: BTreeMap<String, ClusterItem>,
        last_item: Option<LastItem>,
        algorithm: Algorithm,
    ) -> Self {
        let mut cluster = Self {
            id,
            split_from,
            stats,
            items,
            hash_cache: HashSet::new(),
            last_item,
            algorithm,
        };
        cluster.fill_hash_cache();
        cluster
    }

    #[must_use]
    pub const fn id(&self) -> ClusterId {
        self.id
    }

    /// Reserved; never set by the clustering engine.
    #[must_use]
    pub const fn split_from(&self) -> Option<ClusterId> {
        self.split_from
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    #[must_use]
    pub fn item(&self, id: &str) -> Option<&ClusterItem> {
        self.items.get(id)
    }

    #[must_use]
    pub fn items(&self) -> impl Iterator<Item = &ClusterItem> {
        self.items.values()
    }

    /// Member ids in sorted order.
    #[must_use]
    pub fn item_ids(&self) -> Vec<&str> {
        self.items.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub const fn statistics(&self) -> &ClusterStatistics {
        &self.stats
    }

    #[must_use]
    pub const fn last_item(&self) -> Option<&LastItem> {
        self.last_item.as_ref()
    }

    #[must_use]
    pub const fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    #[must_use]
    pub const fn index(&self) -> &ZipChainIndex {
        match &self.algorithm {
            Algorithm::ZipChain(index) => index,
        }
    }

    /// Number of member hashes currently cached.
    #[must_use]
    pub fn cached_hashes(&self) -> usize {
        self.hash_cache.len()
    }

    /// A cluster is sharp once its affinities sit tightly above the minimum:
    /// `mean - sd > min_affinity`.
    #[must_use]
    pub fn is_sharp(&self, min_affinity: f32) -> bool {
        let affinity = &self.stats.affinity;
        affinity.mean() - affinity.standard_deviation() > f64::from(min_affinity)
    }

    /// Whether content with `hash` short-lists this cluster.
    #[must_use]
    pub fn matches_hash(&self, hash: &str, min_affinity: f32) -> bool {
        let last = self
            .last_item
            .as_ref()
            .and_then(|l| l.hash.as_deref())
            .is_some_and(|h| h == hash);
        last || (self.is_sharp(min_affinity) && self.hash_cache.contains(hash))
    }

    /// Run the admission gate for `item`.
    #[must_use]
    pub fn score(&self, item: &ClusterItem, config: &ClusteringConfig) -> GateOutcome {
        AffinityGate::new(config).admission_score(self, item)
    }

    /// Add `item` with the affinity it was accepted at.
    ///
    /// Returns `false`, changing nothing, when the id is already a member.
    pub(crate) fn admit(&mut self, mut item: ClusterItem, affinity: f32, min_affinity: f32) -> bool {
        if self.items.contains_key(item.id()) {
            return false;
        }

        self.stats.text_length.push(item.text_len() as f64);
        self.stats.token_count.push(item.tokens().len() as f64);
        self.stats.affinity.push(f64::from(affinity));

        let previous_hash = self.last_item.take().and_then(|l| l.hash);
        self.last_item = Some(LastItem {
            id: item.id().to_string(),
            hash: item.hash().map(str::to_string).or(previous_hash),
        });

        if let Some(hash) = item.hash().map(str::to_string)
            && self.is_sharp(min_affinity)
        {
            if self.hash_cache.is_empty() {
                self.fill_hash_cache();
            }
            if self.hash_cache.contains(&hash) {
                item.clear_preserve_hash();
            } else if self.hash_cache.len() < HASH_CACHE_CAPACITY {
                self.hash_cache.insert(hash);
            }
        }

        item.set_affinity(affinity);
        self.algorithm.admit(&item);
        self.items.insert(item.id().to_string(), item);
        true
    }

    /// Drop a member. Statistics and the index keep what it contributed.
    pub(crate) fn remove(&mut self, id: &str) -> Option<ClusterItem> {
        self.items.remove(id)
    }

    fn fill_hash_cache(&mut self) {
        let room = HASH_CACHE_CAPACITY.saturating_sub(self.hash_cache.len());
        let hashes: Vec<String> = self
            .items
            .values()
            .filter_map(|i| i.hash().map(str::to_string))
            .filter(|h| !self.hash_cache.contains(h))
            .collect::<HashSet<_>>()
            .into_iter()
            .take(room)
            .collect();
        self.hash_cache.extend(hashes);
    }
}

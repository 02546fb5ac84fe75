//! The clustering orchestrator.
//!
//! For every incoming item:
//!
//! 1. clusters whose last hash or (when sharp) hash cache knows the content
//!    are short-listed;
//! 2. a single short-listed cluster admits the item outright with affinity 1;
//! 3. otherwise the short list, or every cluster when it is empty, is scored
//!    through the admission gate, in parallel when there are several;
//! 4. the best candidate at or above `min_cluster_affinity` admits the item,
//!    else a new cluster is created for it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::cluster::{Cluster, ClusterId};
use crate::config::ClusteringConfig;
use crate::error::{ClusterError, Result};
use crate::gate::GateOutcome;
use crate::item::ClusterItem;
use crate::lexer::{RegexLexer, Tokenizer};
use crate::vocabulary::Vocabulary;

/// Candidate count above which scoring stops at the first exact match.
const EARLY_STOP_MIN_CANDIDATES: usize = 5;
const EXACT_MATCH_AFFINITY: f32 = 0.999_99;

/// Host callback receiving diagnostic lines when `log_debug` is on.
pub type LogHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmitPath {
    /// A single cluster already knew the content hash.
    HashShortcut,
    Scored,
}

/// Result of [`Clustering::add_item`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AddOutcome {
    /// The id is already a member of some cluster; nothing changed.
    AlreadyKnown,
    Admitted {
        cluster: ClusterId,
        affinity: f32,
        via: AdmitPath,
    },
    Created {
        cluster: ClusterId,
    },
}

impl AddOutcome {
    #[must_use]
    pub const fn cluster(&self) -> Option<ClusterId> {
        match self {
            Self::AlreadyKnown => None,
            Self::Admitted { cluster, .. } | Self::Created { cluster } => Some(*cluster),
        }
    }
}

pub struct Clustering {
    config: ClusteringConfig,
    vocabulary: Vocabulary,
    clusters: Vec<Cluster>,
    /// Item id -> index into `clusters`.
    owners: HashMap<String, usize>,
    tokenizer: Box<dyn Tokenizer>,
    pool: rayon::ThreadPool,
    log_hook: Option<LogHook>,
}

impl fmt::Debug for Clustering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clustering")
            .field("config", &self.config)
            .field("vocabulary", &self.vocabulary.len())
            .field("clusters", &self.clusters.len())
            .field("items", &self.owners.len())
            .field("workers", &self.pool.current_num_threads())
            .field("log_hook", &self.log_hook.is_some())
            .finish_non_exhaustive()
    }
}

impl Clustering {
    /// Engine with the default regex lexer.
    ///
    /// # Errors
    ///
    /// - [`ClusterError::InvalidConfig`] when `config` fails validation.
    /// - [`ClusterError::Unknown`] when the scoring pool cannot be started.
    pub fn new(config: ClusteringConfig) -> Result<Self> {
        config.validate()?;
        let lexer = RegexLexer::new(&config.lexer_pattern)?;
        Self::with_tokenizer(config, Box::new(lexer))
    }

    /// Engine with a host-provided tokenizer.
    ///
    /// # Errors
    ///
    /// Same as [`Clustering::new`].
    pub fn with_tokenizer(config: ClusteringConfig, tokenizer: Box<dyn Tokenizer>) -> Result<Self> {
        config.validate()?;
        let vocabulary = Vocabulary::new(&config.weighted_tokens);
        Self::from_parts(config, vocabulary, Vec::new(), tokenizer)
    }

    pub(crate) fn from_parts(
        config: ClusteringConfig,
        vocabulary: Vocabulary,
        clusters: Vec<Cluster>,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Result<Self> {
        let mut owners = HashMap::new();
        for (ix, cluster) in clusters.iter().enumerate() {
            for id in cluster.item_ids() {
                if owners.insert(id.to_string(), ix).is_some() {
                    return Err(ClusterError::InconsistentState(format!(
                        "item '{id}' belongs to more than one cluster"
                    )));
                }
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count())
            .thread_name(|i| format!("zipline-score-{i}"))
            .build()
            .map_err(|e| ClusterError::Unknown(format!("failed to start scoring pool: {e}")))?;

        Ok(Self {
            config,
            vocabulary,
            clusters,
            owners,
            tokenizer,
            pool,
            log_hook: None,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    #[must_use]
    pub const fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Clusters in creation order.
    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    #[must_use]
    pub const fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn cluster(&self, id: &ClusterId) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.id() == *id)
    }

    /// The cluster currently holding `item_id`.
    #[must_use]
    pub fn cluster_of(&self, item_id: &str) -> Option<&Cluster> {
        self.owners.get(item_id).map(|ix| &self.clusters[*ix])
    }

    /// Number of items across all clusters.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_known_item(&self, id: &str) -> bool {
        self.owners.contains_key(id)
    }

    /// Member ids of every cluster, sorted within each cluster.
    #[must_use]
    pub fn cluster_item_ids(&self) -> Vec<Vec<String>> {
        self.clusters
            .iter()
            .map(|c| c.item_ids().into_iter().map(str::to_string).collect())
            .collect()
    }

    /// Install (or clear) the diagnostic hook.
    pub fn set_log_hook(&mut self, hook: Option<LogHook>) {
        self.log_hook = hook;
    }

    /// Cluster one item.
    ///
    /// # Errors
    ///
    /// Currently infallible for well-formed engines; the `Result` leaves room
    /// for tokenizers and algorithms that can fail.
    pub fn add_item(&mut self, id: &str, content: &str) -> Result<AddOutcome> {
        if self.owners.contains_key(id) {
            return Ok(AddOutcome::AlreadyKnown);
        }

        let tokens = self.vocabulary.tokenize(self.tokenizer.as_ref(), content);
        let item = ClusterItem::new(id, content, tokens);
        let min_affinity = self.config.min_cluster_affinity;

        let shortlist: Vec<usize> = item.hash().map_or_else(Vec::new, |hash| {
            self.clusters
                .iter()
                .enumerate()
                .filter(|(_, c)| c.matches_hash(hash, min_affinity))
                .map(|(ix, _)| ix)
                .collect()
        });
        if !shortlist.is_empty() {
            self.diagnostic(&format!(
                "item {id}: clusters ({} of {}) found by hash",
                shortlist.len(),
                self.clusters.len()
            ));
        }

        let choice = if let [only] = shortlist.as_slice() {
            Some((*only, 1.0, AdmitPath::HashShortcut))
        } else {
            let candidates: Vec<usize> = if shortlist.is_empty() {
                (0..self.clusters.len()).collect()
            } else {
                shortlist
            };
            self.best_candidate(&item, &candidates)
                .filter(|(_, affinity)| *affinity >= min_affinity)
                .map(|(ix, affinity)| (ix, affinity, AdmitPath::Scored))
        };

        let outcome = if let Some((ix, affinity, via)) = choice {
            let cluster = &mut self.clusters[ix];
            cluster.admit(item, affinity, min_affinity);
            self.owners.insert(id.to_string(), ix);
            AddOutcome::Admitted {
                cluster: cluster.id(),
                affinity,
                via,
            }
        } else {
            let mut cluster = Cluster::new(ClusterId::generate());
            cluster.admit(item, 1.0, min_affinity);
            let cluster_id = cluster.id();
            self.clusters.push(cluster);
            self.owners.insert(id.to_string(), self.clusters.len() - 1);
            self.diagnostic(&format!("item {id}: created cluster {cluster_id}"));
            AddOutcome::Created {
                cluster: cluster_id,
            }
        };
        Ok(outcome)
    }

    /// Remove an item from its cluster.
    ///
    /// With a `cluster_hint`, only that cluster is considered. Statistics and
    /// the cluster's index keep what the item contributed.
    pub fn remove_item(&mut self, id: &str, cluster_hint: Option<&ClusterId>) -> bool {
        let Some(&ix) = self.owners.get(id) else {
            return false;
        };
        if cluster_hint.is_some_and(|hint| self.clusters[ix].id() != *hint) {
            return false;
        }
        self.owners.remove(id);
        self.clusters[ix].remove(id).is_some()
    }

    /// Best `(cluster index, affinity)` among `candidates`, if any scored above 0.
    fn best_candidate(&self, item: &ClusterItem, candidates: &[usize]) -> Option<(usize, f32)> {
        let scored = self.score_candidates(item, candidates);

        let mut best: Option<(usize, f32)> = None;
        let mut best_affinity = 0.0;
        for (ix, outcome) in scored {
            if self.config.log_debug
                && let Some(reason) = outcome.exclusion_reason(self.config.min_cluster_affinity)
            {
                self.diagnostic(&format!(
                    "item {}: cluster {} {reason}",
                    item.id(),
                    self.clusters[ix].id()
                ));
            }
            let affinity = outcome.affinity();
            if affinity > best_affinity {
                best_affinity = affinity;
                best = Some((ix, affinity));
            }
        }
        best
    }

    fn score_candidates(&self, item: &ClusterItem, candidates: &[usize]) -> Vec<(usize, GateOutcome)> {
        let clusters = &self.clusters;
        let config = &self.config;

        if let [only] = candidates {
            return vec![(*only, clusters[*only].score(item, config))];
        }

        let early_stop = candidates.len() > EARLY_STOP_MIN_CANDIDATES;
        let exact_found = AtomicBool::new(false);
        self.pool.install(|| {
            candidates
                .par_iter()
                .filter_map(|&ix| {
                    if early_stop && exact_found.load(Ordering::Relaxed) {
                        return None;
                    }
                    let outcome = clusters[ix].score(item, config);
                    if early_stop && outcome.affinity() > EXACT_MATCH_AFFINITY {
                        exact_found.store(true, Ordering::Relaxed);
                    }
                    Some((ix, outcome))
                })
                .collect()
        })
    }

    fn diagnostic(&self, line: &str) {
        if !self.config.log_debug {
            return;
        }
        debug!("{line}");
        if let Some(hook) = &self.log_hook {
            hook(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::item::content_hash;

    fn engine() -> Clustering {
        Clustering::new(ClusteringConfig::default()).expect("engine")
    }

    /// Eight words that share nothing with any other template.
    fn template(i: usize) -> String {
        (0..8).map(|j| format!("k{i}x{j}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn identical_content_joins_through_the_hash_shortcut() {
        let mut engine = engine();
        let first = engine.add_item("x1", "disk full on node seven").expect("add");
        assert!(matches!(first, AddOutcome::Created { .. }));

        let second = engine.add_item("x2", "disk full on node seven").expect("add");
        assert_eq!(
            second,
            AddOutcome::Admitted {
                cluster: first.cluster().expect("cluster"),
                affinity: 1.0,
                via: AdmitPath::HashShortcut,
            }
        );
        assert_eq!(engine.cluster_count(), 1);
        assert_eq!(engine.item_count(), 2);
    }

    #[test]
    fn known_ids_are_ignored() {
        let mut engine = engine();
        engine.add_item("x1", "alpha beta gamma").expect("add");
        let again = engine.add_item("x1", "entirely different words").expect("add");
        assert_eq!(again, AddOutcome::AlreadyKnown);
        assert_eq!(engine.cluster_count(), 1);
        assert_eq!(engine.cluster_item_ids(), vec![vec!["x1".to_string()]]);
    }

    #[test]
    fn unrelated_content_starts_a_new_cluster() {
        let mut engine = engine();
        engine.add_item("a", &template(0)).expect("add");
        let outcome = engine.add_item("b", &template(1)).expect("add");
        assert!(matches!(outcome, AddOutcome::Created { .. }));
        assert_eq!(engine.cluster_count(), 2);
    }

    #[test]
    fn near_duplicates_are_scored_across_many_clusters() {
        let mut engine = engine();
        for i in 0..7 {
            engine.add_item(&format!("t{i}"), &template(i)).expect("add");
        }
        assert_eq!(engine.cluster_count(), 7);

        let near = template(3).replace("k3x7", "zzzz");
        let outcome = engine.add_item("near", &near).expect("add");
        let AddOutcome::Admitted {
            cluster,
            affinity,
            via,
        } = outcome
        else {
            panic!("expected admission, got {outcome:?}");
        };
        assert_eq!(via, AdmitPath::Scored);
        assert!((0.75..1.0).contains(&affinity), "{affinity}");
        assert_eq!(engine.cluster_of("t3").map(Cluster::id), Some(cluster));
        assert_eq!(engine.cluster_count(), 7);
    }

    #[test]
    fn cached_hashes_shortcut_after_other_content_was_admitted() {
        let mut engine = engine();
        let content = "connection reset by peer";
        for id in ["a1", "a2", "a3"] {
            engine.add_item(id, content).expect("add");
        }

        let tokens = engine
            .vocabulary
            .tokenize(engine.tokenizer.as_ref(), "connection refused by peer");
        let other = ClusterItem::new("b1", "connection refused by peer", tokens);
        engine.clusters[0].admit(other, 1.0, 0.75);
        engine.owners.insert("b1".into(), 0);

        let outcome = engine.add_item("a4", content).expect("add");
        assert!(matches!(
            outcome,
            AddOutcome::Admitted {
                via: AdmitPath::HashShortcut,
                ..
            }
        ));
    }

    #[test]
    fn exact_token_match_stops_scoring_early() {
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&lines);
        let config = ClusteringConfig {
            log_debug: true,
            max_parallelism: 1,
            ..ClusteringConfig::default()
        };
        let mut engine = Clustering::new(config).expect("engine");

        engine.add_item("t0", &template(0)).expect("add");
        for i in 1..7 {
            let long = (0..30).map(|j| format!("f{i}w{j}")).collect::<Vec<_>>().join(" ");
            engine.add_item(&format!("f{i}"), &long).expect("add");
        }
        assert_eq!(engine.cluster_count(), 7);

        engine.set_log_hook(Some(Arc::new(move |line| {
            sink.lock().expect("lock").push(line.to_string());
        })));
        // same tokens, different content hash
        let outcome = engine.add_item("upper", &template(0).to_uppercase()).expect("add");
        let AddOutcome::Admitted {
            cluster,
            affinity,
            via,
        } = outcome
        else {
            panic!("expected admission, got {outcome:?}");
        };
        assert_eq!(via, AdmitPath::Scored);
        assert!(affinity > EXACT_MATCH_AFFINITY, "{affinity}");
        assert_eq!(engine.cluster_of("t0").map(Cluster::id), Some(cluster));

        let lines = lines.lock().expect("lock");
        assert!(!lines.iter().any(|l| l.contains("found by hash")), "{lines:?}");
        let excluded = lines.iter().filter(|l| l.contains("excluded for")).count();
        assert!(excluded < 6, "{lines:?}");
    }

    #[test]
    fn clusters_that_lose_sharpness_ignore_cached_hashes() {
        let mut engine = engine();
        let content = "connection reset by peer";
        engine.add_item("a1", content).expect("add");
        engine.add_item("a2", content).expect("add");
        assert!(engine.clusters[0].is_sharp(0.75));

        let tokens = engine
            .vocabulary
            .tokenize(engine.tokenizer.as_ref(), "connection refused by peer");
        let other = ClusterItem::new("b1", "connection refused by peer", tokens);
        let hash = content_hash(content);
        // affinities 1.0, 1.0, 0.3: mean - sd ≈ 0.36
        engine.clusters[0].admit(other, 0.3, 0.75);
        engine.owners.insert("b1".into(), 0);

        let cluster = &engine.clusters[0];
        assert!(!cluster.is_sharp(0.75));
        assert!(cluster.cached_hashes() > 0);
        assert!(!cluster.matches_hash(&hash, 0.75));

        let outcome = engine.add_item("a3", content).expect("add");
        assert!(
            !matches!(
                outcome,
                AddOutcome::Admitted {
                    via: AdmitPath::HashShortcut,
                    ..
                }
            ),
            "{outcome:?}"
        );
        assert!(engine.is_known_item("a3"));
    }

    #[test]
    fn removal_respects_the_cluster_hint() {
        let mut engine = engine();
        engine.add_item("a", &template(0)).expect("add");
        engine.add_item("b", &template(1)).expect("add");
        let a_cluster = engine.cluster_of("a").map(Cluster::id).expect("a");
        let b_cluster = engine.cluster_of("b").map(Cluster::id).expect("b");

        assert!(!engine.remove_item("a", Some(&b_cluster)));
        assert!(engine.is_known_item("a"));
        assert!(engine.remove_item("a", Some(&a_cluster)));
        assert!(!engine.is_known_item("a"));
        assert!(!engine.remove_item("a", None));
        assert!(engine.remove_item("b", None));
        assert_eq!(engine.item_count(), 0);
    }

    #[test]
    fn removed_ids_can_be_added_again() {
        let mut engine = engine();
        engine.add_item("a", &template(0)).expect("add");
        engine.remove_item("a", None);
        let outcome = engine.add_item("a", &template(0)).expect("add");
        assert_ne!(outcome, AddOutcome::AlreadyKnown);
        assert!(engine.is_known_item("a"));
    }

    #[test]
    fn log_hook_only_fires_with_log_debug() {
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&lines);
        let hook: LogHook = Arc::new(move |line| {
            sink.lock().expect("lock").push(line.to_string());
        });

        let mut quiet = engine();
        quiet.set_log_hook(Some(Arc::clone(&hook)));
        quiet.add_item("a", "same words").expect("add");
        quiet.add_item("b", "same words").expect("add");
        assert!(lines.lock().expect("lock").is_empty());

        let config = ClusteringConfig {
            log_debug: true,
            ..ClusteringConfig::default()
        };
        let mut chatty = Clustering::new(config).expect("engine");
        chatty.set_log_hook(Some(hook));
        chatty.add_item("a", "same words").expect("add");
        chatty.add_item("b", "same words").expect("add");

        let lines = lines.lock().expect("lock");
        assert!(lines.iter().any(|l| l.contains("created cluster")), "{lines:?}");
        assert!(lines.iter().any(|l| l.contains("(1 of 1) found by hash")), "{lines:?}");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ClusteringConfig {
            min_cluster_affinity: 0.0,
            ..ClusteringConfig::default()
        };
        let err = Clustering::new(config).expect_err("invalid");
        assert!(matches!(err, ClusterError::InvalidConfig(_)));
    }

    #[test]
    fn duplicate_members_across_clusters_are_inconsistent() {
        let mut engine = engine();
        engine.add_item("a", &template(0)).expect("add");
        let mut clusters = engine.clusters.clone();
        clusters.push(engine.clusters[0].clone());
        let err = Clustering::from_parts(
            ClusteringConfig::default(),
            Vocabulary::default(),
            clusters,
            Box::new(RegexLexer::new(crate::config::STANDARD_LEXER_PATTERN).expect("lexer")),
        )
        .expect_err("duplicate member");
        assert!(matches!(err, ClusterError::InconsistentState(_)));
    }
}

//! Statistical admission gate around the clustering algorithm.
//!
//! Before an item is scored, its text length and token count must fall
//! inside a confidence range around the cluster's running means. After
//! scoring, clusters large enough to have a meaningful affinity history
//! rescale scores that are unusually low for them.
//!
//! # Confidence test
//!
//! ```text
//! range = ci_range(ceil(sqrt(count)), max(min_sd, sd) * factor, P05)
//! ```
//!
//! For *macro* statistics (length, token count) the range is capped at
//! `mean * (1 - min_affinity) * factor` when it exceeds the mean, and never
//! narrower than `mean * (1 - min_affinity) * min_affinity` otherwise.
//!
//! A value outside `mean ± range` is rejected. A value above the mean passes
//! unchanged; one below is scaled by `2 * (1 - p(|v - mean| / 2sd))`.

use serde::Serialize;

use crate::cluster::{Cluster, ClusterAlgorithm};
use crate::config::ClusteringConfig;
use crate::item::ClusterItem;
use crate::stats::{RunningStat, Tail, ci_range, p_value_from_z};

const TEXT_LENGTH_MIN_SD: f64 = 5.0;
const TOKEN_COUNT_MIN_SD: f64 = 2.0;
const AFFINITY_MIN_SD: f64 = 0.015;
const GATE_TAIL: Tail = Tail::P05;

/// Why a cluster gave an item the score it did.
///
/// Returned by scoring tasks instead of logging from worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    /// Already a member, empty cluster, or empty item into empty-content cluster.
    Trivial,
    TextLengthRejected { text_len: usize, mean: f64 },
    TokenCountRejected { token_count: usize, mean: f64 },
    Scored { affinity: f32 },
    /// The raw score was adjusted against the cluster's affinity history.
    Rescaled { raw: f32, affinity: f32 },
}

impl GateOutcome {
    #[must_use]
    pub const fn affinity(&self) -> f32 {
        match self {
            Self::Trivial => 1.0,
            Self::TextLengthRejected { .. } | Self::TokenCountRejected { .. } => 0.0,
            Self::Scored { affinity } | Self::Rescaled { affinity, .. } => *affinity,
        }
    }

    /// One-line diagnostic, `None` when there is nothing worth reporting.
    #[must_use]
    pub fn exclusion_reason(&self, min_affinity: f32) -> Option<String> {
        match self {
            Self::TextLengthRejected { text_len, mean } => Some(format!(
                "excluded for text length {text_len} (cluster mean {mean:.1})"
            )),
            Self::TokenCountRejected { token_count, mean } => Some(format!(
                "excluded for token count {token_count} (cluster mean {mean:.1})"
            )),
            Self::Rescaled { raw, affinity } if *affinity < min_affinity => Some(format!(
                "excluded for affinity {affinity:.4} (raw {raw:.4})"
            )),
            _ => None,
        }
    }
}

/// Combines running statistics with the cluster algorithm's raw score.
#[derive(Debug, Clone, Copy)]
pub struct AffinityGate<'a> {
    config: &'a ClusteringConfig,
}

impl<'a> AffinityGate<'a> {
    #[must_use]
    pub const fn new(config: &'a ClusteringConfig) -> Self {
        Self { config }
    }

    /// Score `item` against `cluster`.
    #[must_use]
    pub fn admission_score(&self, cluster: &Cluster, item: &ClusterItem) -> GateOutcome {
        let stats = cluster.statistics();
        if cluster.contains(item.id())
            || cluster.is_empty()
            || (item.text_len() == 0 && stats.text_length.mean() < 1.0)
        {
            return GateOutcome::Trivial;
        }

        let factor = self.config.stdev_factor_text_length;
        if factor > 0.0
            && self
                .confidence(&stats.text_length, item.text_len() as f64, factor, TEXT_LENGTH_MIN_SD, true)
                .is_none()
        {
            return GateOutcome::TextLengthRejected {
                text_len: item.text_len(),
                mean: stats.text_length.mean(),
            };
        }

        let factor = self.config.stdev_factor_token_count;
        let token_count = item.tokens().len();
        if factor > 0.0
            && self
                .confidence(&stats.token_count, token_count as f64, factor, TOKEN_COUNT_MIN_SD, true)
                .is_none()
        {
            return GateOutcome::TokenCountRejected {
                token_count,
                mean: stats.token_count.mean(),
            };
        }

        let raw = cluster.algorithm().affinity(item, cluster.len(), self.config);

        let factor = self.config.stdev_factor_affinity;
        if raw > self.config.min_cluster_affinity
            && factor > 0.0
            && cluster.len() >= self.config.min_cluster_size_to_split
        {
            let affinity = self
                .confidence(&stats.affinity, f64::from(raw), factor, AFFINITY_MIN_SD, false)
                .map_or(0.0, |v| v as f32);
            return GateOutcome::Rescaled { raw, affinity };
        }

        GateOutcome::Scored { affinity: raw }
    }

    /// Confidence-test `value` against `stat`; `None` means rejected.
    #[must_use]
    pub fn confidence(
        &self,
        stat: &RunningStat,
        value: f64,
        factor: f64,
        min_sd: f64,
        macro_stat: bool,
    ) -> Option<f64> {
        let min_affinity = f64::from(self.config.min_cluster_affinity);
        let mean = stat.mean();
        let sd = stat.standard_deviation();
        let sample = (stat.count() as f64).sqrt().ceil() as usize;

        let mut range = ci_range(sample, min_sd.max(sd) * factor, GATE_TAIL);
        if macro_stat {
            range = if range > mean {
                // few samples: the T value alone would allow absurd ranges
                range.min(mean * (1.0 - min_affinity) * factor)
            } else {
                range.max(mean * (1.0 - min_affinity) * min_affinity)
            };
        }

        if value < mean - range || value > mean + range {
            return None;
        }
        if value > mean {
            return Some(value);
        }

        let z = (value - mean).abs() / (sd * 2.0);
        Some(value * 2.0 * (1.0 - p_value_from_z(z)))
    }
}

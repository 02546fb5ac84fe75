use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Matches non-empty runs of letters and digits.
pub const STANDARD_LEXER_PATTERN: &str = r"(\p{L}|\p{N})+";

/// Parameters of the clustering engine.
///
/// Every field has a default, so an empty TOML document is a valid config.
/// The whole struct is persisted with the engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Regex used by the default lexer to split content into tokens.
    #[serde(default = "default_lexer_pattern")]
    pub lexer_pattern: String,

    /// Upper bound on worker threads used to score candidate clusters.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Minimum affinity an item needs to join an existing cluster.
    #[serde(default = "default_min_cluster_affinity")]
    pub min_cluster_affinity: f32,

    /// Clusters smaller than this skip the affinity confidence test.
    #[serde(default = "default_min_cluster_size_to_split")]
    pub min_cluster_size_to_split: usize,

    /// Anchored token patterns and the weight they confer.
    #[serde(default)]
    pub weighted_tokens: BTreeMap<String, f32>,

    /// Widening factor of the text-length confidence test; `<= 0` disables it.
    ///
    /// Kept relaxed (> 1) because a single token can swing text length a lot.
    #[serde(default = "default_stdev_factor_text_length")]
    pub stdev_factor_text_length: f64,

    /// Widening factor of the token-count confidence test; `<= 0` disables it.
    #[serde(default = "default_stdev_factor_token_count")]
    pub stdev_factor_token_count: f64,

    /// Factor of the post-scoring affinity confidence test; `<= 0` disables it.
    #[serde(default = "default_stdev_factor_affinity")]
    pub stdev_factor_affinity: f64,

    /// Emit per-item diagnostics (exclusion reasons, shortcut hits).
    #[serde(default)]
    pub log_debug: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            lexer_pattern: default_lexer_pattern(),
            max_parallelism: default_max_parallelism(),
            min_cluster_affinity: default_min_cluster_affinity(),
            min_cluster_size_to_split: default_min_cluster_size_to_split(),
            weighted_tokens: BTreeMap::new(),
            stdev_factor_text_length: default_stdev_factor_text_length(),
            stdev_factor_token_count: default_stdev_factor_token_count(),
            stdev_factor_affinity: default_stdev_factor_affinity(),
            log_debug: false,
        }
    }
}

impl ClusteringConfig {
    /// Check the configuration for values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::InvalidConfig`] when the minimum affinity is
    /// outside `(0, 1]`, a pattern does not compile, or a weight is negative
    /// or not finite.
    pub fn validate(&self) -> Result<(), ClusterError> {
        if !(self.min_cluster_affinity > 0.0 && self.min_cluster_affinity <= 1.0) {
            return Err(ClusterError::InvalidConfig(format!(
                "min_cluster_affinity must be in (0, 1], got {}",
                self.min_cluster_affinity
            )));
        }

        regex::Regex::new(&self.lexer_pattern).map_err(|e| {
            ClusterError::InvalidConfig(format!("lexer_pattern does not compile: {e}"))
        })?;

        for (pattern, weight) in &self.weighted_tokens {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ClusterError::InvalidConfig(format!(
                    "weight for token pattern '{pattern}' must be a non-negative number, got {weight}"
                )));
            }
            // Syntax only; the size budget is enforced (softly) by the vocabulary.
            regex::Regex::new(pattern).map_err(|e| match e {
                regex::Error::CompiledTooBig(_) => {
                    ClusterError::InvalidConfig(format!("token pattern '{pattern}' is too large"))
                }
                other => ClusterError::InvalidConfig(format!(
                    "token pattern '{pattern}' does not compile: {other}"
                )),
            })?;
        }

        for (name, factor) in [
            ("stdev_factor_text_length", self.stdev_factor_text_length),
            ("stdev_factor_token_count", self.stdev_factor_token_count),
            ("stdev_factor_affinity", self.stdev_factor_affinity),
        ] {
            if factor.is_nan() {
                return Err(ClusterError::InvalidConfig(format!("{name} is NaN")));
            }
        }

        Ok(())
    }

    /// Worker count of the scoring pool; never zero.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.max_parallelism.max(1)
    }
}

/// Load and validate a clustering config from a TOML file.
///
/// # Errors
///
/// Fails when the file is missing, unreadable, not valid TOML for
/// [`ClusteringConfig`], or rejected by [`ClusteringConfig::validate`].
pub fn load_config(path: &Path) -> Result<ClusteringConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<ClusteringConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid clustering config in {}", path.display()))?;

    Ok(config)
}

fn default_lexer_pattern() -> String {
    STANDARD_LEXER_PATTERN.to_string()
}

const fn default_max_parallelism() -> usize {
    4
}

const fn default_min_cluster_affinity() -> f32 {
    0.75
}

const fn default_min_cluster_size_to_split() -> usize {
    20
}

const fn default_stdev_factor_text_length() -> f64 {
    2.0
}

const fn default_stdev_factor_token_count() -> f64 {
    1.2
}

const fn default_stdev_factor_affinity() -> f64 {
    1.15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: ClusteringConfig = toml::from_str("").expect("empty toml parses");
        assert_eq!(cfg, ClusteringConfig::default());
        assert_eq!(cfg.lexer_pattern, STANDARD_LEXER_PATTERN);
        assert_eq!(cfg.max_parallelism, 4);
        assert!((cfg.min_cluster_affinity - 0.75).abs() < f32::EPSILON);
        assert_eq!(cfg.min_cluster_size_to_split, 20);
        assert!((cfg.stdev_factor_text_length - 2.0).abs() < f64::EPSILON);
        assert!((cfg.stdev_factor_token_count - 1.2).abs() < f64::EPSILON);
        assert!((cfg.stdev_factor_affinity - 1.15).abs() < f64::EPSILON);
        assert!(!cfg.log_debug);
    }

    #[test]
    fn weighted_tokens_parse_from_toml() {
        let cfg: ClusteringConfig = toml::from_str(
            r#"
min_cluster_affinity = 0.85

[weighted_tokens]
"ERR[0-9]+" = 10.0
"timeout" = 3.5
"#,
        )
        .expect("parse");

        assert!((cfg.min_cluster_affinity - 0.85).abs() < f32::EPSILON);
        assert_eq!(cfg.weighted_tokens.len(), 2);
        assert!((cfg.weighted_tokens["timeout"] - 3.5).abs() < f32::EPSILON);
        cfg.validate().expect("valid");
    }

    #[test]
    fn rejects_out_of_range_affinity() {
        let cfg = ClusteringConfig {
            min_cluster_affinity: 1.5,
            ..ClusteringConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ClusterError::InvalidConfig(_))));

        let cfg = ClusteringConfig {
            min_cluster_affinity: 0.0,
            ..ClusteringConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_patterns_and_weights() {
        let cfg = ClusteringConfig {
            lexer_pattern: "(unclosed".into(),
            ..ClusteringConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = ClusteringConfig::default();
        cfg.weighted_tokens.insert("[z-a]".into(), 2.0);
        assert!(cfg.validate().is_err());

        let mut cfg = ClusteringConfig::default();
        cfg.weighted_tokens.insert("ok".into(), -1.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_parallelism_still_has_one_worker() {
        let cfg = ClusteringConfig {
            max_parallelism: 0,
            ..ClusteringConfig::default()
        };
        assert_eq!(cfg.worker_count(), 1);
    }

    #[test]
    fn load_config_reads_file_and_fails_fast_when_missing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("zipline.toml");
        std::fs::write(&path, "max_parallelism = 2\nlog_debug = true\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_parallelism, 2);
        assert!(cfg.log_debug);

        let missing = dir.path().join("absent.toml");
        let err = load_config(&missing).expect_err("missing file must fail");
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "max_parallelism = \"lots\"\n").expect("write");
        let err = load_config(&path).expect_err("bad type must fail");
        assert!(err.to_string().contains("Failed to parse"));
    }
}

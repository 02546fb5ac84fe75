//! zipline-core: online clustering of near-duplicate text.
//!
//! Items arrive one at a time and are assigned to the cluster they fit best,
//! or start a new one. Each cluster keeps a zip-chain index of the token
//! subsequences its members share, plus running statistics used to gate
//! admission.
//!
//! ```no_run
//! use zipline_core::{Clustering, ClusteringConfig};
//!
//! let mut engine = Clustering::new(ClusteringConfig::default())?;
//! engine.add_item("a", "disk full on node 7")?;
//! engine.add_item("b", "disk full on node 9")?;
//! let state = engine.to_json()?;
//! let resumed = Clustering::from_json(&state)?;
//! assert_eq!(resumed.cluster_count(), engine.cluster_count());
//! # Ok::<(), zipline_core::ClusterError>(())
//! ```
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`ClusterError`]; file-facing
//!   helpers such as [`config::load_config`] return `anyhow::Result`.
//! - **Logging**: `tracing` macros only. Per-item diagnostics are emitted
//!   only when [`ClusteringConfig::log_debug`] is set.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod clustering;
pub mod config;
pub mod error;
pub mod gate;
pub mod item;
pub mod lexer;
pub mod persist;
pub mod stats;
pub mod token;
pub mod vocabulary;
pub mod zipchain;

pub use cluster::{Cluster, ClusterAlgorithm, ClusterId, ClusterStatistics, LastItem};
pub use clustering::{AddOutcome, AdmitPath, Clustering, LogHook};
pub use config::{ClusteringConfig, load_config};
pub use error::{ClusterError, ClusterErrorCode};
pub use gate::{AffinityGate, GateOutcome};
pub use item::{ClusterItem, content_hash};
pub use lexer::{RegexLexer, Tokenizer};
pub use persist::ClusteringSnapshot;
pub use token::{Token, TokenId, TokenSequence};
pub use vocabulary::Vocabulary;
pub use zipchain::ZipChainIndex;

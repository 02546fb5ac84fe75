//! `zl cluster` — cluster the lines of a text file.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};
use zipline_core::{AddOutcome, Cluster, Clustering, ClusteringConfig, ClusteringSnapshot, load_config};

use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

/// Arguments for `zl cluster`.
#[derive(Args, Debug)]
pub struct ClusterArgs {
    /// Text file with one item per line. Blank lines are skipped.
    pub input: PathBuf,

    /// TOML clustering config. Ignored when resuming from `--state`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Resume from a state document written by `--save`.
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Write the resulting state document to this file.
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Override `min_cluster_affinity` (0, 1].
    #[arg(long)]
    pub min_affinity: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct ClusterSummary {
    pub id: String,
    pub size: usize,
    pub mean_affinity: f64,
    /// First line of this run that landed in the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClusterReport {
    pub lines: usize,
    pub created: usize,
    pub admitted: usize,
    pub already_known: usize,
    pub clusters: Vec<ClusterSummary>,
}

/// Execute `zl cluster`.
pub fn run_cluster(args: &ClusterArgs, output: OutputMode) -> anyhow::Result<()> {
    let mut engine = match open_engine(args) {
        Ok(engine) => engine,
        Err(err) => {
            if let Some(cluster_err) = err.downcast_ref::<zipline_core::ClusterError>() {
                render_error(output, &CliError::from(cluster_err))?;
            }
            return Err(err);
        }
    };

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let mut report = ClusterReport {
        lines: 0,
        created: 0,
        admitted: 0,
        already_known: 0,
        clusters: Vec::new(),
    };
    let mut examples: HashMap<String, String> = HashMap::new();

    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        report.lines += 1;
        let id = format!("L{}", n + 1);
        let outcome = engine
            .add_item(&id, line)
            .with_context(|| format!("Failed to cluster line {}", n + 1))?;
        match outcome {
            AddOutcome::AlreadyKnown => report.already_known += 1,
            AddOutcome::Admitted { cluster, .. } => {
                report.admitted += 1;
                examples.entry(cluster.to_string()).or_insert_with(|| line.to_string());
            }
            AddOutcome::Created { cluster } => {
                report.created += 1;
                examples.insert(cluster.to_string(), line.to_string());
            }
        }
    }

    info!(
        lines = report.lines,
        clusters = engine.cluster_count(),
        "clustered {}",
        args.input.display()
    );

    if let Some(path) = &args.save {
        save_state(&engine, path)?;
    }

    report.clusters = engine
        .clusters()
        .iter()
        .map(|c| summarize(c, &mut examples))
        .collect();

    render_mode(output, &report, render_text, render_pretty)
}

fn open_engine(args: &ClusterArgs) -> anyhow::Result<Clustering> {
    if let Some(path) = &args.state {
        if args.config.is_some() {
            warn!("--config is ignored when resuming from --state");
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut snapshot: ClusteringSnapshot = serde_json::from_str(&json)
            .map_err(zipline_core::ClusterError::from)
            .with_context(|| format!("Failed to parse state {}", path.display()))?;
        if let Some(min) = args.min_affinity {
            snapshot.config.min_cluster_affinity = min;
        }
        return snapshot
            .finalize()
            .with_context(|| format!("Failed to restore state {}", path.display()));
    }

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ClusteringConfig::default(),
    };
    if let Some(min) = args.min_affinity {
        config.min_cluster_affinity = min;
    }
    Clustering::new(config).context("Failed to start clustering engine")
}

fn save_state(engine: &Clustering, path: &Path) -> anyhow::Result<()> {
    let json = engine.to_json().context("Failed to encode state")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "saved clustering state");
    Ok(())
}

fn summarize(cluster: &Cluster, examples: &mut HashMap<String, String>) -> ClusterSummary {
    let id = cluster.id().to_string();
    ClusterSummary {
        size: cluster.len(),
        mean_affinity: cluster.statistics().affinity.mean(),
        example: examples.remove(&id),
        members: cluster.item_ids().into_iter().map(str::to_string).collect(),
        id,
    }
}

fn render_text(report: &ClusterReport, w: &mut dyn Write) -> std::io::Result<()> {
    for c in &report.clusters {
        writeln!(
            w,
            "{}\t{}\t{:.3}\t{}",
            c.id,
            c.size,
            c.mean_affinity,
            c.members.join(",")
        )?;
    }
    Ok(())
}

fn render_pretty(report: &ClusterReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("{} clusters from {} lines", report.clusters.len(), report.lines))?;
    pretty_kv(w, "created", report.created.to_string())?;
    pretty_kv(w, "admitted", report.admitted.to_string())?;
    pretty_kv(w, "known", report.already_known.to_string())?;
    for c in &report.clusters {
        writeln!(w)?;
        pretty_kv(w, "cluster", &c.id)?;
        pretty_kv(w, "size", c.size.to_string())?;
        pretty_kv(w, "affinity", format!("{:.3}", c.mean_affinity))?;
        if let Some(example) = &c.example {
            pretty_kv(w, "example", example)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rows_are_tab_separated() {
        let report = ClusterReport {
            lines: 2,
            created: 1,
            admitted: 1,
            already_known: 0,
            clusters: vec![ClusterSummary {
                id: "c1".into(),
                size: 2,
                mean_affinity: 1.0,
                example: Some("disk full".into()),
                members: vec!["L1".into(), "L2".into()],
            }],
        };
        let mut buf = Vec::new();
        render_text(&report, &mut buf).expect("render");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "c1\t2\t1.000\tL1,L2\n");
    }
}

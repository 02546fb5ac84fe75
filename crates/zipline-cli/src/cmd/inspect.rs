//! `zl inspect` — summarize a saved clustering state.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use zipline_core::{Cluster, Clustering};

use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

/// Arguments for `zl inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// State document written by `zl cluster --save`.
    pub state: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct ClusterDetail {
    pub id: String,
    pub size: usize,
    pub mean_text_length: f64,
    pub mean_token_count: f64,
    pub mean_affinity: f64,
    pub affinity_sd: f64,
    pub sharp: bool,
    pub tree_nodes: usize,
    pub tree_height: u32,
}

#[derive(Debug, Serialize)]
pub struct StateReport {
    pub vocabulary: usize,
    pub items: usize,
    pub min_cluster_affinity: f32,
    pub clusters: Vec<ClusterDetail>,
}

/// Execute `zl inspect`.
pub fn run_inspect(args: &InspectArgs, output: OutputMode) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&args.state)
        .with_context(|| format!("Failed to read {}", args.state.display()))?;
    let engine = match Clustering::from_json(&json) {
        Ok(engine) => engine,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            return Err(err).with_context(|| format!("Failed to load {}", args.state.display()));
        }
    };

    let min_affinity = engine.config().min_cluster_affinity;
    let report = StateReport {
        vocabulary: engine.vocabulary().len(),
        items: engine.item_count(),
        min_cluster_affinity: min_affinity,
        clusters: engine
            .clusters()
            .iter()
            .map(|c| detail(c, min_affinity))
            .collect(),
    };

    render_mode(output, &report, render_text, render_pretty)
}

fn detail(cluster: &Cluster, min_affinity: f32) -> ClusterDetail {
    let stats = cluster.statistics();
    ClusterDetail {
        id: cluster.id().to_string(),
        size: cluster.len(),
        mean_text_length: stats.text_length.mean(),
        mean_token_count: stats.token_count.mean(),
        mean_affinity: stats.affinity.mean(),
        affinity_sd: stats.affinity.standard_deviation(),
        sharp: cluster.is_sharp(min_affinity),
        tree_nodes: cluster.index().node_count(),
        tree_height: cluster.index().height(),
    }
}

fn render_text(report: &StateReport, w: &mut dyn Write) -> std::io::Result<()> {
    for c in &report.clusters {
        writeln!(
            w,
            "{}\t{}\t{:.1}\t{:.1}\t{:.3}\t{}",
            c.id, c.size, c.mean_text_length, c.mean_token_count, c.mean_affinity, c.tree_nodes
        )?;
    }
    Ok(())
}

fn render_pretty(report: &StateReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "State")?;
    pretty_kv(w, "items", report.items.to_string())?;
    pretty_kv(w, "clusters", report.clusters.len().to_string())?;
    pretty_kv(w, "vocabulary", report.vocabulary.to_string())?;
    pretty_kv(w, "min affinity", format!("{:.2}", report.min_cluster_affinity))?;
    for c in &report.clusters {
        writeln!(w)?;
        pretty_section(w, &c.id)?;
        pretty_kv(w, "size", c.size.to_string())?;
        pretty_kv(w, "text length", format!("{:.1}", c.mean_text_length))?;
        pretty_kv(w, "tokens", format!("{:.1}", c.mean_token_count))?;
        pretty_kv(
            w,
            "affinity",
            format!("{:.3} ± {:.3}{}", c.mean_affinity, c.affinity_sd, if c.sharp { " (sharp)" } else { "" }),
        )?;
        pretty_kv(w, "tree", format!("{} nodes, height {}", c.tree_nodes, c.tree_height))?;
    }
    Ok(())
}

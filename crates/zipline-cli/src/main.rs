#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;

use clap::{Parser, Subcommand};
use output::{OutputMode, resolve_output_mode};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "zl: online clustering of near-duplicate text lines",
    long_about = None
)]
struct Cli {
    /// Output format (defaults to pretty on a TTY, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Alias for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Cluster the lines of a text file",
        long_about = "Cluster every non-empty line of a text file. Line N gets the item id LN.",
        after_help = "EXAMPLES:\n    # Cluster a log excerpt\n    zl cluster app.log\n\n    # Save the state and resume later with more lines\n    zl cluster day1.log --save state.json\n    zl cluster day2.log --state state.json --save state.json\n\n    # Emit machine-readable output\n    zl cluster app.log --format json"
    )]
    Cluster(cmd::cluster::ClusterArgs),

    #[command(
        about = "Summarize a saved clustering state",
        after_help = "EXAMPLES:\n    zl inspect state.json\n    zl inspect state.json --format json"
    )]
    Inspect(cmd::inspect::InspectArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ZIPLINE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "zipline=debug,info"
        } else {
            "zipline=info,warn"
        })
    });

    let format = env::var("ZIPLINE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let output = resolve_output_mode(cli.format, cli.json);

    match cli.command {
        Commands::Cluster(ref args) => cmd::cluster::run_cluster(args, output),
        Commands::Inspect(ref args) => cmd::inspect::run_inspect(args, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_subcommand_parses() {
        let cli = Cli::parse_from([
            "zl",
            "cluster",
            "in.txt",
            "--save",
            "out.json",
            "--min-affinity",
            "0.9",
        ]);
        let Commands::Cluster(args) = cli.command else {
            panic!("expected cluster");
        };
        assert_eq!(args.input.to_str(), Some("in.txt"));
        assert_eq!(args.save.as_deref().and_then(|p| p.to_str()), Some("out.json"));
        assert!(args.min_affinity.is_some_and(|m| (m - 0.9).abs() < f32::EPSILON));
        assert!(args.state.is_none());
    }

    #[test]
    fn format_flag_is_global() {
        let cli = Cli::parse_from(["zl", "inspect", "state.json", "--format", "json"]);
        assert_eq!(cli.format, Some(OutputMode::Json));
        assert!(matches!(cli.command, Commands::Inspect(_)));
    }

    #[test]
    fn hidden_json_alias() {
        let cli = Cli::parse_from(["zl", "--json", "inspect", "s.json"]);
        assert!(cli.json);
        assert!(resolve_output_mode(cli.format, cli.json).is_json());
    }
}

//! Command-line driver for the link stage.
//!
//! Feeds the argument list through one `LinkStage` run, printing per-link
//! outcomes via tracing and exiting non-zero when any record failed.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use linkmill_engine::{DestinationSpec, LinkMode, LinkOptions, LinkStage, SourceRecord};
use linkmill_events::EventBus;
use linkmill_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, Metrics, init_logging};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "linkmill",
    about = "Materialize symbolic links for a set of source paths",
    version
)]
struct Cli {
    /// Source paths to link.
    #[arg(required = true, value_name = "SOURCE")]
    sources: Vec<PathBuf>,

    /// Destination path. Pass once for a shared destination, or repeat to
    /// pair destinations with sources in order.
    #[arg(short, long = "dest", required = true, value_name = "PATH")]
    dest: Vec<PathBuf>,

    /// Write absolute link targets instead of relative ones.
    #[arg(long)]
    absolute: bool,

    /// Replace existing destination entries.
    #[arg(long)]
    overwrite: bool,

    /// Suppress the per-link success lines.
    #[arg(short, long)]
    quiet: bool,

    /// Print the metrics registry after the run.
    #[arg(long)]
    metrics: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(
        long,
        env = "LINKMILL_LOG",
        default_value = DEFAULT_LOG_LEVEL,
        value_name = "LEVEL"
    )]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LoggingConfig {
        level: &cli.log_level,
        format: LogFormat::infer(),
    })
    .context("telemetry setup failed")?;
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let spec = destination_spec(cli.dest);
    let options = LinkOptions {
        mode: if cli.absolute {
            LinkMode::Absolute
        } else {
            LinkMode::Relative
        },
        overwrite: cli.overwrite,
        log: !cli.quiet,
    };

    let events = EventBus::new();
    let metrics = Metrics::new()?;
    let (mut stage, mut records) = LinkStage::new(spec, options, events, metrics.clone());

    let mut failures = 0u64;
    for source in cli.sources {
        if stage.push(SourceRecord::new(source)).is_err() {
            failures += 1;
        }
    }
    let linked = stage.linked();
    stage.finish();

    // Drain the pass-through stream; the CLI has no downstream consumer.
    while records.recv().await.is_some() {}

    if cli.metrics {
        print!("{}", metrics.render()?);
    }
    info!(linked, failed = failures, "link run complete");

    if failures > 0 {
        bail!("{failures} of {} links failed", linked + failures);
    }
    Ok(())
}

fn destination_spec(dests: Vec<PathBuf>) -> DestinationSpec {
    if let [only] = dests.as_slice() {
        DestinationSpec::literal(only.clone())
    } else {
        DestinationSpec::list(dests)
    }
}

//! CLI command implementation.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use console::style;
use tokio::sync::mpsc;

use wayback_mirror::config::MirrorConfig;
use wayback_mirror::mirror::MirrorWriter;

use super::progress::report_progress;

const EXAMPLE_URL: &str = "https://web.archive.org/web/20160328000145/http://www.google.com/";

#[derive(Parser)]
#[command(name = "waymirror")]
#[command(about = "Mirror a Wayback Machine snapshot into a local directory")]
#[command(version)]
pub struct Cli {
    /// Snapshot URL (https://web.archive.org/web/<timestamp>/<original-url>)
    snapshot_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// TOML config file
    #[arg(short, long, env = "WAYMIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to create the mirror in (default: current directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of assets to download at once (default: 1)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Keep the archive's injected toolbar and scripts
    #[arg(long)]
    no_sanitize: bool,
}

impl Cli {
    /// Config file values with command-line overrides applied.
    fn mirror_config(&self) -> anyhow::Result<MirrorConfig> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::load_from_path(path)?,
            None => MirrorConfig::default(),
        };
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.no_sanitize {
            config.sanitize = false;
        }
        Ok(config)
    }
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

fn print_usage() {
    println!("Please provide a web.archive.org snapshot URL as a command line argument");
    println!("Example: waymirror {}", EXAMPLE_URL);
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(snapshot_url) = cli.snapshot_url.as_deref() else {
        print_usage();
        std::process::exit(1);
    };

    let config = cli.mirror_config()?;

    println!("{} Mirroring {}", style("→").cyan(), snapshot_url);

    let (event_tx, event_rx) = mpsc::channel(64);
    let reporter = tokio::spawn(report_progress(event_rx));

    let writer = MirrorWriter::new(config).with_events(event_tx);
    let result = writer.run(snapshot_url).await;
    drop(writer);
    let _ = reporter.await;

    match result {
        Ok(summary) => {
            println!(
                "\n{} Download complete! {} assets saved in {}",
                style("✓").green(),
                summary.downloaded,
                summary.output_dir.display()
            );
            if summary.failed > 0 || summary.skipped > 0 {
                println!(
                    "  {} {} failed, {} skipped",
                    style("!").yellow(),
                    summary.failed,
                    summary.skipped
                );
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Mirror of {} failed: {}", snapshot_url, e);
            println!("{} Mirror failed", style("✗").red());
            Err(e).with_context(|| format!("could not mirror {}", snapshot_url))
        }
    }
}

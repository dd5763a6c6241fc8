//! Progress display for a mirror run.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use wayback_mirror::mirror::MirrorEvent;

fn asset_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(template) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        bar.set_style(template.progress_chars("█▓░"));
    }
    bar.set_message("Downloading assets...");
    bar
}

/// Render mirror events until the sender is dropped.
pub async fn report_progress(mut events: mpsc::Receiver<MirrorEvent>) {
    let mut bar: Option<ProgressBar> = None;

    let emit_line = |bar: &Option<ProgressBar>, line: String| match bar {
        Some(bar) => bar.println(line),
        None => println!("{}", line),
    };

    while let Some(event) = events.recv().await {
        match event {
            MirrorEvent::PageFetched { bytes, .. } => {
                println!("{} Downloaded main page ({} bytes)", style("✓").green(), bytes);
            }
            MirrorEvent::AssetsDiscovered { count } => {
                println!("{} Downloading {} assets...", style("→").cyan(), count);
                bar = Some(asset_bar(count));
            }
            MirrorEvent::AssetSaved { path, .. } => {
                emit_line(&bar, format!("  {} {}", style("✓").green(), path));
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            MirrorEvent::AssetFailed { url, error } => {
                emit_line(&bar, format!("  {} {}: {}", style("✗").red(), url, error));
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            MirrorEvent::AssetSkipped { url, reason } => {
                emit_line(&bar, format!("  {} skipped {}: {}", style("!").yellow(), url, reason));
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            MirrorEvent::Finished { .. } => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
            }
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use pagelift_core::config_file;
use pagelift_core::worker::ProcessSpawner;
use pagelift_core::{Document, ExtractOptions, ExtractionEvent, Orchestrator};

/// pagelift - extract plain text from documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the text of a document to stdout or a file
    Extract {
        /// Path to the document (PDF or plain text)
        file_path: PathBuf,

        /// Preparation deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Pages per partial-text flush
        #[arg(long)]
        batch_size: Option<u32>,

        /// Path to the rendering worker binary
        #[arg(long)]
        worker: Option<PathBuf>,

        /// Override mime type detection
        #[arg(long)]
        mime: Option<String>,

        /// Write extracted text here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

// Fallbacks used only when neither flag nor config file provides a value.
const DEFAULT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_BATCH_SIZE: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extract {
            file_path,
            timeout_ms,
            batch_size,
            worker,
            mime,
            output,
            no_color,
        } => {
            extract(
                file_path, timeout_ms, batch_size, worker, mime, output, no_color,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn extract(
    file_path: PathBuf,
    timeout_ms: Option<u64>,
    batch_size: Option<u32>,
    worker: Option<PathBuf>,
    mime: Option<String>,
    output: Option<PathBuf>,
    no_color: bool,
) -> anyhow::Result<()> {
    let config = config_file::load_config();
    let file_config = config.extraction.unwrap_or_default();

    let options = ExtractOptions {
        timeout: Duration::from_millis(
            timeout_ms
                .or(file_config.timeout_ms)
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        ),
        batch_size: batch_size
            .or(file_config.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE),
    };

    let worker_path = worker
        .or_else(|| {
            config
                .worker
                .as_ref()
                .and_then(|w| w.path.as_ref())
                .map(PathBuf::from)
        })
        .or_else(default_worker_path)
        .context("no rendering worker binary found; pass --worker")?;

    let metadata = std::fs::metadata(&file_path)
        .with_context(|| format!("cannot stat {}", file_path.display()))?;
    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.display().to_string());
    let document = Document {
        uri: file_path.display().to_string(),
        mime_type: mime.unwrap_or_else(|| guess_mime(&file_path).to_string()),
        size_bytes: metadata.len(),
        name,
    };

    let orchestrator = Arc::new(Orchestrator::new(Arc::new(ProcessSpawner::new(
        worker_path,
    ))));

    let started = Instant::now();
    let mut handle = orchestrator
        .start(document, options)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // Ctrl-C cancels the session instead of abandoning the worker.
    let signal_orchestrator = orchestrator.clone();
    let session_id = handle.session_id;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_orchestrator.cancel(session_id);
        }
    });

    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {pos}/{len} pages {wide_bar}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut pages = 0u64;
    let text = loop {
        match handle.events.recv().await {
            Some(ExtractionEvent::Started { .. }) => {}
            Some(ExtractionEvent::Progress { current, total }) => {
                if bar.length() != Some(total) {
                    bar.set_length(total);
                    bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                }
                bar.set_position(current);
                pages = total;
            }
            Some(ExtractionEvent::Completed { text }) => {
                bar.finish_and_clear();
                break text;
            }
            Some(ExtractionEvent::Failed { error }) => {
                bar.finish_and_clear();
                bail!("extraction failed: {error}");
            }
            Some(ExtractionEvent::Cancelled) => {
                bar.finish_and_clear();
                bail!("extraction cancelled");
            }
            None => bail!("session ended unexpectedly"),
        }
    };

    match output {
        Some(path) => std::fs::write(&path, &text)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            out.write_all(text.as_bytes())?;
        }
    }

    let summary = format!(
        "extracted {} page(s), {} bytes in {:.1?}",
        pages,
        text.len(),
        started.elapsed()
    );
    if no_color {
        eprintln!("{summary}");
    } else {
        eprintln!("{}", summary.green());
    }
    Ok(())
}

/// The worker normally ships next to the CLI binary.
fn default_worker_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let sibling = exe.parent()?.join("pagelift-worker");
    sibling.exists().then_some(sibling)
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt" | "text" | "log") => "text/plain",
        Some("md" | "markdown") => "text/markdown",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_guess_covers_common_extensions() {
        assert_eq!(guess_mime(Path::new("paper.PDF")), "application/pdf");
        assert_eq!(guess_mime(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_mime(Path::new("README.md")), "text/markdown");
        assert_eq!(guess_mime(Path::new("blob.bin")), "application/octet-stream");
        assert_eq!(guess_mime(Path::new("no_extension")), "application/octet-stream");
    }
}

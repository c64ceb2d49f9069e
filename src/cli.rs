use crate::model::{
    display_name, TaskEvent, TaskOutcome, ToolConfig, DEFAULT_EPOCHS, DEFAULT_OUTPUT_MODEL,
    DEFAULT_RECOGNITION_MODEL,
};
use crate::orchestrator::{self, Session, TaskRunner};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "kraken-tui",
    version,
    about = "Terminal front-end for Kraken OCR: segmentation, recognition and Ketos training"
)]
pub struct Cli {
    /// Directory containing the kraken and ketos executables (prepended to PATH)
    #[arg(long, global = true)]
    pub kraken_dir: Option<PathBuf>,

    /// Directory for the segmentation/OCR side files, overlay image and log
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Recognition model name, resolved by kraken
    #[arg(long, global = true, default_value = DEFAULT_RECOGNITION_MODEL)]
    pub model: String,

    /// Name of the model produced by training
    #[arg(long, global = true, default_value = DEFAULT_OUTPUT_MODEL)]
    pub output_model: String,

    /// Training epochs
    #[arg(long, global = true, default_value_t = DEFAULT_EPOCHS, value_parser = parse_epochs_arg)]
    pub epochs: u32,

    /// Segmentation executable
    #[arg(long, global = true, default_value = "kraken")]
    pub segmenter: String,

    /// Recognition executable
    #[arg(long, global = true, default_value = "kraken")]
    pub recognizer: String,

    /// Training executable
    #[arg(long, global = true, default_value = "ketos")]
    pub trainer: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Headless modes. Without a subcommand the interactive interface starts.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Segment an image and render its baselines over a copy of it
    Segment {
        image: PathBuf,
        /// Where to write the overlay PNG (defaults to the work directory)
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Segment an image, then recognize it and print the text
    Ocr { image: PathBuf },
    /// Train a model from image / ground-truth pairs, streaming the trainer output
    Train {
        /// An image and its ground-truth transcription; repeat for more pairs
        #[arg(long = "pair", num_args = 2, value_names = ["IMAGE", "GT"], required = true)]
        pairs: Vec<PathBuf>,
    },
}

fn parse_epochs_arg(s: &str) -> std::result::Result<u32, String> {
    orchestrator::parse_epochs(s).map_err(|e| e.to_string())
}

/// Work directory from the flag, else the user cache dir, else the temp dir.
pub fn resolve_work_dir(args: &Cli) -> PathBuf {
    args.work_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("kraken-tui")
    })
}

/// Build a `ToolConfig` from CLI arguments, creating the work directory.
pub fn build_config(args: &Cli) -> Result<ToolConfig> {
    let work_dir = resolve_work_dir(args);
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("create work directory {}", work_dir.display()))?;
    Ok(ToolConfig {
        kraken_dir: args.kraken_dir.clone(),
        work_dir,
        segmenter: args.segmenter.clone(),
        recognizer: args.recognizer.clone(),
        trainer: args.trainer.clone(),
        recognition_model: args.model.clone(),
        output_model: args.output_model.clone(),
        epochs: args.epochs,
    })
}

pub async fn run(args: Cli, cfg: ToolConfig) -> Result<()> {
    match args.command {
        None => {
            #[cfg(feature = "tui")]
            {
                crate::tui::run(cfg).await
            }
            #[cfg(not(feature = "tui"))]
            {
                let _ = cfg;
                bail!("built without TUI support; use one of the subcommands (see --help)")
            }
        }
        Some(Command::Segment { image, overlay }) => run_segment(cfg, image, overlay).await,
        Some(Command::Ocr { image }) => run_ocr(cfg, image).await,
        Some(Command::Train { pairs }) => run_train(cfg, pairs).await,
    }
}

/// Session wired to a fresh runner for one headless invocation.
struct Headless {
    session: Session,
    runner: TaskRunner,
    event_rx: mpsc::UnboundedReceiver<TaskEvent>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
    out_handle: tokio::task::JoinHandle<()>,
}

impl Headless {
    fn new(cfg: ToolConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TaskEvent>();
        let runner = TaskRunner::new(tokio::runtime::Handle::current(), event_tx);
        let (out_tx, out_handle) = spawn_output_writer();
        Self {
            session: Session::new(cfg),
            runner,
            event_rx,
            out_tx,
            out_handle,
        }
    }

    fn stdout(&self, msg: impl Into<String>) {
        let _ = self.out_tx.send(OutputLine::Stdout(msg.into()));
    }

    fn stderr(&self, msg: impl Into<String>) {
        let _ = self.out_tx.send(OutputLine::Stderr(msg.into()));
    }

    async fn finish(self) {
        drop(self.out_tx);
        let _ = self.out_handle.await;
    }

    /// Select and segment `image`; fails when the segmenter fails.
    async fn segment(&mut self, image: PathBuf) -> Result<()> {
        match self.session.select_image(&image) {
            Ok(()) => {}
            Err(e @ crate::error::ValidationError::UnreadableImage { .. }) => {
                self.stderr(format!("Warning: {e} (no overlay will be drawn)"));
            }
            Err(e) => return Err(e.into()),
        }
        self.stderr(format!("Segmenting {}…", display_name(&image)));
        let job = self.session.begin_segmentation()?;
        let done = orchestrator::drive(&mut self.session, &self.runner, &mut self.event_rx, job, |_| {})
            .await
            .context("task runner stopped before segmentation finished")?;
        if let TaskOutcome::Failure(msg) = done.outcome {
            bail!("{msg}");
        }
        self.stderr(self.session.ocr.status.clone());
        Ok(())
    }
}

async fn run_segment(cfg: ToolConfig, image: PathBuf, overlay: Option<PathBuf>) -> Result<()> {
    let mut h = Headless::new(cfg);
    let res = async {
        h.segment(image).await?;
        match (h.session.ocr.preview.as_ref(), h.session.overlay_path()) {
            (Some(preview), Some(drawn)) => {
                let target = overlay.unwrap_or_else(|| drawn.to_path_buf());
                if target.as_path() != drawn {
                    std::fs::copy(drawn, &target)
                        .with_context(|| format!("write overlay {}", target.display()))?;
                }
                h.stdout(format!(
                    "Segmented {} line(s). Overlay: {}",
                    preview.lines,
                    target.display()
                ));
            }
            _ => h.stdout(format!(
                "Segmentation written to {}",
                h.session.config().segmentation_json().display()
            )),
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;
    h.finish().await;
    res
}

async fn run_ocr(cfg: ToolConfig, image: PathBuf) -> Result<()> {
    let mut h = Headless::new(cfg);
    let res = async {
        h.segment(image).await?;
        h.stderr(format!("Recognizing with model '{}'…", h.session.ocr.model));
        let job = h.session.begin_recognition()?;
        let done = orchestrator::drive(&mut h.session, &h.runner, &mut h.event_rx, job, |_| {})
            .await
            .context("task runner stopped before recognition finished")?;
        if let TaskOutcome::Failure(msg) = done.outcome {
            bail!("{msg}");
        }
        h.stdout(h.session.ocr.result.clone());
        Ok::<(), anyhow::Error>(())
    }
    .await;
    h.finish().await;
    res
}

async fn run_train(cfg: ToolConfig, pairs: Vec<PathBuf>) -> Result<()> {
    let mut h = Headless::new(cfg);
    let res = async {
        for pair in pairs.chunks_exact(2) {
            h.session.add_pair(&pair[0], &pair[1])?;
        }
        let job = h.session.begin_training()?;
        for line in &h.session.training.log {
            h.stderr(line.clone());
        }

        let started = Instant::now();
        let out_tx = h.out_tx.clone();
        let done = orchestrator::drive(&mut h.session, &h.runner, &mut h.event_rx, job, |text| {
            let text = text.strip_suffix('\n').unwrap_or(text);
            let _ = out_tx.send(OutputLine::Stderr(text.to_string()));
        })
        .await
        .context("task runner stopped before training finished")?;

        let elapsed = humantime::format_duration(std::time::Duration::from_secs(
            started.elapsed().as_secs(),
        ));
        if let TaskOutcome::Failure(msg) = done.outcome {
            bail!("Training failed after {elapsed}.\n{msg}");
        }
        h.stderr(format!("Finished in {elapsed}"));
        h.stdout(h.session.training.status.clone());
        Ok::<(), anyhow::Error>(())
    }
    .await;
    h.finish().await;
    res
}

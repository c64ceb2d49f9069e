use std::fmt;
use std::path::{Path, PathBuf};

/// Side-effect file written by the segmenter and read back for the overlay and recognition.
pub const SEGMENTATION_JSON: &str = "kraken_temp_segmentation.json";
/// Side-effect file written by the recognizer.
pub const OCR_OUTPUT: &str = "kraken_temp_ocr_output.txt";
pub const OVERLAY_IMAGE: &str = "segmentation_overlay.png";
pub const LOG_FILE: &str = "kraken-tui.log";

pub const DEFAULT_RECOGNITION_MODEL: &str = "arabic_best.mlmodel";
pub const DEFAULT_OUTPUT_MODEL: &str = "my_arabic_model.mlmodel";
pub const DEFAULT_EPOCHS: u32 = 100;

/// Where the toolchain lives and where its side-effect files go.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Directory prepended to `PATH` for every invocation. `None` keeps the ambient `PATH`.
    pub kraken_dir: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub segmenter: String,
    pub recognizer: String,
    pub trainer: String,
    pub recognition_model: String,
    pub output_model: String,
    pub epochs: u32,
}

impl ToolConfig {
    pub fn segmentation_json(&self) -> PathBuf {
        self.work_dir.join(SEGMENTATION_JSON)
    }

    pub fn ocr_output(&self) -> PathBuf {
        self.work_dir.join(OCR_OUTPUT)
    }

    pub fn overlay_image(&self) -> PathBuf {
        self.work_dir.join(OVERLAY_IMAGE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.work_dir.join(LOG_FILE)
    }

    /// Config rooted at `work_dir` with the stock executable names and training defaults.
    pub fn with_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            kraken_dir: None,
            work_dir: work_dir.into(),
            segmenter: "kraken".into(),
            recognizer: "kraken".into(),
            trainer: "ketos".into(),
            recognition_model: DEFAULT_RECOGNITION_MODEL.into(),
            output_model: DEFAULT_OUTPUT_MODEL.into(),
            epochs: DEFAULT_EPOCHS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Segmentation,
    Recognition,
    Training,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Segmentation => "segmentation",
            TaskKind::Recognition => "recognition",
            TaskKind::Training => "training",
        };
        f.write_str(s)
    }
}

/// Value produced by a work item that returned normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValue {
    Nothing,
    Text(String),
}

/// Terminal notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(TaskValue),
    Failure(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }
}

/// Events posted by a worker back to the interactive loop, in emission order.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Progress { kind: TaskKind, text: String },
    Finished { kind: TaskKind, outcome: TaskOutcome },
}

/// One (image, ground truth) entry of the training set. Duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingPair {
    pub image: PathBuf,
    pub ground_truth: PathBuf,
}

impl TrainingPair {
    pub fn new(image: impl Into<PathBuf>, ground_truth: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            ground_truth: ground_truth.into(),
        }
    }
}

/// Final path component for display, falling back to the whole path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

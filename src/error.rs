use crate::model::TaskKind;
use std::path::PathBuf;
use thiserror::Error;

/// Shown whenever an external executable cannot be located.
pub const EXECUTABLE_HINT: &str = "The 'kraken' or 'ketos' command could not be found.\n\
Make sure Kraken is installed and set the Kraken/Ketos directory to the folder that contains its executables.";

/// Failures raised inside a work item. Converted into a terminal failure notification.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Executable '{program}' not found: {source}")]
    ExecutableNotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{step} failed:\nCode: {code}\n{detail}")]
    ProcessFailed {
        step: &'static str,
        code: String,
        detail: String,
    },
    #[error("Input/output error: {0}")]
    InputOutput(#[from] std::io::Error),
    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Text delivered in the failure notification.
    pub fn describe(&self) -> String {
        match self {
            TaskError::ExecutableNotFound { .. } => format!("{self}\n\n{EXECUTABLE_HINT}"),
            other => {
                let mut out = other.to_string();
                let mut source = std::error::Error::source(other);
                while let Some(s) = source {
                    out.push_str(&format!("\nCaused by: {s}"));
                    source = s.source();
                }
                out
            }
        }
    }
}

/// Input rejected before any task is launched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select an image file first.")]
    NoImage,
    #[error("File does not exist: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Cannot load the original image: {message}")]
    UnreadableImage { message: String },
    #[error("Please select an image and segment it successfully first.")]
    NotSegmented,
    #[error("Please enter a recognition model name.")]
    EmptyModel,
    #[error("Please add training files (images and their ground-truth transcriptions) first.")]
    EmptyTrainingSet,
    #[error("Please specify a name for the output model.")]
    EmptyOutputModel,
    #[error("Please enter a positive integer for the number of epochs.")]
    InvalidEpochs,
    #[error("A {0} task is already running.")]
    Busy(TaskKind),
}

/// Problems turning a segmentation file into an overlay. Only the display degrades.
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Cannot read segmentation file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Malformed segmentation JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("No original image is loaded")]
    NoImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_always_carries_hint() {
        let err = TaskError::ExecutableNotFound {
            program: "kraken".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "whatever the OS says"),
        };
        let text = err.describe();
        assert!(text.contains(EXECUTABLE_HINT));
        assert!(text.contains("kraken"));
    }

    #[test]
    fn process_failure_reports_code_and_detail() {
        let err = TaskError::ProcessFailed {
            step: "Segmentation",
            code: "2".into(),
            detail: "Stderr:\nbad image".into(),
        };
        let text = err.describe();
        assert!(text.starts_with("Segmentation failed:"));
        assert!(text.contains("Code: 2"));
        assert!(text.contains("bad image"));
        assert!(!text.contains(EXECUTABLE_HINT));
    }
}

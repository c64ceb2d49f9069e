//! Wrappers around the external Kraken/Ketos command surface.
//!
//! Every function here blocks on a child process and is meant to run inside a
//! work item on the task runner, never on the interactive thread.

mod recognize;
mod segment;
mod train;

pub use recognize::{recognize, recognize_args, NO_TEXT_OUTPUT};
pub use segment::{segment, segment_args};
pub use train::{normalize_model_name, train, train_args, MODEL_EXTENSION};

use crate::error::TaskError;
use crate::model::{TaskEvent, TaskKind, ToolConfig};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Output, Stdio};
use tokio::sync::mpsc;

/// Capability handed to a work item for posting text back to the interactive loop.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    kind: TaskKind,
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ProgressSink {
    pub fn new(kind: TaskKind, tx: mpsc::UnboundedSender<TaskEvent>) -> Self {
        Self { kind, tx }
    }

    pub fn emit(&self, text: impl Into<String>) {
        let _ = self.tx.send(TaskEvent::Progress {
            kind: self.kind,
            text: text.into(),
        });
    }
}

/// Executable names plus the optional directory searched before the ambient `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEnv {
    pub kraken_dir: Option<PathBuf>,
    pub segmenter: String,
    pub recognizer: String,
    pub trainer: String,
}

impl ToolEnv {
    pub fn from_config(cfg: &ToolConfig) -> Self {
        Self {
            kraken_dir: cfg.kraken_dir.clone(),
            segmenter: cfg.segmenter.clone(),
            recognizer: cfg.recognizer.clone(),
            trainer: cfg.trainer.clone(),
        }
    }

    /// Replace the directory with the current text of the directory field. Blank clears it.
    pub fn with_kraken_dir(mut self, dir: &str) -> Self {
        let dir = dir.trim();
        self.kraken_dir = if dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        };
        self
    }

    /// `PATH` value for children, or `None` to inherit the host search path unchanged.
    ///
    /// The directory is not checked for the executables themselves; a directory that
    /// does not exist is ignored with a warning.
    pub fn search_path(&self) -> Option<OsString> {
        let dir = self.kraken_dir.as_ref()?;
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "kraken directory is not a directory, using PATH as is");
            return None;
        }
        let existing = std::env::var_os("PATH").unwrap_or_default();
        let paths = std::iter::once(dir.clone()).chain(std::env::split_paths(&existing));
        match std::env::join_paths(paths) {
            Ok(joined) => Some(joined),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot prepend kraken directory to PATH");
                None
            }
        }
    }

    /// Build a command with the search path and UTF-8 I/O settings applied.
    pub fn command<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUTF8", "1");
        if let Some(path) = self.search_path() {
            cmd.env("PATH", path);
        }
        cmd
    }
}

/// Human-readable rendering of an invocation, as shown in logs.
pub fn command_line<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
    parts.join(" ")
}

pub fn exit_code_label(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}

/// Map a spawn failure, singling out a missing executable.
pub(crate) fn spawn_error(program: &str, e: std::io::Error) -> TaskError {
    if e.kind() == std::io::ErrorKind::NotFound {
        TaskError::ExecutableNotFound {
            program: program.to_string(),
            source: e,
        }
    } else {
        TaskError::InputOutput(e)
    }
}

/// Run to completion capturing both streams.
pub(crate) fn run_captured(program: &str, mut cmd: Command) -> Result<Output, TaskError> {
    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| spawn_error(program, e))?;
    tracing::info!(program, status = %exit_code_label(&output.status), "process exited");
    Ok(output)
}

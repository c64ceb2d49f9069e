//! Application-level orchestration.
//!
//! This module owns the task runner (off-thread execution with ordered progress
//! delivery) and the session state that presentation layers drive. The TUI and the
//! headless CLI both call into it so the gating rules live in one place.

mod runner;
mod session;

pub use runner::{Job, TaskRunner, TaskSlot};
pub use session::{parse_epochs, Notice, OcrPanel, Preview, Session, TrainingPanel};

use crate::model::{TaskEvent, TaskOutcome};
use tokio::sync::mpsc::UnboundedReceiver;

/// Terminal result of a driven job.
#[derive(Debug, Clone)]
pub struct Completed {
    pub outcome: TaskOutcome,
    pub notice: Option<Notice>,
}

/// Submit `job` and feed every event into `session` until its terminal event arrives.
/// `on_progress` sees each progress fragment as it is applied.
pub async fn drive(
    session: &mut Session,
    runner: &TaskRunner,
    event_rx: &mut UnboundedReceiver<TaskEvent>,
    job: Job,
    mut on_progress: impl FnMut(&str),
) -> Option<Completed> {
    let kind = job.kind();
    let _handle = runner.submit(job);
    while let Some(ev) = event_rx.recv().await {
        let finished = match &ev {
            TaskEvent::Progress { text, .. } => {
                on_progress(text);
                None
            }
            TaskEvent::Finished { kind: k, outcome } => Some((*k, outcome.clone())),
        };
        let notice = session.apply_event(ev);
        if let Some((k, outcome)) = finished {
            if k == kind {
                return Some(Completed { outcome, notice });
            }
        }
    }
    None
}

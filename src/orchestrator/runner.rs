//! Off-thread task execution.
//!
//! A work item runs on the blocking pool; its progress and its single terminal
//! notification travel on one unbounded channel that the interactive loop drains.

use crate::engine::ProgressSink;
use crate::error::{TaskError, ValidationError};
use crate::model::{TaskEvent, TaskKind, TaskOutcome, TaskValue};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

type WorkFn = Box<dyn FnOnce(&ProgressSink) -> Result<TaskValue, TaskError> + Send + 'static>;

/// A unit of work ready to submit. Arguments are captured by the closure.
pub struct Job {
    kind: TaskKind,
    work: WorkFn,
}

impl Job {
    pub fn new<F>(kind: TaskKind, work: F) -> Self
    where
        F: FnOnce(&ProgressSink) -> Result<TaskValue, TaskError> + Send + 'static,
    {
        Self {
            kind,
            work: Box::new(work),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("kind", &self.kind).finish()
    }
}

/// Runs jobs on the runtime's blocking pool. No cancellation: once submitted a job
/// runs until its external process exits.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    rt: tokio::runtime::Handle,
    event_tx: UnboundedSender<TaskEvent>,
}

impl TaskRunner {
    pub fn new(rt: tokio::runtime::Handle, event_tx: UnboundedSender<TaskEvent>) -> Self {
        Self { rt, event_tx }
    }

    /// Start `job` on a worker. Safe to call from a non-runtime thread.
    pub fn submit(&self, job: Job) -> JoinHandle<()> {
        let tx = self.event_tx.clone();
        self.rt.spawn_blocking(move || {
            let kind = job.kind;
            let sink = ProgressSink::new(kind, tx.clone());
            let outcome = execute(job, &sink);
            tracing::info!(%kind, success = outcome.is_success(), "task finished");
            // Same sender, same thread: lands after every progress event already sent.
            let _ = tx.send(TaskEvent::Finished { kind, outcome });
        })
    }
}

fn execute(job: Job, sink: &ProgressSink) -> TaskOutcome {
    let Job { work, .. } = job;
    match catch_unwind(AssertUnwindSafe(|| work(sink))) {
        Ok(Ok(value)) => TaskOutcome::Success(value),
        Ok(Err(e)) => TaskOutcome::Failure(e.describe()),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            TaskOutcome::Failure(TaskError::Panicked(msg).describe())
        }
    }
}

/// Single-slot guard for the one task a presentation layer may have outstanding.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskSlot {
    active: Option<TaskKind>,
}

impl TaskSlot {
    pub fn occupy(&mut self, kind: TaskKind) -> Result<(), ValidationError> {
        if let Some(active) = self.active {
            return Err(ValidationError::Busy(active));
        }
        self.active = Some(kind);
        Ok(())
    }

    /// Clear the slot on the terminal notification for `kind`.
    pub fn release(&mut self, kind: TaskKind) {
        if self.active == Some(kind) {
            self.active = None;
        } else {
            tracing::warn!(%kind, active = ?self.active, "terminal notification for a task that is not active");
        }
    }

    pub fn active(&self) -> Option<TaskKind> {
        self.active
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EXECUTABLE_HINT;
    use tokio::sync::mpsc;

    async fn run_to_end(job: Job) -> Vec<TaskEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = TaskRunner::new(tokio::runtime::Handle::current(), tx);
        runner.submit(job).await.unwrap();
        drop(runner);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn progress_precedes_terminal_in_emission_order() {
        let events = run_to_end(Job::new(TaskKind::Training, |sink| {
            for i in 0..50 {
                sink.emit(format!("line {i}"));
            }
            Ok(TaskValue::Text("done".into()))
        }))
        .await;

        assert_eq!(events.len(), 51);
        for (i, ev) in events[..50].iter().enumerate() {
            match ev {
                TaskEvent::Progress { kind, text } => {
                    assert_eq!(*kind, TaskKind::Training);
                    assert_eq!(text, &format!("line {i}"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        match &events[50] {
            TaskEvent::Finished { kind, outcome } => {
                assert_eq!(*kind, TaskKind::Training);
                assert_eq!(*outcome, TaskOutcome::Success(TaskValue::Text("done".into())));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_found_failure_carries_hint() {
        let events = run_to_end(Job::new(TaskKind::Segmentation, |_| {
            Err(TaskError::ExecutableNotFound {
                program: "kraken".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "x"),
            })
        }))
        .await;

        match events.last() {
            Some(TaskEvent::Finished {
                outcome: TaskOutcome::Failure(msg),
                ..
            }) => assert!(msg.contains(EXECUTABLE_HINT)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let events = run_to_end(Job::new(TaskKind::Recognition, |sink| {
            sink.emit("before");
            panic!("boom");
        }))
        .await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            TaskEvent::Finished {
                outcome: TaskOutcome::Failure(msg),
                ..
            } => assert!(msg.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn slot_rejects_second_task_until_released() {
        let mut slot = TaskSlot::default();
        slot.occupy(TaskKind::Segmentation).unwrap();
        assert_eq!(
            slot.occupy(TaskKind::Training),
            Err(ValidationError::Busy(TaskKind::Segmentation))
        );
        slot.release(TaskKind::Training);
        assert!(slot.is_busy());
        slot.release(TaskKind::Segmentation);
        assert!(!slot.is_busy());
        slot.occupy(TaskKind::Training).unwrap();
        assert_eq!(slot.active(), Some(TaskKind::Training));
    }
}

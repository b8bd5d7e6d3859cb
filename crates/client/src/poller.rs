use crate::schedule::ScheduledTask;
use crate::service::AnalysisService;
use crate::types::{StatusSnapshot, TaskId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Fixed delay between the end of one status request and the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
/// Consecutive failed status requests after which polling gives up.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("status request failed: {0}")]
    Transport(String),

    #[error("gave up after {attempts} consecutive failed status requests, last error: {last}")]
    ConsecutiveFailures { attempts: u32, last: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollEvent {
    /// A fetched status snapshot. A terminal snapshot is the last event.
    Snapshot(StatusSnapshot),
    /// A status request failed; polling continues at the next interval.
    Retrying {
        consecutive_errors: u32,
        error: PollError,
    },
    /// Polling stopped before the job reached a terminal state.
    Aborted(PollError),
}

/// Handle on a running status poller. Dropping it stops the polling.
#[derive(Debug)]
pub struct PollHandle {
    task_id: TaskId,
    task: ScheduledTask,
}

impl PollHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn cancel(&self) {
        tracing::debug!("task {}: polling cancelled", self.task_id);
        self.task.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts polling the status of `task_id`.
///
/// Events are delivered in request order on the returned receiver, which
/// closes once polling ends.
pub fn spawn_poller(
    service: Arc<dyn AnalysisService>,
    task_id: TaskId,
    config: PollConfig,
) -> (PollHandle, mpsc::UnboundedReceiver<PollEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let task = ScheduledTask::spawn({
        let task_id = task_id.clone();
        move |token| run_poller(service, task_id, config, token, events_tx)
    });

    (PollHandle { task_id, task }, events_rx)
}

async fn run_poller(
    service: Arc<dyn AnalysisService>,
    task_id: TaskId,
    config: PollConfig,
    token: CancellationToken,
    events: mpsc::UnboundedSender<PollEvent>,
) {
    let mut consecutive_errors = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(config.interval) => {}
        }

        // One request at a time: the next sleep only starts once this
        // request has been answered.
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            response = service.task_status(&task_id) => response,
        };
        if token.is_cancelled() {
            tracing::debug!("task {task_id}: dropping status response after cancellation");
            return;
        }

        let event = match response {
            Ok(snapshot) => {
                consecutive_errors = 0;
                tracing::debug!(
                    "task {task_id}: status {} progress {}%",
                    snapshot.status,
                    snapshot.progress
                );
                let terminal = snapshot.status.is_terminal();
                if events.send(PollEvent::Snapshot(snapshot)).is_err() || terminal {
                    return;
                }
                continue;
            }
            Err(err) => {
                consecutive_errors += 1;
                if consecutive_errors >= config.max_consecutive_errors {
                    tracing::error!(
                        "task {task_id}: status request failed {consecutive_errors} times in a row, giving up: {err}"
                    );
                    let _ = events.send(PollEvent::Aborted(PollError::ConsecutiveFailures {
                        attempts: consecutive_errors,
                        last: err.to_string(),
                    }));
                    return;
                }
                tracing::warn!(
                    "task {task_id}: status request failed ({consecutive_errors}/{}), retrying: {err}",
                    config.max_consecutive_errors
                );
                PollEvent::Retrying {
                    consecutive_errors,
                    error: PollError::Transport(err.to_string()),
                }
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}

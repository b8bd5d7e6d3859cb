use super::analysis::AnalysisResult;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque job identifier assigned by the analysis service at submission time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        TaskId(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        TaskId(id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One status report for a job, as returned by the status endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    #[serde(
        default,
        deserialize_with = "deserialize_result",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusSnapshot {
    pub fn processing(progress: u8) -> Self {
        StatusSnapshot {
            status: TaskStatus::Processing,
            progress,
            ..Default::default()
        }
    }

    pub fn completed(result: AnalysisResult) -> Self {
        StatusSnapshot {
            status: TaskStatus::Completed,
            progress: 100,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        StatusSnapshot {
            status: TaskStatus::Failed,
            progress: 0,
            result: None,
            error: Some(error.into()),
        }
    }
}

// Services report progress as any JSON number (or null); clamp it into 0..=100.
fn deserialize_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    let progress = value
        .and_then(|n| n.as_f64())
        .filter(|p| p.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);
    Ok(progress.round() as u8)
}

// A malformed field in the result must not hide a finished job.
fn deserialize_result<'de, D>(deserializer: D) -> Result<Option<AnalysisResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| !v.is_null())
        .map(|v| AnalysisResult::lenient(&v)))
}

/// Terminal outcome of a job. Exactly one of result or error exists, and
/// only once the job is terminal.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    Completed(AnalysisResult),
    Failed(String),
}

/// Client-side view of one submitted job.
///
/// Created once at submission; only [`TaskHandle::apply`] mutates it.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskHandle {
    id: TaskId,
    status: TaskStatus,
    progress: u8,
    outcome: Option<TaskOutcome>,
}

impl TaskHandle {
    pub fn new(id: TaskId) -> Self {
        TaskHandle {
            id,
            status: TaskStatus::Queued,
            progress: 0,
            outcome: None,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Applies a freshly fetched snapshot. Returns the outcome when this
    /// snapshot moved the handle into a terminal state.
    ///
    /// Snapshots received after the handle became terminal are ignored.
    /// Progress never goes backwards while the job is still running.
    pub fn apply(&mut self, snapshot: StatusSnapshot) -> Option<&TaskOutcome> {
        if self.is_terminal() {
            tracing::debug!(
                "task {}: ignoring {} snapshot after terminal state",
                self.id,
                snapshot.status
            );
            return None;
        }

        self.status = snapshot.status;
        match snapshot.status {
            TaskStatus::Queued | TaskStatus::Processing => {
                self.progress = self.progress.max(snapshot.progress);
                None
            }
            TaskStatus::Completed => {
                self.progress = snapshot.progress;
                // A completed job without a result cannot be handed on.
                self.outcome = Some(match snapshot.result {
                    Some(result) => TaskOutcome::Completed(result),
                    None => {
                        self.status = TaskStatus::Failed;
                        TaskOutcome::Failed(
                            "service reported completion without a result".to_string(),
                        )
                    }
                });
                self.outcome.as_ref()
            }
            TaskStatus::Failed => {
                self.progress = snapshot.progress;
                let message = snapshot
                    .error
                    .filter(|msg| !msg.trim().is_empty())
                    .unwrap_or_else(|| "analysis failed without an error message".to_string());
                self.outcome = Some(TaskOutcome::Failed(message));
                self.outcome.as_ref()
            }
        }
    }
}

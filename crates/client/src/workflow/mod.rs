use crate::poller::PollError;
use crate::types::{
    AnalysisResult, BoundaryResult, ElevationResult, StatusSnapshot, TaskHandle, TaskId,
    TaskOutcome,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[allow(clippy::enum_variant_names)]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("submission failed: {0}")]
    Submission(String),

    #[error("status polling failed: {0}")]
    Poll(#[from] PollError),

    #[error("analysis failed: {0}")]
    RemoteFailure(String),

    #[error("volume estimation failed: {0}")]
    VolumeEstimation(String),

    #[error("boundary check failed: {0}")]
    BoundaryCheck(String),

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("a request is already in flight")]
    Busy,

    #[error("analysis session closed")]
    SessionClosed,
}

/// State a failed workflow returns to once the failure is acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryPoint {
    AwaitingImage,
    AwaitingDem,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum WorkflowState {
    #[default]
    AwaitingImage,
    Submitting {
        file_name: String,
    },
    Detecting {
        task: TaskHandle,
    },
    DetectionDone,
    AwaitingDem,
    EstimatingVolume,
    VolumeDone,
    Failed {
        error: WorkflowError,
        recover_to: RecoveryPoint,
    },
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::AwaitingImage => "awaiting image",
            WorkflowState::Submitting { .. } => "submitting",
            WorkflowState::Detecting { .. } => "detecting",
            WorkflowState::DetectionDone => "detection done",
            WorkflowState::AwaitingDem => "awaiting DEM",
            WorkflowState::EstimatingVolume => "estimating volume",
            WorkflowState::VolumeDone => "volume done",
            WorkflowState::Failed { .. } => "failed",
        }
    }

    /// States with a remote request outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            WorkflowState::Submitting { .. }
                | WorkflowState::Detecting { .. }
                | WorkflowState::EstimatingVolume
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two phase analysis workflow: detect mining footprints, then
/// estimate excavated volume under them.
///
/// Pure state machine; the session drives it from command and network
/// events. Results are shared behind `Arc` so views are cheap to clone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workflow {
    state: WorkflowState,
    analysis: Option<Arc<AnalysisResult>>,
    elevation: Option<Arc<ElevationResult>>,
    boundary: Option<Arc<BoundaryResult>>,
}

impl Workflow {
    pub fn new() -> Self {
        Workflow::default()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn analysis(&self) -> Option<&Arc<AnalysisResult>> {
        self.analysis.as_ref()
    }

    pub fn elevation(&self) -> Option<&Arc<ElevationResult>> {
        self.elevation.as_ref()
    }

    pub fn boundary(&self) -> Option<&Arc<BoundaryResult>> {
        self.boundary.as_ref()
    }

    /// Task currently being tracked, if detection is running.
    pub fn task(&self) -> Option<&TaskHandle> {
        match &self.state {
            WorkflowState::Detecting { task } => Some(task),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        match &self.state {
            WorkflowState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Whether step-2 (volume estimation) controls may be offered.
    pub fn volume_step_available(&self) -> bool {
        matches!(
            self.state,
            WorkflowState::AwaitingDem
                | WorkflowState::Failed {
                    recover_to: RecoveryPoint::AwaitingDem,
                    ..
                }
        )
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        if self.state.is_busy() {
            WorkflowError::Busy
        } else {
            WorkflowError::InvalidTransition {
                action,
                state: self.state.name(),
            }
        }
    }

    fn transition(&mut self, next: WorkflowState) {
        tracing::debug!("workflow: {} -> {}", self.state, next);
        self.state = next;
    }

    fn at_image_step(&self) -> bool {
        matches!(
            self.state,
            WorkflowState::AwaitingImage
                | WorkflowState::Failed {
                    recover_to: RecoveryPoint::AwaitingImage,
                    ..
                }
        )
    }

    fn clear_results(&mut self) {
        self.analysis = None;
        self.elevation = None;
        self.boundary = None;
    }

    /// `AwaitingImage → Submitting`. A step-1 failure may be retried
    /// directly.
    pub fn begin_submission(&mut self, file_name: &str) -> Result<(), WorkflowError> {
        if !self.at_image_step() {
            return Err(self.invalid("submit an image"));
        }
        self.clear_results();
        self.transition(WorkflowState::Submitting {
            file_name: file_name.to_string(),
        });
        Ok(())
    }

    /// `Submitting → Detecting` with a fresh task handle.
    pub fn submission_accepted(&mut self, task_id: TaskId) -> Result<(), WorkflowError> {
        if !matches!(self.state, WorkflowState::Submitting { .. }) {
            return Err(self.invalid("track a submitted task"));
        }
        self.transition(WorkflowState::Detecting {
            task: TaskHandle::new(task_id),
        });
        Ok(())
    }

    /// `Submitting → Failed`, recovering to `AwaitingImage`.
    pub fn submission_failed(&mut self, message: impl Into<String>) -> Result<(), WorkflowError> {
        if !matches!(self.state, WorkflowState::Submitting { .. }) {
            return Err(self.invalid("fail a submission"));
        }
        self.fail(
            WorkflowError::Submission(message.into()),
            RecoveryPoint::AwaitingImage,
        );
        Ok(())
    }

    /// Applies a polled snapshot to the tracked task. A terminal snapshot
    /// moves the workflow to `DetectionDone` or `Failed`; returns whether it
    /// was terminal.
    pub fn apply_snapshot(&mut self, snapshot: StatusSnapshot) -> Result<bool, WorkflowError> {
        if !matches!(self.state, WorkflowState::Detecting { .. }) {
            return Err(self.invalid("apply a status snapshot"));
        }
        let WorkflowState::Detecting { task } = &mut self.state else {
            return Ok(false);
        };

        match task.apply(snapshot).cloned() {
            None => Ok(false),
            Some(TaskOutcome::Completed(result)) => {
                tracing::info!(
                    "task {}: detection completed, area {:?} ha",
                    task.id(),
                    result.area_ha
                );
                self.analysis = Some(Arc::new(result));
                self.transition(WorkflowState::DetectionDone);
                Ok(true)
            }
            Some(TaskOutcome::Failed(message)) => {
                tracing::warn!("task {}: detection failed: {message}", task.id());
                self.fail(
                    WorkflowError::RemoteFailure(message),
                    RecoveryPoint::AwaitingImage,
                );
                Ok(true)
            }
        }
    }

    /// `Detecting → Failed` when the poller gave up.
    pub fn polling_aborted(&mut self, error: PollError) -> Result<(), WorkflowError> {
        if !matches!(self.state, WorkflowState::Detecting { .. }) {
            return Err(self.invalid("abort polling"));
        }
        self.fail(WorkflowError::Poll(error), RecoveryPoint::AwaitingImage);
        Ok(())
    }

    /// Side channel `AwaitingImage → DetectionDone` with a pre-canned result.
    pub fn use_sample(&mut self, sample: AnalysisResult) -> Result<(), WorkflowError> {
        if !self.at_image_step() {
            return Err(self.invalid("load sample data"));
        }
        self.clear_results();
        self.analysis = Some(Arc::new(sample));
        self.transition(WorkflowState::DetectionDone);
        Ok(())
    }

    /// `DetectionDone → AwaitingDem`.
    pub fn proceed(&mut self) -> Result<(), WorkflowError> {
        if self.state != WorkflowState::DetectionDone {
            return Err(self.invalid("proceed to volume estimation"));
        }
        self.transition(WorkflowState::AwaitingDem);
        Ok(())
    }

    /// `AwaitingDem → EstimatingVolume`; returns the detection result the
    /// request must carry. A failed volume estimation may be retried directly.
    pub fn begin_volume(&mut self) -> Result<Arc<AnalysisResult>, WorkflowError> {
        if !self.volume_step_available() {
            return Err(self.invalid("estimate volume"));
        }
        let analysis = self
            .analysis
            .clone()
            .ok_or_else(|| self.invalid("estimate volume"))?;
        self.elevation = None;
        self.transition(WorkflowState::EstimatingVolume);
        Ok(analysis)
    }

    /// `EstimatingVolume → VolumeDone`.
    pub fn volume_completed(&mut self, result: ElevationResult) -> Result<(), WorkflowError> {
        if self.state != WorkflowState::EstimatingVolume {
            return Err(self.invalid("complete volume estimation"));
        }
        self.elevation = Some(Arc::new(result));
        self.transition(WorkflowState::VolumeDone);
        Ok(())
    }

    /// `EstimatingVolume → Failed`, recovering to `AwaitingDem` with the
    /// detection result kept.
    pub fn volume_failed(&mut self, message: impl Into<String>) -> Result<(), WorkflowError> {
        if self.state != WorkflowState::EstimatingVolume {
            return Err(self.invalid("fail volume estimation"));
        }
        self.fail(
            WorkflowError::VolumeEstimation(message.into()),
            RecoveryPoint::AwaitingDem,
        );
        Ok(())
    }

    /// The detection result a boundary check would run against. Allowed
    /// whenever a detection result exists and nothing is in flight.
    pub fn boundary_input(&self) -> Result<Arc<AnalysisResult>, WorkflowError> {
        if self.state.is_busy() {
            return Err(WorkflowError::Busy);
        }
        self.analysis
            .clone()
            .ok_or_else(|| self.invalid("check the lease boundary"))
    }

    pub fn boundary_checked(&mut self, result: BoundaryResult) {
        if self.analysis.is_some() {
            self.boundary = Some(Arc::new(result));
        }
    }

    /// Leaves `Failed` for its recovery point.
    pub fn recover(&mut self) -> Result<(), WorkflowError> {
        let recover_to = match &self.state {
            WorkflowState::Failed { recover_to, .. } => *recover_to,
            _ => return Err(self.invalid("recover")),
        };
        match recover_to {
            RecoveryPoint::AwaitingImage => {
                self.clear_results();
                self.transition(WorkflowState::AwaitingImage);
            }
            RecoveryPoint::AwaitingDem => self.transition(WorkflowState::AwaitingDem),
        }
        Ok(())
    }

    /// Abandons the outstanding request, retreating to the state it was
    /// started from. Idle states are left as they are.
    pub fn cancel(&mut self) {
        match self.state {
            WorkflowState::Submitting { .. } | WorkflowState::Detecting { .. } => {
                self.clear_results();
                self.transition(WorkflowState::AwaitingImage);
            }
            WorkflowState::EstimatingVolume => self.transition(WorkflowState::AwaitingDem),
            _ => {}
        }
    }

    /// Back to the start from any state, discarding all results.
    pub fn reset(&mut self) {
        self.clear_results();
        self.transition(WorkflowState::AwaitingImage);
    }

    fn fail(&mut self, error: WorkflowError, recover_to: RecoveryPoint) {
        self.transition(WorkflowState::Failed { error, recover_to });
    }
}

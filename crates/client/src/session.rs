use crate::poller::{spawn_poller, PollConfig, PollError, PollEvent, PollHandle};
use crate::schedule::ScheduledRequest;
use crate::service::{AnalysisService, DemSource, ServiceError, UploadFile};
use crate::types::{sample_analysis, BoundaryResult, ElevationResult, TaskId};
use crate::workflow::{Workflow, WorkflowError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const COMMAND_QUEUE_SIZE: usize = 32;

/// Mutations a session consumer may request.
#[derive(Debug)]
pub enum Command {
    SubmitImage(UploadFile),
    UseSample,
    Proceed,
    EstimateVolume(DemSource),
    CheckBoundary(UploadFile),
    Recover,
    Reset,
    /// Abandon the outstanding request, if any.
    Cancel,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::SubmitImage(_) => "submit image",
            Command::UseSample => "use sample",
            Command::Proceed => "proceed",
            Command::EstimateVolume(_) => "estimate volume",
            Command::CheckBoundary(_) => "check boundary",
            Command::Recover => "recover",
            Command::Reset => "reset",
            Command::Cancel => "cancel",
        }
    }
}

#[derive(Debug)]
struct SessionCommand {
    command: Command,
    callback: Option<oneshot::Sender<Result<(), WorkflowError>>>,
}

/// Read-only snapshot of a session, republished after every change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionView {
    pub workflow: Workflow,
    /// Consecutive failed status requests of the running poll.
    pub poll_errors: u32,
    pub boundary_pending: bool,
    pub boundary_error: Option<WorkflowError>,
}

impl SessionView {
    /// No request outstanding.
    pub fn is_settled(&self) -> bool {
        !self.workflow.state().is_busy() && !self.boundary_pending
    }
}

/// Cloneable front end of a running session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    /// Sends a command and waits until the session has applied it. The
    /// published view already reflects the command when this returns.
    pub async fn send(&self, command: Command) -> Result<(), WorkflowError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand {
                command,
                callback: Some(tx),
            })
            .await
            .map_err(|_| WorkflowError::SessionClosed)?;
        rx.await.map_err(|_| WorkflowError::SessionClosed)?
    }

    /// Fire and forget variant of `send`.
    pub async fn post(&self, command: Command) -> Result<(), WorkflowError> {
        self.commands
            .send(SessionCommand {
                command,
                callback: None,
            })
            .await
            .map_err(|_| WorkflowError::SessionClosed)
    }

    pub async fn submit_image(&self, image: UploadFile) -> Result<(), WorkflowError> {
        self.send(Command::SubmitImage(image)).await
    }

    pub async fn use_sample(&self) -> Result<(), WorkflowError> {
        self.send(Command::UseSample).await
    }

    pub async fn proceed(&self) -> Result<(), WorkflowError> {
        self.send(Command::Proceed).await
    }

    pub async fn estimate_volume(&self, dem: DemSource) -> Result<(), WorkflowError> {
        self.send(Command::EstimateVolume(dem)).await
    }

    pub async fn check_boundary(&self, boundary: UploadFile) -> Result<(), WorkflowError> {
        self.send(Command::CheckBoundary(boundary)).await
    }

    pub async fn recover(&self) -> Result<(), WorkflowError> {
        self.send(Command::Recover).await
    }

    pub async fn reset(&self) -> Result<(), WorkflowError> {
        self.send(Command::Reset).await
    }

    pub async fn cancel(&self) -> Result<(), WorkflowError> {
        self.send(Command::Cancel).await
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Waits for the first published view matching `predicate`, including
    /// the current one.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&SessionView) -> bool,
    ) -> Result<SessionView, WorkflowError> {
        let mut view = self.view.clone();
        let matched = view
            .wait_for(predicate)
            .await
            .map_err(|_| WorkflowError::SessionClosed)?;
        Ok(matched.clone())
    }

    /// Waits until no request is outstanding.
    pub async fn wait_settled(&self) -> Result<SessionView, WorkflowError> {
        self.wait_until(SessionView::is_settled).await
    }
}

/// The single request a session may have outstanding.
enum InFlight {
    Submission(ScheduledRequest<Result<TaskId, ServiceError>>),
    Polling {
        // Held for revocation on drop.
        _handle: PollHandle,
        events: mpsc::UnboundedReceiver<PollEvent>,
    },
    Volume(ScheduledRequest<Result<ElevationResult, ServiceError>>),
    Boundary(ScheduledRequest<Result<BoundaryResult, ServiceError>>),
}

enum Completion {
    Submitted(Result<TaskId, ServiceError>),
    Polled(Option<PollEvent>),
    Volume(Result<ElevationResult, ServiceError>),
    Boundary(Result<BoundaryResult, ServiceError>),
    /// The request task ended without replying.
    Lost,
}

impl InFlight {
    async fn next(&mut self) -> Completion {
        match self {
            InFlight::Submission(request) => request
                .reply()
                .await
                .map_or(Completion::Lost, Completion::Submitted),
            InFlight::Polling { events, .. } => Completion::Polled(events.recv().await),
            InFlight::Volume(request) => request
                .reply()
                .await
                .map_or(Completion::Lost, Completion::Volume),
            InFlight::Boundary(request) => request
                .reply()
                .await
                .map_or(Completion::Lost, Completion::Boundary),
        }
    }
}

async fn next_completion(in_flight: &mut Option<InFlight>) -> Completion {
    match in_flight {
        Some(work) => work.next().await,
        None => std::future::pending().await,
    }
}

struct Session {
    service: Arc<dyn AnalysisService>,
    poll: PollConfig,
    workflow: Workflow,
    in_flight: Option<InFlight>,
    poll_errors: u32,
    boundary_error: Option<WorkflowError>,
    view: watch::Sender<SessionView>,
}

impl Session {
    fn publish(&self) {
        let boundary_pending = matches!(self.in_flight, Some(InFlight::Boundary(_)));
        self.view.send_replace(SessionView {
            workflow: self.workflow.clone(),
            poll_errors: self.poll_errors,
            boundary_pending,
            boundary_error: self.boundary_error.clone(),
        });
    }

    fn ensure_idle(&self) -> Result<(), WorkflowError> {
        match self.in_flight {
            Some(_) => Err(WorkflowError::Busy),
            None => Ok(()),
        }
    }

    fn revoke(&mut self) {
        if self.in_flight.take().is_some() {
            tracing::debug!("revoked outstanding request");
        }
        self.poll_errors = 0;
    }

    fn handle(&mut self, command: Command) -> Result<(), WorkflowError> {
        match command {
            Command::SubmitImage(image) => {
                self.ensure_idle()?;
                self.workflow.begin_submission(&image.file_name)?;
                self.boundary_error = None;
                let service = self.service.clone();
                self.in_flight = Some(InFlight::Submission(ScheduledRequest::spawn(
                    async move { service.submit_detection(&image).await },
                )));
            }
            Command::UseSample => {
                self.ensure_idle()?;
                self.workflow.use_sample(sample_analysis())?;
                self.boundary_error = None;
                tracing::info!("loaded built-in sample analysis");
            }
            Command::Proceed => self.workflow.proceed()?,
            Command::EstimateVolume(dem) => {
                self.ensure_idle()?;
                let analysis = self.workflow.begin_volume()?;
                let service = self.service.clone();
                self.in_flight = Some(InFlight::Volume(ScheduledRequest::spawn(async move {
                    service.estimate_volume(&analysis, &dem).await
                })));
            }
            Command::CheckBoundary(boundary) => {
                self.ensure_idle()?;
                let analysis = self.workflow.boundary_input()?;
                self.boundary_error = None;
                let service = self.service.clone();
                self.in_flight = Some(InFlight::Boundary(ScheduledRequest::spawn(async move {
                    service.check_boundary(&analysis, &boundary).await
                })));
            }
            Command::Recover => {
                self.workflow.recover()?;
                if self.workflow.analysis().is_none() {
                    self.revoke();
                    self.boundary_error = None;
                }
            }
            Command::Reset => {
                self.revoke();
                self.boundary_error = None;
                self.workflow.reset();
            }
            Command::Cancel => {
                self.revoke();
                self.workflow.cancel();
            }
        }
        Ok(())
    }

    fn complete(&mut self, completion: Completion) -> Result<(), WorkflowError> {
        match completion {
            Completion::Submitted(Ok(task_id)) => {
                self.in_flight = None;
                tracing::info!("submission accepted as task {task_id}");
                self.workflow.submission_accepted(task_id.clone())?;
                let (handle, events) = spawn_poller(self.service.clone(), task_id, self.poll);
                self.poll_errors = 0;
                self.in_flight = Some(InFlight::Polling {
                    _handle: handle,
                    events,
                });
            }
            Completion::Submitted(Err(err)) => {
                self.in_flight = None;
                tracing::error!("submission failed: {err}");
                self.workflow.submission_failed(err.to_string())?;
            }
            Completion::Polled(Some(PollEvent::Snapshot(snapshot))) => {
                self.poll_errors = 0;
                if self.workflow.apply_snapshot(snapshot)? {
                    self.in_flight = None;
                }
            }
            Completion::Polled(Some(PollEvent::Retrying {
                consecutive_errors, ..
            })) => {
                self.poll_errors = consecutive_errors;
            }
            Completion::Polled(Some(PollEvent::Aborted(err))) => {
                self.in_flight = None;
                self.workflow.polling_aborted(err)?;
            }
            Completion::Polled(None) => {
                self.in_flight = None;
                if self.workflow.task().is_some() {
                    self.workflow.polling_aborted(PollError::Transport(
                        "status polling stopped unexpectedly".to_string(),
                    ))?;
                }
            }
            Completion::Volume(result) => {
                self.in_flight = None;
                match result {
                    Ok(elevation) => {
                        tracing::info!(
                            "volume estimation finished: {:?} m3, max depth {:?} m",
                            elevation.volume_m3,
                            elevation.max_depth_m
                        );
                        self.workflow.volume_completed(elevation)?;
                    }
                    Err(err) => {
                        tracing::error!("volume estimation failed: {err}");
                        self.workflow.volume_failed(err.to_string())?;
                    }
                }
            }
            Completion::Boundary(result) => {
                self.in_flight = None;
                match result {
                    Ok(boundary) => {
                        tracing::info!(
                            "boundary check finished: {:?} ha illegal",
                            boundary.illegal_area_ha
                        );
                        self.workflow.boundary_checked(boundary);
                    }
                    Err(err) => {
                        tracing::error!("boundary check failed: {err}");
                        self.boundary_error = Some(WorkflowError::BoundaryCheck(err.to_string()));
                    }
                }
            }
            Completion::Lost => {
                self.in_flight = None;
                // Retreat so the session is not left waiting forever.
                self.workflow.cancel();
            }
        }
        Ok(())
    }
}

/// Starts a session driving one analysis workflow against `service`.
///
/// The session owns all workflow state; consumers read it through the
/// published view and mutate it only through commands. The session ends
/// when every handle is dropped, revoking any outstanding request.
pub fn spawn_session(
    service: Arc<dyn AnalysisService>,
    poll: PollConfig,
) -> (JoinHandle<()>, SessionHandle) {
    let (commands_tx, mut commands_rx) = mpsc::channel::<SessionCommand>(COMMAND_QUEUE_SIZE);
    let (view_tx, view_rx) = watch::channel(SessionView::default());

    let mut session = Session {
        service,
        poll,
        workflow: Workflow::new(),
        in_flight: None,
        poll_errors: 0,
        boundary_error: None,
        view: view_tx,
    };

    let jh = tokio::spawn(async move {
        loop {
            tokio::select! {
                command = commands_rx.recv() => {
                    let Some(SessionCommand { command, callback }) = command else {
                        tracing::debug!("all session handles dropped, stopping");
                        break;
                    };
                    let name = command.name();
                    let result = session.handle(command);
                    if let Err(err) = &result {
                        tracing::debug!("command {name} rejected: {err}");
                    }
                    session.publish();
                    if let Some(callback) = callback {
                        let _ = callback.send(result);
                    }
                }
                completion = next_completion(&mut session.in_flight) => {
                    if let Err(err) = session.complete(completion) {
                        tracing::warn!("completion does not fit the workflow: {err}");
                    }
                    session.publish();
                }
            }
        }
    });

    (
        jh,
        SessionHandle {
            commands: commands_tx,
            view: view_rx,
        },
    )
}

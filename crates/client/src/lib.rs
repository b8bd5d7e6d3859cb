pub mod config;
pub mod map;
pub mod poller;
pub mod projection;
pub mod report;
pub mod schedule;
pub mod service;
pub mod session;
pub mod terrain;
pub mod types;
pub mod workflow;

pub use config::ClientConfig;
pub use poller::{spawn_poller, PollConfig, PollError, PollEvent, PollHandle};
pub use service::{
    AnalysisService, DemSource, HealthStatus, HttpAnalysisService, ServiceError, UploadFile,
};
pub use session::{spawn_session, Command, SessionHandle, SessionView};
pub use workflow::{RecoveryPoint, Workflow, WorkflowError, WorkflowState};

mod analysis;
mod sample;
mod task;

pub use analysis::{AnalysisResult, BoundaryResult, ElevationResult, FeatureCollection};
pub use sample::{sample_analysis, SAMPLE_AREA_HA};
pub use task::{StatusSnapshot, TaskHandle, TaskId, TaskOutcome, TaskStatus};

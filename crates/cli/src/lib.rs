use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use terravigil_client::report::ReportRecord;
use terravigil_client::terrain::TerrainMesh;
use terravigil_client::types::{
    sample_analysis, AnalysisResult, BoundaryResult, ElevationResult, StatusSnapshot, TaskId,
};
use terravigil_client::{
    spawn_session, AnalysisService, DemSource, HealthStatus, PollConfig, SessionView,
    UploadFile,
};

mod progress;

type BoxResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Where `detect` takes the elevation model from, if volume is wanted.
#[derive(Clone, Debug)]
pub enum DemChoice {
    File(PathBuf),
    Auto(String),
}

#[derive(Clone, Debug)]
pub struct DetectRequest {
    pub image: PathBuf,
    pub dem: Option<DemChoice>,
    pub boundary: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Everything a `detect` run produced.
#[derive(Clone, Debug, Default)]
pub struct DetectOutcome {
    pub analysis: AnalysisResult,
    pub elevation: Option<ElevationResult>,
    pub boundary: Option<BoundaryResult>,
    pub report: Option<PathBuf>,
}

pub async fn run_health_command(service: &dyn AnalysisService) -> BoxResult<HealthStatus> {
    Ok(service
        .health()
        .await
        .map_err(|err| format!("Analysis service is not reachable:{err}"))?)
}

pub async fn run_sample_command(
    service: &dyn AnalysisService,
    remote: bool,
) -> BoxResult<AnalysisResult> {
    if !remote {
        return Ok(sample_analysis());
    }
    Ok(service
        .sample_data()
        .await
        .map_err(|err| format!("Error during sample data download:{err}"))?)
}

pub async fn run_status_command(
    service: &dyn AnalysisService,
    task_id: String,
) -> BoxResult<StatusSnapshot> {
    let task_id = TaskId::new(task_id);
    Ok(service
        .task_status(&task_id)
        .await
        .map_err(|err| format!("Error during status request of task {task_id}:{err}"))?)
}

/// Runs the whole workflow: detection, then the optional boundary check,
/// volume estimation and report.
pub async fn run_detect_command(
    service: Arc<dyn AnalysisService>,
    poll: PollConfig,
    request: DetectRequest,
) -> BoxResult<DetectOutcome> {
    let image = read_upload(&request.image).await?;
    let file_name = image.file_name.clone();

    let (session_jh, session) = spawn_session(service, poll);
    session.submit_image(image).await?;
    let view = progress::follow_session(&session, &file_name).await?;
    settled_ok(&view)?;

    if let Some(boundary) = &request.boundary {
        session.check_boundary(read_upload(boundary).await?).await?;
        let view = session.wait_settled().await?;
        if let Some(err) = view.boundary_error {
            return Err(err.into());
        }
    }

    if let Some(dem) = &request.dem {
        let dem = match dem {
            DemChoice::File(path) => DemSource::Upload(read_upload(path).await?),
            DemChoice::Auto(source) => DemSource::Auto {
                source: source.clone(),
            },
        };
        session.proceed().await?;
        session.estimate_volume(dem).await?;
        settled_ok(&session.wait_settled().await?)?;
    }

    let view = session.view();
    drop(session);
    let _ = session_jh.await;

    let analysis = view
        .workflow
        .analysis()
        .map(|a| a.as_ref().clone())
        .ok_or("Detection finished without a result")?;
    let elevation = view.workflow.elevation().map(|e| e.as_ref().clone());
    let boundary = view.workflow.boundary().map(|b| b.as_ref().clone());

    if let Some(path) = &request.report {
        ReportRecord::new(
            Some(&analysis),
            elevation.as_ref(),
            boundary.as_ref(),
            Utc::now(),
        )?
        .write_to(path)
        .await?;
    }

    Ok(DetectOutcome {
        analysis,
        elevation,
        boundary,
        report: request.report,
    })
}

/// Builds the terrain mesh for a DEM stored as JSON, either a full volume
/// estimation response or a bare grid. Writes the mesh as JSON when
/// `output` is given.
pub async fn run_terrain_command(dem_json: &Path, output: Option<&Path>) -> BoxResult<TerrainMesh> {
    let content = tokio::fs::read(dem_json)
        .await
        .map_err(|err| format!("Can't read DEM file {}:{err}", dem_json.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&content)
        .map_err(|err| format!("Json decoding error :{err} in {}", dem_json.display()))?;

    let elevation = if value.is_array() {
        ElevationResult::lenient(&json!({ "dem_data": value }))
    } else {
        ElevationResult::lenient(&value)
    };
    let mesh = TerrainMesh::for_elevation(Some(&elevation));

    if let Some(output) = output {
        tokio::fs::write(output, serde_json::to_vec(&mesh)?)
            .await
            .map_err(|err| format!("Can't write mesh file {}:{err}", output.display()))?;
    }
    Ok(mesh)
}

async fn read_upload(path: &Path) -> BoxResult<UploadFile> {
    Ok(UploadFile::from_path(path)
        .await
        .map_err(|err| format!("File not readable:{}:{err}", path.display()))?)
}

fn settled_ok(view: &SessionView) -> BoxResult<()> {
    match view.workflow.error() {
        Some(err) => Err(err.clone().into()),
        None => Ok(()),
    }
}

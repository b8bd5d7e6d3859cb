use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use terravigil_client::types::TaskStatus;
use terravigil_client::{
    spawn_session, AnalysisService, DemSource, HttpAnalysisService, PollConfig, PollError,
    ServiceError, SessionHandle, UploadFile, WorkflowError, WorkflowState,
};
use terravigil_e2e_tests::MockAnalysisServer;

const POLL: PollConfig = PollConfig {
    interval: Duration::from_millis(20),
    max_consecutive_errors: 3,
};

async fn start() -> (MockAnalysisServer, Arc<HttpAnalysisService>) {
    let server = MockAnalysisServer::new("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let service = HttpAnalysisService::new(&server.url(), Duration::from_secs(5)).unwrap();
    (server, Arc::new(service))
}

fn session(service: Arc<HttpAnalysisService>) -> SessionHandle {
    let (_jh, handle) = spawn_session(service, POLL);
    handle
}

fn image() -> UploadFile {
    UploadFile::new("sample.tif", b"II*\0 not really a tiff".to_vec())
}

fn completed(area_ha: f64) -> (u16, serde_json::Value) {
    (
        200,
        json!({
            "status": "completed",
            "progress": 100,
            "result": {
                "geojson": {
                    "type": "FeatureCollection",
                    "features": [{
                        "type": "Feature",
                        "properties": {},
                        "geometry": {
                            "type": "Polygon",
                            "coordinates": [[[10.0, 10.0], [10.1, 10.0], [10.1, 10.1], [10.0, 10.0]]]
                        }
                    }]
                },
                "area_ha": area_ha,
                "mask_shape": [256, 256],
            }
        }),
    )
}

#[tokio::test]
async fn test_detection_then_volume_over_http() {
    let (server, service) = start().await;
    server
        .script_statuses(vec![
            (200, json!({ "status": "processing", "progress": 40 })),
            completed(12.5),
        ])
        .await;
    let session = session(service);

    session.submit_image(image()).await.unwrap();
    let view = session.wait_settled().await.unwrap();
    assert_eq!(view.workflow.state(), &WorkflowState::DetectionDone);
    let analysis = view.workflow.analysis().unwrap().clone();
    assert_eq!(analysis.area_ha, Some(12.5));
    assert_eq!(server.hits("detect_mining_async").await, 1);
    assert_eq!(server.hits("task_status").await, 2);

    let upload = server.last_body("detect_mining_async").await.unwrap();
    let upload = String::from_utf8_lossy(&upload);
    assert!(upload.contains("name=\"file\""));
    assert!(upload.contains("filename=\"sample.tif\""));

    session.proceed().await.unwrap();
    session
        .estimate_volume(DemSource::Auto {
            source: "srtm".to_string(),
        })
        .await
        .unwrap();
    let view = session.wait_settled().await.unwrap();
    assert_eq!(view.workflow.state(), &WorkflowState::VolumeDone);
    let elevation = view.workflow.elevation().unwrap();
    assert_eq!(elevation.volume_m3, Some(85000.0));
    assert_eq!(elevation.dem_data.as_ref().map(Vec::len), Some(3));

    // The detection geometry travels unmodified into the volume request.
    let body = server.last_body("volume_estimation_auto").await.unwrap();
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("name=\"mining_geojson\""));
    assert!(body.contains("name=\"dem_source\""));
    assert!(body.contains(&analysis.geometry().to_json_string()));
}

#[tokio::test]
async fn test_completed_job_with_string_numbers_is_detected() {
    let (server, service) = start().await;
    server
        .script_statuses(vec![(
            200,
            json!({
                "status": "completed",
                "progress": 100,
                "result": {
                    "geojson": { "type": "FeatureCollection", "features": [] },
                    "area_ha": "12.5",
                    "mask_shape": [256, 256.5],
                }
            }),
        )])
        .await;
    let session = session(service);

    session.submit_image(image()).await.unwrap();
    let view = session.wait_settled().await.unwrap();
    assert_eq!(view.workflow.state(), &WorkflowState::DetectionDone);
    let analysis = view.workflow.analysis().unwrap();
    assert_eq!(analysis.area_ha, Some(12.5));
    assert_eq!(analysis.mask_shape, None);
    assert_eq!(server.hits("task_status").await, 1);
}

#[tokio::test]
async fn test_uploaded_dem_goes_to_manual_endpoint() {
    let (server, service) = start().await;
    let session = session(service);

    session.use_sample().await.unwrap();
    session.proceed().await.unwrap();
    session
        .estimate_volume(DemSource::Upload(UploadFile::new(
            "dem.tif",
            b"elevation".to_vec(),
        )))
        .await
        .unwrap();
    let view = session.wait_settled().await.unwrap();

    assert_eq!(view.workflow.state(), &WorkflowState::VolumeDone);
    assert_eq!(server.hits("volume_estimation").await, 1);
    assert_eq!(server.hits("volume_estimation_auto").await, 0);
    assert_eq!(server.hits("detect_mining_async").await, 0);
    let body = server.last_body("volume_estimation").await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("filename=\"dem.tif\""));
}

#[tokio::test]
async fn test_failed_job_surfaces_service_message() {
    let (server, service) = start().await;
    server
        .script_statuses(vec![
            (200, json!({ "status": "queued", "progress": 0 })),
            (200, json!({ "status": "failed", "progress": 30, "error": "no cloud free pixels" })),
        ])
        .await;
    let session = session(service);

    session.submit_image(image()).await.unwrap();
    let view = session.wait_settled().await.unwrap();
    assert_eq!(
        view.workflow.error(),
        Some(&WorkflowError::RemoteFailure(
            "no cloud free pixels".to_string()
        ))
    );
}

#[tokio::test]
async fn test_status_errors_abort_after_three() {
    let (server, service) = start().await;
    server
        .script_statuses(vec![
            (500, json!({ "detail": "worker crashed" })),
            (503, json!({ "detail": "overloaded" })),
            (500, json!({ "detail": "worker crashed again" })),
        ])
        .await;
    let session = session(service);

    session.submit_image(image()).await.unwrap();
    let view = session.wait_settled().await.unwrap();
    match view.workflow.error() {
        Some(WorkflowError::Poll(PollError::ConsecutiveFailures { attempts, last })) => {
            assert_eq!(*attempts, 3);
            assert!(last.contains("worker crashed again"), "{last}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(server.hits("task_status").await, 3);
}

#[tokio::test]
async fn test_rejected_submission_is_not_polled() {
    let (server, service) = start().await;
    server
        .script_submissions(vec![(415, json!({ "detail": "unsupported file type" }))])
        .await;
    let session = session(service);

    session.submit_image(image()).await.unwrap();
    let view = session.wait_settled().await.unwrap();
    assert!(matches!(
        view.workflow.error(),
        Some(WorkflowError::Submission(message)) if message.contains("unsupported file type")
    ));
    assert_eq!(server.hits("task_status").await, 0);
}

#[tokio::test]
async fn test_cancel_stops_polling() {
    let (server, service) = start().await;
    let session = session(service);

    session.submit_image(image()).await.unwrap();
    session
        .wait_until(|v| v.workflow.task().map(|t| t.status()) == Some(TaskStatus::Processing))
        .await
        .unwrap();
    session.cancel().await.unwrap();
    let polled = server.hits("task_status").await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.view().workflow.state(), &WorkflowState::AwaitingImage);
    // At most the request already on the wire when cancelling.
    assert!(server.hits("task_status").await <= polled + 1);
}

#[tokio::test]
async fn test_boundary_check_over_http() {
    let (server, service) = start().await;
    let session = session(service);

    session.use_sample().await.unwrap();
    session
        .check_boundary(UploadFile::new(
            "lease.geojson",
            br#"{"type":"FeatureCollection","features":[]}"#.to_vec(),
        ))
        .await
        .unwrap();
    let view = session.wait_settled().await.unwrap();

    let boundary = view.workflow.boundary().unwrap();
    assert_eq!(boundary.illegal_area_ha, Some(2.5));
    assert_eq!(view.workflow.state(), &WorkflowState::DetectionDone);

    let body = server.last_body("illegal_mining").await.unwrap();
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("name=\"mining_geojson_file\""));
    assert!(body.contains("filename=\"lease.geojson\""));
}

#[tokio::test]
async fn test_direct_service_calls() {
    let (server, service) = start().await;

    let health = service.health().await.unwrap();
    assert_eq!(health.status.as_deref(), Some("ok"));

    let sample = service.sample_data().await.unwrap();
    assert_eq!(sample.area_ha, Some(45.7));
    assert_eq!(sample.mask_shape, Some(vec![512, 512]));

    server
        .script_statuses(vec![(404, json!({ "detail": "task not found" }))])
        .await;
    match service.task_status(&"missing".into()).await {
        Err(ServiceError::Http { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "task not found");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

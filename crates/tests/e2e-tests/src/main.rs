use clap::Parser;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use terravigil_client::projection::{summarize_analysis, summarize_elevation};
use terravigil_client::{
    spawn_session, DemSource, HttpAnalysisService, PollConfig, UploadFile, WorkflowState,
};
use terravigil_e2e_tests::MockAnalysisServer;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[clap(author = "TerraVigil Team", version, about, long_about = None)]
pub struct ArgConfiguration {
    /// Run against this analysis service instead of the built-in mock.
    #[clap(short, long)]
    pub service_url: Option<String>,
    #[clap(short, long, default_value = "127.0.0.1:0")]
    pub listen_addr: SocketAddr,
    #[clap(short, long, default_value_t = 200)]
    pub poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::INFO.into()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = ArgConfiguration::parse();

    let (service_url, mock) = match cfg.service_url {
        Some(url) => (url, None),
        None => {
            let mock = MockAnalysisServer::new(cfg.listen_addr).await?;
            mock.script_statuses(vec![
                (200, json!({ "status": "queued", "progress": 0 })),
                (200, json!({ "status": "processing", "progress": 40 })),
                (
                    200,
                    json!({
                        "status": "completed",
                        "progress": 100,
                        "result": {
                            "geojson": { "type": "FeatureCollection", "features": [] },
                            "area_ha": 12.5,
                            "mask_shape": [512, 512],
                        }
                    }),
                ),
            ])
            .await;
            (mock.url(), Some(mock))
        }
    };

    let service = Arc::new(HttpAnalysisService::new(&service_url, Duration::from_secs(60))?);
    let poll = PollConfig {
        interval: Duration::from_millis(cfg.poll_interval_ms),
        ..Default::default()
    };
    let (session_jh, session) = spawn_session(service, poll);

    let mut image = vec![0u8; 64 * 1024];
    StdRng::from_entropy().fill_bytes(&mut image);
    session
        .submit_image(UploadFile::new("e2e-sample.tif", image))
        .await?;

    let view = session.wait_settled().await?;
    if let Some(err) = view.workflow.error() {
        return Err(format!("detection failed: {err}").into());
    }
    let summary = summarize_analysis(view.workflow.analysis().map(|a| a.as_ref()));
    println!("detection done: {} in {} features", summary.area, summary.feature_count);

    session.proceed().await?;
    session
        .estimate_volume(DemSource::Auto {
            source: "srtm".to_string(),
        })
        .await?;
    let view = session.wait_settled().await?;
    if view.workflow.state() != &WorkflowState::VolumeDone {
        return Err(format!("volume estimation ended in {}", view.workflow.state()).into());
    }
    let summary = summarize_elevation(view.workflow.elevation().map(|e| e.as_ref()));
    println!("volume estimation done: {} (max depth {})", summary.volume, summary.max_depth);

    if let Some(mock) = mock {
        println!(
            "mock served {} status requests",
            mock.hits("task_status").await
        );
    }

    drop(session);
    let _ = session_jh.await;
    Ok(())
}

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{self, Bytes};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Scripted HTTP response: status code and JSON body.
pub type Scripted = (u16, Value);

struct ServerState {
    next_task: u64,
    submissions: VecDeque<Scripted>,
    statuses: VecDeque<Scripted>,
    volume: Scripted,
    boundary: Scripted,
    hits: HashMap<String, usize>,
    bodies: HashMap<String, Bytes>,
}

impl Default for ServerState {
    fn default() -> Self {
        ServerState {
            next_task: 0,
            submissions: VecDeque::new(),
            statuses: VecDeque::new(),
            volume: (
                200,
                json!({
                    "dem_data": [[101.5, 100.0, 99.0], [100.5, 92.0, 98.5], [101.0, 99.5, 100.0]],
                    "max_depth_m": 8.5,
                    "avg_depth_m": 3.2,
                    "volume_m3": 85000.0,
                    "baseline_reference_elevation": 100.4,
                }),
            ),
            boundary: (
                200,
                json!({
                    "legal_area_ha": 10.0,
                    "illegal_area_ha": 2.5,
                    "legal_geojson": { "type": "FeatureCollection", "features": [] },
                    "illegal_geojson": { "type": "FeatureCollection", "features": [] },
                }),
            ),
            hits: HashMap::new(),
            bodies: HashMap::new(),
        }
    }
}

/// In-process stand-in for the analysis service HTTP contract.
#[derive(Clone)]
pub struct MockAnalysisServer {
    state: Arc<RwLock<ServerState>>,
    listen_addr: SocketAddr,
}

impl MockAnalysisServer {
    pub async fn new(listen_addr: SocketAddr) -> Result<Self> {
        let mut server = MockAnalysisServer {
            state: Arc::new(RwLock::new(ServerState::default())),
            listen_addr,
        };

        server.listen_addr = server.listen(listen_addr).await?;
        Ok(server)
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.listen_addr)
    }

    /// Queues status responses; once exhausted the job reports `processing 50`.
    pub async fn script_statuses(&self, statuses: Vec<Scripted>) {
        self.state.write().await.statuses.extend(statuses);
    }

    /// Queues submission responses; once exhausted submissions are accepted.
    pub async fn script_submissions(&self, submissions: Vec<Scripted>) {
        self.state.write().await.submissions.extend(submissions);
    }

    pub async fn set_volume_response(&self, response: Scripted) {
        self.state.write().await.volume = response;
    }

    pub async fn set_boundary_response(&self, response: Scripted) {
        self.state.write().await.boundary = response;
    }

    /// Requests received on a route, `task_status` counted under its prefix.
    pub async fn hits(&self, route: &str) -> usize {
        self.state.read().await.hits.get(route).copied().unwrap_or(0)
    }

    /// Body of the last request received on a route.
    pub async fn last_body(&self, route: &str) -> Option<Bytes> {
        self.state.read().await.bodies.get(route).cloned()
    }

    async fn listen(&self, listen_addr: SocketAddr) -> Result<SocketAddr> {
        let listener = TcpListener::bind(listen_addr).await?;

        // Re-read the listen address in case random port was used.
        let addr = listener.local_addr()?;

        tokio::spawn({
            let server = self.clone();
            async move {
                loop {
                    let stream = match listener.accept().await {
                        Ok((stream, _)) => stream,
                        Err(err) => {
                            tracing::error!("accept failed: {err}");
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);

                    tokio::task::spawn({
                        let server = server.clone();
                        async move {
                            if let Err(err) = http1::Builder::new()
                                .serve_connection(io, service_fn(|req| server.serve(req)))
                                .await
                            {
                                tracing::warn!("error serving connection: {err:?}");
                            }
                        }
                    });
                }
            }
        });

        tracing::info!("mock analysis service listening on http://{addr}");
        Ok(addr)
    }

    async fn serve(
        &self,
        req: Request<body::Incoming>,
    ) -> std::result::Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().trim_start_matches('/').to_string();
        let route = match path.split_once('/') {
            Some((prefix, _)) => prefix.to_string(),
            None => path.clone(),
        };
        let body = req.into_body().collect().await?.to_bytes();

        let mut state = self.state.write().await;
        *state.hits.entry(route.clone()).or_default() += 1;
        state.bodies.insert(route.clone(), body);
        tracing::debug!("{method} /{path}");

        let (status, value) = match (method, route.as_str()) {
            (Method::POST, "detect_mining_async") => match state.submissions.pop_front() {
                Some(scripted) => scripted,
                None => {
                    state.next_task += 1;
                    (200, json!({ "task_id": format!("task-{}", state.next_task) }))
                }
            },
            (Method::GET, "task_status") => state
                .statuses
                .pop_front()
                .unwrap_or_else(|| (200, json!({ "status": "processing", "progress": 50 }))),
            (Method::GET, "sample_data") => (
                200,
                json!({
                    "geojson": { "type": "FeatureCollection", "features": [] },
                    "area_ha": 45.7,
                    "mask_shape": [512, 512],
                }),
            ),
            (Method::GET, "health") => (200, json!({ "status": "ok", "message": "mock" })),
            (Method::POST, "volume_estimation" | "volume_estimation_auto") => state.volume.clone(),
            (Method::POST, "illegal_mining") => state.boundary.clone(),
            _ => (404, json!({ "detail": "Not Found" })),
        };

        Ok(json_response(status, &value))
    }
}

fn json_response(status: u16, value: &Value) -> Response<BoxBody<Bytes, hyper::Error>> {
    let mut response = Response::new(
        Full::new(Bytes::from(value.to_string()))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

use super::{AnalysisService, DemSource, HealthStatus, ServiceError, UploadFile};
use crate::config::ClientConfig;
use crate::types::{AnalysisResult, BoundaryResult, ElevationResult, StatusSnapshot, TaskId};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const SUBMIT_DETECTION_PATH: &str = "detect_mining_async";
const TASK_STATUS_PATH: &str = "task_status/";
const SAMPLE_DATA_PATH: &str = "sample_data";
const HEALTH_PATH: &str = "health";
const VOLUME_ESTIMATION_PATH: &str = "volume_estimation";
const VOLUME_ESTIMATION_AUTO_PATH: &str = "volume_estimation_auto";
const BOUNDARY_CHECK_PATH: &str = "illegal_mining";

#[derive(Deserialize)]
struct SubmitResponse {
    task_id: TaskId,
}

/// reqwest based client for the analysis service HTTP contract.
pub struct HttpAnalysisService {
    client: Client,
    base_url: Url,
}

impl HttpAnalysisService {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ServiceError> {
        let mut base_url = Url::parse(base_url)?;
        // Endpoints are joined relative to the base; keep its last segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(HttpAnalysisService { client, base_url })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ServiceError> {
        HttpAnalysisService::new(&config.service_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        Ok(self.base_url.join(path)?)
    }

    fn task_status_url(&self, task_id: &TaskId) -> Result<Url, ServiceError> {
        let mut url = self.endpoint(TASK_STATUS_PATH)?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidInput("service url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(task_id.as_str());
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
        if !response.status().is_success() {
            return Err(ServiceError::from_response(response).await);
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn file_part(upload: &UploadFile) -> Part {
    Part::bytes(upload.content.to_vec()).file_name(upload.file_name.clone())
}

fn require_content(upload: &UploadFile, what: &str) -> Result<(), ServiceError> {
    if upload.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "{what} {} is empty",
            upload.file_name
        )));
    }
    Ok(())
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn submit_detection(&self, image: &UploadFile) -> Result<TaskId, ServiceError> {
        require_content(image, "image")?;
        tracing::info!(
            "submitting {} ({} bytes, blake3 {})",
            image.file_name,
            image.len(),
            image.checksum()
        );

        let form = Form::new().part("file", file_part(image));
        let response = self
            .client
            .post(self.endpoint(SUBMIT_DETECTION_PATH)?)
            .multipart(form)
            .send()
            .await?;
        let submitted: SubmitResponse = Self::decode(response).await?;
        Ok(submitted.task_id)
    }

    async fn task_status(&self, task_id: &TaskId) -> Result<StatusSnapshot, ServiceError> {
        let response = self
            .client
            .get(self.task_status_url(task_id)?)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn sample_data(&self) -> Result<AnalysisResult, ServiceError> {
        let response = self
            .client
            .get(self.endpoint(SAMPLE_DATA_PATH)?)
            .send()
            .await?;
        let value: serde_json::Value = Self::decode(response).await?;
        Ok(AnalysisResult::lenient(&value))
    }

    async fn health(&self) -> Result<HealthStatus, ServiceError> {
        let response = self.client.get(self.endpoint(HEALTH_PATH)?).send().await?;
        Self::decode(response).await
    }

    async fn estimate_volume(
        &self,
        detection: &AnalysisResult,
        dem: &DemSource,
    ) -> Result<ElevationResult, ServiceError> {
        let geojson = detection.geometry().to_json_string();
        let (path, form) = match dem {
            DemSource::Upload(dem_file) => {
                require_content(dem_file, "DEM")?;
                tracing::info!(
                    "volume estimation with uploaded DEM {} ({} bytes)",
                    dem_file.file_name,
                    dem_file.len()
                );
                let form = Form::new()
                    .part("dem_file", file_part(dem_file))
                    .text("mining_geojson", geojson);
                (VOLUME_ESTIMATION_PATH, form)
            }
            DemSource::Auto { source } => {
                tracing::info!("volume estimation with auto-fetched DEM from {source}");
                let form = Form::new()
                    .text("mining_geojson", geojson)
                    .text("dem_source", source.clone());
                (VOLUME_ESTIMATION_AUTO_PATH, form)
            }
        };

        let response = self
            .client
            .post(self.endpoint(path)?)
            .multipart(form)
            .send()
            .await?;
        let value: serde_json::Value = Self::decode(response).await?;
        Ok(ElevationResult::lenient(&value))
    }

    async fn check_boundary(
        &self,
        detection: &AnalysisResult,
        boundary: &UploadFile,
    ) -> Result<BoundaryResult, ServiceError> {
        require_content(boundary, "boundary file")?;
        let mining = Part::text(detection.geometry().to_json_string())
            .file_name("mining.geojson")
            .mime_str("application/geo+json")?;
        let form = Form::new()
            .part("mining_geojson_file", mining)
            .part("boundary_file", file_part(boundary));

        let response = self
            .client
            .post(self.endpoint(BOUNDARY_CHECK_PATH)?)
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }
}

use crate::types::{AnalysisResult, BoundaryResult, ElevationResult, StatusSnapshot, TaskId};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod http;

pub use http::HttpAnalysisService;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid service url: {0}")]
    Url(#[from] url::ParseError),

    /// Network level failure: connection refused, timeout, broken body.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("decoding error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ServiceError {
    pub async fn from_response(response: reqwest::Response) -> ServiceError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response text".to_string());

        ServiceError::Http {
            status,
            message: detail_message(&message),
        }
    }
}

// FastAPI style backends wrap the error text into `{"detail": "..."}`.
fn detail_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(|d| d.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

/// A file to upload as one multipart part.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub content: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        UploadFile {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        Ok(UploadFile::new(file_name, content))
    }

    pub fn checksum(&self) -> blake3::Hash {
        blake3::hash(&self.content)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Where the elevation model for volume estimation comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum DemSource {
    /// DEM file supplied by the user.
    Upload(UploadFile),
    /// Let the service fetch a DEM covering the footprint from a named source.
    Auto { source: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The remote analysis service.
///
/// The HTTP implementation is [`HttpAnalysisService`]; tests plug in
/// scripted implementations.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Starts a detection job for a satellite image.
    async fn submit_detection(&self, image: &UploadFile) -> Result<TaskId, ServiceError>;

    async fn task_status(&self, task_id: &TaskId) -> Result<StatusSnapshot, ServiceError>;

    async fn sample_data(&self) -> Result<AnalysisResult, ServiceError>;

    async fn health(&self) -> Result<HealthStatus, ServiceError>;

    /// Estimates excavated volume under the detected footprint. The
    /// detection geometry is forwarded unmodified.
    async fn estimate_volume(
        &self,
        detection: &AnalysisResult,
        dem: &DemSource,
    ) -> Result<ElevationResult, ServiceError>;

    /// Splits the detected footprint into legal and illegal parts against a
    /// lease boundary (GeoJSON or zipped shapefile).
    async fn check_boundary(
        &self,
        detection: &AnalysisResult,
        boundary: &UploadFile,
    ) -> Result<BoundaryResult, ServiceError>;
}

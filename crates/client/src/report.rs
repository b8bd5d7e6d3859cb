use crate::projection::{summarize_analysis, summarize_boundary, summarize_elevation};
use crate::types::{AnalysisResult, BoundaryResult, ElevationResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const REPORT_TITLE: &str = "TerraVigil Compliance Report";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("nothing to report: no detection result")]
    NoAnalysis,

    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Flat record of projected metrics handed to the document exporter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    pub generated: String,
    pub total_area: String,
    pub illegal_area: String,
    pub legal_area: String,
    pub volume: String,
    pub max_depth: String,
    pub avg_depth: String,
    pub feature_count: String,
}

impl ReportRecord {
    pub fn new(
        analysis: Option<&AnalysisResult>,
        elevation: Option<&ElevationResult>,
        boundary: Option<&BoundaryResult>,
        generated: DateTime<Utc>,
    ) -> Result<Self, ReportError> {
        let analysis = analysis.ok_or(ReportError::NoAnalysis)?;
        let detected = summarize_analysis(Some(analysis));
        let elevation = summarize_elevation(elevation);
        let boundary = summarize_boundary(boundary);

        Ok(ReportRecord {
            generated: generated.format("%Y-%m-%d").to_string(),
            total_area: detected.area,
            illegal_area: boundary.illegal_area,
            legal_area: boundary.legal_area,
            volume: elevation.volume,
            max_depth: elevation.max_depth,
            avg_depth: elevation.avg_depth,
            feature_count: detected.feature_count,
        })
    }

    pub fn render(&self) -> String {
        let rows = [
            ("Generated", &self.generated),
            ("Detected mining area", &self.total_area),
            ("Mining sites", &self.feature_count),
            ("Area inside lease", &self.legal_area),
            ("Area outside lease", &self.illegal_area),
            ("Excavated volume", &self.volume),
            ("Maximum depth", &self.max_depth),
            ("Average depth", &self.avg_depth),
        ];
        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(out, "{REPORT_TITLE}");
        let _ = writeln!(out, "{}", "=".repeat(REPORT_TITLE.len()));
        let _ = writeln!(out);
        for (label, value) in rows {
            let _ = writeln!(out, "{label:<width$}  {value}");
        }
        out
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        tokio::fs::write(path, self.render())
            .await
            .map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!("report written to {}", path.display());
        Ok(())
    }
}

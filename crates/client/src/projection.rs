//! Display-ready figures derived from possibly partial results.
//!
//! Every function here is total: a missing or malformed field renders as a
//! placeholder instead of failing.

use crate::types::{AnalysisResult, BoundaryResult, ElevationResult};
use serde_json::Value;

/// Shown for a detection figure that is not known.
pub const PLACEHOLDER: &str = "—";
/// Shown for an elevation metric the service did not produce.
pub const NOT_AVAILABLE: &str = "N/A";

const HECTARES_PER_KM2: f64 = 100.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub area: String,
    pub area_km2: String,
    pub feature_count: String,
    pub mask_shape: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElevationSummary {
    pub max_depth: String,
    pub avg_depth: String,
    pub volume: String,
    pub baseline: String,
    pub grid: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundarySummary {
    pub legal_area: String,
    pub illegal_area: String,
    pub illegal_share: String,
}

pub fn summarize_analysis(result: Option<&AnalysisResult>) -> AnalysisSummary {
    let area_ha = result.and_then(|r| r.area_ha);
    let features = result
        .and_then(|r| r.geojson.as_ref())
        .and_then(|g| g.feature_count());
    let mask = result.and_then(|r| r.mask_shape.as_deref());

    AnalysisSummary {
        area: or_placeholder(area_ha.map(|a| format!("{} ha", group_thousands(a, 2))), PLACEHOLDER),
        area_km2: or_placeholder(
            area_ha.map(|a| format!("{:.2} km²", a / HECTARES_PER_KM2)),
            PLACEHOLDER,
        ),
        feature_count: or_placeholder(features.map(|n| n.to_string()), PLACEHOLDER),
        mask_shape: match mask {
            Some([rows, cols]) => format!("{rows} × {cols}"),
            _ => PLACEHOLDER.to_string(),
        },
    }
}

/// Same as [`summarize_analysis`] over a raw service payload.
pub fn summarize_analysis_json(raw: &Value) -> AnalysisSummary {
    summarize_analysis(Some(&AnalysisResult::lenient(raw)))
}

pub fn summarize_elevation(result: Option<&ElevationResult>) -> ElevationSummary {
    let grid = match result.and_then(|r| r.dem_data.as_ref()) {
        Some(rows) if !rows.is_empty() => {
            format!("{} × {}", rows.len(), rows[0].len())
        }
        _ => NOT_AVAILABLE.to_string(),
    };

    ElevationSummary {
        max_depth: metric(result.and_then(|r| r.max_depth_m), "m", 1),
        avg_depth: metric(result.and_then(|r| r.avg_depth_m), "m", 1),
        volume: metric(result.and_then(|r| r.volume_m3), "m³", 0),
        baseline: metric(result.and_then(|r| r.baseline_reference_elevation), "m", 1),
        grid,
    }
}

pub fn summarize_boundary(result: Option<&BoundaryResult>) -> BoundarySummary {
    let legal = result.and_then(|r| r.legal_area_ha);
    let illegal = result.and_then(|r| r.illegal_area_ha);
    let share = match (legal, illegal) {
        (Some(legal), Some(illegal)) if legal + illegal > 0.0 => {
            Some(format!("{:.1} %", illegal / (legal + illegal) * 100.0))
        }
        _ => None,
    };

    BoundarySummary {
        legal_area: or_placeholder(legal.map(|a| format!("{} ha", group_thousands(a, 2))), PLACEHOLDER),
        illegal_area: or_placeholder(
            illegal.map(|a| format!("{} ha", group_thousands(a, 2))),
            PLACEHOLDER,
        ),
        illegal_share: or_placeholder(share, PLACEHOLDER),
    }
}

fn metric(value: Option<f64>, unit: &str, decimals: usize) -> String {
    or_placeholder(
        value.map(|v| format!("{} {unit}", group_thousands(v, decimals))),
        NOT_AVAILABLE,
    )
}

fn or_placeholder(value: Option<String>, placeholder: &str) -> String {
    value.unwrap_or_else(|| placeholder.to_string())
}

/// Formats `value` with `decimals` fraction digits and comma separated
/// thousands.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    // Values that round to zero print without a sign.
    let rounds_to_zero = formatted.chars().all(|c| c == '0' || c == '.');
    if value.is_sign_negative() && !rounds_to_zero {
        grouped.push('-');
    }
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

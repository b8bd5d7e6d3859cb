use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// GeoJSON `FeatureCollection` produced by the analysis service.
///
/// The geometry is opaque to the client: it is kept exactly as received and
/// handed back to the service unmodified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureCollection(Value);

impl FeatureCollection {
    pub fn empty() -> Self {
        FeatureCollection(serde_json::json!({
            "type": "FeatureCollection",
            "features": [],
        }))
    }

    pub fn from_value(value: Value) -> Self {
        FeatureCollection(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Number of features, `None` when the collection carries no feature list.
    pub fn feature_count(&self) -> Option<usize> {
        self.0.get("features").and_then(Value::as_array).map(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.feature_count().unwrap_or(0) == 0
    }

    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        FeatureCollection::empty()
    }
}

/// Output of the detection phase, input of the volume estimation phase.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geojson: Option<FeatureCollection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_ha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_shape: Option<Vec<u64>>,
    // Anything else the service sends is carried along untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResult {
    /// Field by field decoding that never fails: a malformed field is
    /// treated as absent instead of rejecting the whole record.
    pub fn lenient(value: &Value) -> Self {
        let mut extra = value.as_object().cloned().unwrap_or_default();
        let geojson = extra
            .remove("geojson")
            .filter(Value::is_object)
            .map(FeatureCollection::from_value);
        let area_ha = extra.remove("area_ha").as_ref().and_then(lenient_f64);
        let mask_shape = extra.remove("mask_shape").and_then(|shape| {
            shape
                .as_array()?
                .iter()
                .map(Value::as_u64)
                .collect::<Option<Vec<_>>>()
        });

        AnalysisResult {
            geojson,
            area_ha,
            mask_shape,
            extra,
        }
    }

    /// The geometry to hand to follow-up requests, an empty collection when
    /// the detection produced none.
    pub fn geometry(&self) -> FeatureCollection {
        self.geojson.clone().unwrap_or_default()
    }
}

/// Result of the DEM based volume estimation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElevationResult {
    /// Rectangular grid of elevation samples; `None` samples are no-data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dem_data: Option<Vec<Vec<Option<f64>>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_depth_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_m3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_reference_elevation: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElevationResult {
    pub fn lenient(value: &Value) -> Self {
        let mut extra = value.as_object().cloned().unwrap_or_default();
        let dem_data = extra.remove("dem_data").and_then(|grid| {
            grid.as_array()?
                .iter()
                .map(|row| {
                    row.as_array()
                        .map(|samples| samples.iter().map(Value::as_f64).collect::<Vec<_>>())
                })
                .collect::<Option<Vec<_>>>()
        });
        let mut take = |key: &str| extra.remove(key).as_ref().and_then(lenient_f64);
        let max_depth_m = take("max_depth_m");
        let avg_depth_m = take("avg_depth_m");
        let volume_m3 = take("volume_m3");
        let baseline_reference_elevation = take("baseline_reference_elevation");

        ElevationResult {
            dem_data,
            max_depth_m,
            avg_depth_m,
            volume_m3,
            baseline_reference_elevation,
            extra,
        }
    }
}

/// Legal / illegal split of the detected footprint against a lease boundary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_area_ha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illegal_area_ha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_geojson: Option<FeatureCollection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illegal_geojson: Option<FeatureCollection>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Numbers sometimes arrive as strings from loosely typed backends.
fn lenient_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "area_ha": 3.5,
            "geojson": {"type": "FeatureCollection", "features": [{"type": "Feature"}]},
            "model_version": "ndvi-0.2",
        });
        let result: AnalysisResult = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(result.extra.get("model_version"), Some(&json!("ndvi-0.2")));
        assert_eq!(serde_json::to_value(&result).unwrap(), raw);
    }

    #[test]
    fn test_lenient_analysis_drops_only_malformed_fields() {
        let result = AnalysisResult::lenient(&json!({
            "area_ha": "12.5",
            "geojson": "not an object",
            "mask_shape": [10, "x"],
        }));
        assert_eq!(result.area_ha, Some(12.5));
        assert!(result.geojson.is_none());
        assert!(result.mask_shape.is_none());
    }

    #[test]
    fn test_lenient_on_non_object_is_empty() {
        assert_eq!(AnalysisResult::lenient(&json!(42)), AnalysisResult::default());
        assert_eq!(ElevationResult::lenient(&json!([])), ElevationResult::default());
    }

    #[test]
    fn test_lenient_elevation_keeps_no_data_samples() {
        let result = ElevationResult::lenient(&json!({
            "dem_data": [[1.0, null], [2.5, 3.0]],
            "volume_m3": 85000,
        }));
        assert_eq!(
            result.dem_data,
            Some(vec![vec![Some(1.0), None], vec![Some(2.5), Some(3.0)]])
        );
        assert_eq!(result.volume_m3, Some(85000.0));
        assert_eq!(result.max_depth_m, None);
    }

    #[test]
    fn test_feature_count() {
        assert_eq!(FeatureCollection::empty().feature_count(), Some(0));
        assert!(FeatureCollection::empty().is_empty());
        assert_eq!(FeatureCollection::from_value(json!({})).feature_count(), None);
    }
}

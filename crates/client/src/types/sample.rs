use super::analysis::{AnalysisResult, FeatureCollection};
use serde_json::json;

/// Area of the canned sample footprint, in hectares.
pub const SAMPLE_AREA_HA: f64 = 45.7;

/// Pre-canned detection result used by the "use sample data" shortcut.
///
/// Built locally, no service round trip is involved.
pub fn sample_analysis() -> AnalysisResult {
    let geojson = FeatureCollection::from_value(json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "id": 1, "label": "open pit" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-74.0, 40.7], [-74.0, 40.8], [-73.9, 40.8], [-73.9, 40.7], [-74.0, 40.7]
                    ]]
                }
            },
            {
                "type": "Feature",
                "properties": { "id": 2, "label": "spoil heap" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-73.9, 40.75], [-73.9, 40.85], [-73.85, 40.85], [-73.85, 40.75], [-73.9, 40.75]
                    ]]
                }
            }
        ]
    }));

    AnalysisResult {
        geojson: Some(geojson),
        area_ha: Some(SAMPLE_AREA_HA),
        mask_shape: Some(vec![512, 512]),
        ..Default::default()
    }
}

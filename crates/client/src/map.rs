use crate::types::{AnalysisResult, BoundaryResult, FeatureCollection};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Detected,
    Legal,
    Illegal,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Detected => write!(f, "detected"),
            LayerKind::Legal => write!(f, "legal"),
            LayerKind::Illegal => write!(f, "illegal"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LayerStyle {
    pub color: &'static str,
    pub weight: f32,
    pub fill_opacity: f32,
}

impl LayerKind {
    pub fn style(&self) -> LayerStyle {
        match self {
            LayerKind::Detected | LayerKind::Legal => LayerStyle {
                color: "#00BFFF",
                weight: 2.0,
                fill_opacity: 0.2,
            },
            LayerKind::Illegal => LayerStyle {
                color: "#FF4136",
                weight: 2.0,
                fill_opacity: 0.4,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapLayer {
    pub kind: LayerKind,
    pub style: LayerStyle,
    pub visible: bool,
    pub data: FeatureCollection,
}

/// Layer set handed to the map renderer.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MapLayers {
    layers: Vec<MapLayer>,
}

impl MapLayers {
    /// Builds the layers that have data. All layers start visible.
    pub fn from_results(
        analysis: Option<&AnalysisResult>,
        boundary: Option<&BoundaryResult>,
    ) -> Self {
        let candidates = [
            (LayerKind::Detected, analysis.and_then(|a| a.geojson.as_ref())),
            (LayerKind::Legal, boundary.and_then(|b| b.legal_geojson.as_ref())),
            (LayerKind::Illegal, boundary.and_then(|b| b.illegal_geojson.as_ref())),
        ];

        let layers = candidates
            .into_iter()
            .filter_map(|(kind, data)| {
                let data = data.filter(|d| !d.is_empty())?;
                Some(MapLayer {
                    kind,
                    style: kind.style(),
                    visible: true,
                    data: data.clone(),
                })
            })
            .collect();

        MapLayers { layers }
    }

    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    pub fn get(&self, kind: LayerKind) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.kind == kind)
    }

    pub fn visible(&self) -> impl Iterator<Item = &MapLayer> {
        self.layers.iter().filter(|l| l.visible)
    }

    /// Returns false when there is no such layer.
    pub fn set_visible(&mut self, kind: LayerKind, visible: bool) -> bool {
        match self.layers.iter_mut().find(|l| l.kind == kind) {
            Some(layer) => {
                layer.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Flips a layer's visibility, returning the new value.
    pub fn toggle(&mut self, kind: LayerKind) -> Option<bool> {
        let layer = self.layers.iter_mut().find(|l| l.kind == kind)?;
        layer.visible = !layer.visible;
        Some(layer.visible)
    }

    /// `[min_lon, min_lat, max_lon, max_lat]` over the visible layers, used
    /// to fit the map view.
    pub fn bounds(&self) -> Option<[f64; 4]> {
        let mut bounds: Option<[f64; 4]> = None;
        for layer in self.visible() {
            extend_bounds(layer.data.as_value(), &mut bounds);
        }
        bounds
    }
}

// Walks any GeoJSON value, folding every [lon, lat, ..] position into `bounds`.
fn extend_bounds(value: &Value, bounds: &mut Option<[f64; 4]>) {
    match value {
        Value::Array(items) => {
            if let [Value::Number(lon), Value::Number(lat), ..] = items.as_slice() {
                if let (Some(lon), Some(lat)) = (lon.as_f64(), lat.as_f64()) {
                    let b = bounds.get_or_insert([lon, lat, lon, lat]);
                    b[0] = b[0].min(lon);
                    b[1] = b[1].min(lat);
                    b[2] = b[2].max(lon);
                    b[3] = b[3].max(lat);
                }
                return;
            }
            for item in items {
                extend_bounds(item, bounds);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                // Only geometry carrying members, properties may hold arrays of numbers.
                if matches!(key.as_str(), "features" | "geometry" | "geometries" | "coordinates") {
                    extend_bounds(item, bounds);
                }
            }
        }
        _ => {}
    }
}

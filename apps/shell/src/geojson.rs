use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use shell_core::{FeatureFormat, FeatureReader};

const GEOMETRY_TYPES: [&str; 7] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// Reads GeoJSON only; every other format is reported as unavailable so the
/// importer moves on to the next candidate.
#[derive(Debug, Default)]
pub struct GeoJsonReader;

impl FeatureReader for GeoJsonReader {
    fn read_features(&self, format: FeatureFormat, text: &str) -> Result<Vec<Value>> {
        if format != FeatureFormat::GeoJson {
            bail!("no {format} reader available");
        }
        let doc: Value = serde_json::from_str(text).context("not JSON")?;
        features_of(doc)
    }
}

fn features_of(doc: Value) -> Result<Vec<Value>> {
    let kind = doc
        .get("type")
        .and_then(Value::as_str)
        .context("missing GeoJSON type")?
        .to_string();
    match kind.as_str() {
        "FeatureCollection" => match doc.get("features") {
            Some(Value::Array(features)) => Ok(features.clone()),
            _ => bail!("FeatureCollection without a features array"),
        },
        "Feature" => Ok(vec![doc]),
        geometry if GEOMETRY_TYPES.contains(&geometry) => Ok(vec![json!({
            "type": "Feature",
            "geometry": doc,
            "properties": {},
        })]),
        other => bail!("unknown GeoJSON type '{other}'"),
    }
}

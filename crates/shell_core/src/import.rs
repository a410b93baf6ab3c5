use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{error::ShellError, protocol::LayerSpec};
use tracing::{debug, info};

/// Vector formats a dropped file may be read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureFormat {
    GeoJson,
    Gpx,
    Igc,
    Kml,
    TopoJson,
}

impl FeatureFormat {
    pub const ALL: [FeatureFormat; 5] = [
        FeatureFormat::GeoJson,
        FeatureFormat::Gpx,
        FeatureFormat::Igc,
        FeatureFormat::Kml,
        FeatureFormat::TopoJson,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureFormat::GeoJson => "geojson",
            FeatureFormat::Gpx => "gpx",
            FeatureFormat::Igc => "igc",
            FeatureFormat::Kml => "kml",
            FeatureFormat::TopoJson => "topojson",
        }
    }
}

impl fmt::Display for FeatureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses file text in one format into renderer features.
pub trait FeatureReader: Send + Sync {
    fn read_features(&self, format: FeatureFormat, text: &str) -> anyhow::Result<Vec<Value>>;
}

/// Formats to try for `file_name`, most likely first.
pub fn candidate_formats(file_name: &str) -> &'static [FeatureFormat] {
    let ext = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "gpx" => &[FeatureFormat::Gpx],
        "kml" => &[FeatureFormat::Kml],
        "json" => &[FeatureFormat::GeoJson, FeatureFormat::TopoJson],
        _ => &FeatureFormat::ALL,
    }
}

/// Reads `text` with the first candidate format that yields at least one
/// feature and returns the layer to add, titled with the file name.
pub fn import_text(
    reader: &dyn FeatureReader,
    file_name: &str,
    text: &str,
) -> Result<LayerSpec, ShellError> {
    for format in candidate_formats(file_name) {
        match reader.read_features(*format, text) {
            Ok(features) if !features.is_empty() => {
                info!(file = file_name, %format, features = features.len(), "imported layer file");
                return Ok(LayerSpec::titled(file_name).with_payload(json!({
                    "format": format,
                    "features": features,
                })));
            }
            Ok(_) => debug!(file = file_name, %format, "no features"),
            Err(err) => debug!(file = file_name, %format, error = %err, "format rejected"),
        }
    }
    Err(ShellError::UnknownFormat {
        file: file_name.to_string(),
    })
}

#[cfg(test)]
#[path = "tests/import_tests.rs"]
mod tests;

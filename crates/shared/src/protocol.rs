use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{BlendMode, LayerId},
    projection::lonlat_to_web_mercator,
};

pub const DEFAULT_LAYER_TITLE: &str = "no title";

/// What a project's init routine (or a file import) hands to the layer registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_mode: Option<BlendMode>,
    /// Renderer-specific data, forwarded to the view host untouched.
    #[serde(default)]
    pub payload: Value,
}

impl LayerSpec {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = Some(false);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub title: String,
    pub visible: bool,
    pub opacity: f64,
    pub blend_mode: BlendMode,
    pub payload: Value,
}

impl Layer {
    pub fn from_spec(id: LayerId, spec: LayerSpec) -> Self {
        Self {
            id,
            title: spec
                .title
                .unwrap_or_else(|| DEFAULT_LAYER_TITLE.to_string()),
            visible: spec.visible.unwrap_or(true),
            opacity: clamp_opacity(spec.opacity.unwrap_or(1.0)),
            blend_mode: spec.blend_mode.unwrap_or_default(),
            payload: spec.payload,
        }
    }
}

pub fn clamp_opacity(opacity: f64) -> f64 {
    if opacity.is_nan() {
        return 1.0;
    }
    opacity.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub projection: String,
    /// Centre in the view's projection units.
    pub center: [f64; 2],
    pub zoom: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            projection: "EPSG:3857".into(),
            center: lonlat_to_web_mercator(138.7313889, 35.3622222),
            zoom: 5.0,
            max_zoom: Some(18.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LayerEvent {
    Added(Layer),
    Updated(Layer),
    Removed(LayerId),
    /// New registry order, bottom-most first.
    Reordered(Vec<LayerId>),
    Cleared,
}

/// User intents emitted by the layer panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PanelIntent {
    SetVisible { id: LayerId, visible: bool },
    SetOpacity { id: LayerId, opacity: f64 },
    SetBlendMode { id: LayerId, blend_mode: BlendMode },
    ToggleBlendMode { id: LayerId },
    /// Panel list order, top-most first; the registry stores the reverse.
    Reorder { top_first: Vec<LayerId> },
    Remove { id: LayerId },
}

//! Marker definitions
//!
//! `Marker` is the JSON shape served by the marker REST API. Coordinates
//! arrive as strings (`x` is the longitude, `y` the latitude) and are only
//! parsed when the marker is turned into a GeoJSON feature.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::utils::MarkerError;

pub type MarkerId = i32;

pub const DEFAULT_TITLE: &str = "New marker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: MarkerId,
    pub x: String,
    pub y: String,
    pub marker_type: i32,
    pub title: Option<String>,
    pub volume: i32,
    pub audio_status: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Empty,
    Unchecked,
    Checked,
}

impl MarkerKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => MarkerKind::Unchecked,
            2 => MarkerKind::Checked,
            _ => MarkerKind::Empty,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            MarkerKind::Empty => "empty-point",
            MarkerKind::Unchecked => "unchecked-point",
            MarkerKind::Checked => "checked-point",
        }
    }
}

impl Marker {
    pub fn kind(&self) -> MarkerKind {
        MarkerKind::from_code(self.marker_type)
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// Text shown next to the pin: the volume once audio has been measured.
    pub fn label(&self) -> String {
        if self.audio_status == 1 {
            self.volume.to_string()
        } else {
            "?".to_string()
        }
    }

    pub fn longitude(&self) -> Result<f64, MarkerError> {
        parse_coordinate(self.id, &self.x)
    }

    pub fn latitude(&self) -> Result<f64, MarkerError> {
        parse_coordinate(self.id, &self.y)
    }

    pub fn to_feature(&self) -> Result<Value, MarkerError> {
        Ok(json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [self.longitude()?, self.latitude()?],
            },
            "properties": {
                "id": self.id,
                "title": self.title_or_default(),
                "type": self.marker_type,
                "volume": self.volume,
                "audio-status": self.audio_status,
            },
        }))
    }
}

fn parse_coordinate(id: MarkerId, raw: &str) -> Result<f64, MarkerError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MarkerError::InvalidCoordinate {
            id,
            value: raw.to_string(),
        })
}

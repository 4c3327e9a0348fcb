//! # GeoJSON Geometry Wrapper
//!
//! Projects and moratoriums carry their footprint as GeoJSON. This type
//! validates the shape of the value (one of the six geometry types, with
//! a coordinates array) and otherwise treats it as opaque: all metric
//! predicates run in the spatial store on a geography cast, never in
//! process. Coordinates are WGS84 longitude/latitude.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// The GeoJSON geometry types accepted for a footprint.
const GEOMETRY_TYPES: [&str; 6] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
];

/// A validated GeoJSON geometry value.
///
/// Guaranteed to be a JSON object with a recognized `type` member and a
/// `coordinates` array. Nothing more is checked here; coordinate validity
/// is the spatial store's concern (`ST_GeomFromGeoJSON` rejects malformed
/// rings and out-of-range positions on ingest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Geometry(Value);

impl Geometry {
    /// Validate a JSON value as a GeoJSON geometry.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let obj = value.as_object().ok_or_else(|| Error::InvalidInput {
            field: "geometry".to_string(),
            message: "geometry must be a GeoJSON object".to_string(),
        })?;

        let geom_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput {
                field: "geometry".to_string(),
                message: "missing \"type\" member".to_string(),
            })?;

        if !GEOMETRY_TYPES.contains(&geom_type) {
            return Err(Error::InvalidInput {
                field: "geometry".to_string(),
                message: format!(
                    "unsupported geometry type {geom_type:?}; expected one of {GEOMETRY_TYPES:?}"
                ),
            });
        }

        if !obj.get("coordinates").is_some_and(Value::is_array) {
            return Err(Error::InvalidInput {
                field: "geometry".to_string(),
                message: format!("{geom_type} geometry requires a \"coordinates\" array"),
            });
        }

        Ok(Self(value))
    }

    /// Parse a GeoJSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(json).map_err(|e| Error::InvalidInput {
            field: "geometry".to_string(),
            message: format!("invalid JSON: {e}"),
        })?;
        Self::from_value(value)
    }

    /// Build a WGS84 point geometry from longitude/latitude.
    pub fn point(lon: f64, lat: f64) -> Self {
        Self(serde_json::json!({ "type": "Point", "coordinates": [lon, lat] }))
    }

    /// The GeoJSON geometry type name (e.g. `"Polygon"`).
    pub fn geometry_type(&self) -> &str {
        // Validated at construction.
        self.0
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Access the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Serialize to a GeoJSON string for spatial-store ingest.
    pub fn to_json(&self) -> String {
        self.0.to_string()
    }
}

impl TryFrom<Value> for Geometry {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Geometry> for Value {
    fn from(geometry: Geometry) -> Self {
        geometry.0
    }
}

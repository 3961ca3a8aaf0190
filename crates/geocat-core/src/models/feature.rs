use serde::{Deserialize, Serialize};

use super::geometry::Geometry;

/// A single vector feature flowing through the import pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>) -> Self {
        Self { id: None, geometry, properties: serde_json::Map::new() }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }
}

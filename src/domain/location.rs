// Map payload domain types

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

/// A named point rendered as a pin on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub description: String,
}

impl Location {
    pub fn new(lat: f64, lng: f64, name: &str, description: &str) -> Self {
        Self {
            lat,
            lng,
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    /// Validate coordinate ranges and the display name
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::Configuration(format!(
                "Latitude {} of '{}' is out of range",
                self.lat, self.name
            )));
        }

        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Configuration(format!(
                "Longitude {} of '{}' is out of range",
                self.lng, self.name
            )));
        }

        if self.name.trim().is_empty() {
            return Err(AppError::Configuration(
                "Location name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Default pins shown on the map
pub fn default_locations() -> Vec<Location> {
    vec![
        Location::new(41.6011, 24.5742, "Rhodopes (Голям Перелик)", "Where energy is born"),
        Location::new(42.7170, 26.3670, "Karandila", "Where time is controlled"),
        Location::new(39.0000, 33.0000, "Anatolian Plateau", "Time itself, Space"),
    ]
}

/// Body of a successful `GET /api/map`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPayload {
    pub api_key: String,
    pub locations: Vec<Location>,
}

// Static map payload handed out to admitted clients

use crate::config::MapsConfig;
use crate::domain::{Location, MapPayload};
use crate::errors::{AppError, Result};

/// Holds the Maps API key and the pins to render.
///
/// Built once at startup; a missing key is fatal there rather than per request.
#[derive(Clone)]
pub struct ConfigProvider {
    api_key: String,
    locations: Vec<Location>,
}

impl ConfigProvider {
    pub fn new(api_key: String, locations: Vec<Location>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::ConfigurationMissing(
                "Google Maps API Key not configured on server.".to_string(),
            ));
        }

        for location in &locations {
            location.validate()?;
        }

        Ok(Self { api_key, locations })
    }

    pub fn from_config(config: &MapsConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            AppError::ConfigurationMissing("Google Maps API Key not configured on server.".to_string())
        })?;

        Self::new(api_key, config.locations.clone())
    }

    pub fn payload(&self) -> MapPayload {
        MapPayload {
            api_key: self.api_key.clone(),
            locations: self.locations.clone(),
        }
    }
}

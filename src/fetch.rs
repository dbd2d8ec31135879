//! Occupancy feed client

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{config::ApiConfig, errors::RecorderError, models::FacilityRecord};

/// Anything that can produce the current state of all locations
#[async_trait]
pub trait FacilitySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<FacilityRecord>, RecorderError>;
}

/// Fetches the occupancy feed over HTTP
pub struct HttpFacilitySource {
    client: reqwest::Client,
    url: String,
}

impl HttpFacilitySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RecorderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, RecorderError> {
        config.validate()?;
        Self::new(config.url.clone(), config.timeout)
    }
}

#[async_trait]
impl FacilitySource for HttpFacilitySource {
    async fn fetch(&self) -> Result<Vec<FacilityRecord>, RecorderError> {
        debug!("Fetching {}", self.url);
        let resp = self.client.get(&self.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RecorderError::HttpStatus(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        parse_payload(&bytes)
    }
}

/// Parse a feed response body, which must be a JSON array of location states
pub fn parse_payload(bytes: &[u8]) -> Result<Vec<FacilityRecord>, RecorderError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| RecorderError::InvalidPayload(format!("not valid JSON: {}", e)))?;

    if !value.is_array() {
        return Err(RecorderError::InvalidPayload(
            "expected a JSON array of locations".to_string(),
        ));
    }

    Ok(serde_json::from_value(value)?)
}

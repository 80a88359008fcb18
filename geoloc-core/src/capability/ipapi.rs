use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{
    AcquisitionOptions, FixCache, GeoCapability, Position, PositionError, transport_error,
};

const ENDPOINT: &str = "http://ip-api.com/json";

/// IP-based geolocation via ip-api.com. Keyless.
#[derive(Debug, Default)]
pub struct IpApiCapability {
    http: Client,
    cache: FixCache,
}

impl IpApiCapability {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch(&self, options: AcquisitionOptions) -> Result<Position, PositionError> {
        let res = self
            .http
            .get(ENDPOINT)
            .query(&[("fields", "status,message,lat,lon")])
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|err| transport_error(&err))?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PositionError::PermissionDenied);
        }
        if !status.is_success() {
            debug!("ip-api.com request failed with status {status}");
            return Err(PositionError::PositionUnavailable);
        }

        let body = res.text().await.map_err(|err| transport_error(&err))?;
        parse_body(&body)
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

fn parse_body(body: &str) -> Result<Position, PositionError> {
    let parsed: IpApiResponse = serde_json::from_str(body)
        .map_err(|err| PositionError::Other(format!("unexpected ip-api.com payload: {err}")))?;

    if parsed.status != "success" {
        debug!(
            "ip-api.com reported failure: {}",
            parsed.message.as_deref().unwrap_or("no message")
        );
        return Err(PositionError::PositionUnavailable);
    }

    match (parsed.lat, parsed.lon) {
        (Some(latitude), Some(longitude)) => Ok(Position { latitude, longitude }),
        _ => Err(PositionError::PositionUnavailable),
    }
}

#[async_trait]
impl GeoCapability for IpApiCapability {
    async fn current_position(
        &self,
        options: AcquisitionOptions,
    ) -> Result<Position, PositionError> {
        if let Some(position) = self.cache.fresh(options.maximum_age) {
            return Ok(position);
        }

        let position = self.fetch(options).await?;
        self.cache.store(position);
        Ok(position)
    }
}

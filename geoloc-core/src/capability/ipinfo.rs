use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{
    AcquisitionOptions, FixCache, GeoCapability, Position, PositionError, transport_error,
};

const ENDPOINT: &str = "https://ipinfo.io/json";

/// IP-based geolocation via ipinfo.io. Requires an access token.
#[derive(Debug)]
pub struct IpInfoCapability {
    token: String,
    http: Client,
    cache: FixCache,
}

impl IpInfoCapability {
    pub fn new(token: String) -> Self {
        Self { token, http: Client::new(), cache: FixCache::default() }
    }

    async fn fetch(&self, options: AcquisitionOptions) -> Result<Position, PositionError> {
        let res = self
            .http
            .get(ENDPOINT)
            .query(&[("token", self.token.as_str())])
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|err| transport_error(&err))?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PositionError::PermissionDenied);
        }
        if !status.is_success() {
            debug!("ipinfo.io request failed with status {status}");
            return Err(PositionError::PositionUnavailable);
        }

        let body = res.text().await.map_err(|err| transport_error(&err))?;
        parse_body(&body)
    }
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    /// `"lat,lon"` in decimal degrees, absent for bogon addresses.
    #[serde(default)]
    loc: Option<String>,
}

fn parse_body(body: &str) -> Result<Position, PositionError> {
    let parsed: IpInfoResponse = serde_json::from_str(body)
        .map_err(|err| PositionError::Other(format!("unexpected ipinfo.io payload: {err}")))?;

    parsed
        .loc
        .as_deref()
        .and_then(parse_loc)
        .ok_or(PositionError::PositionUnavailable)
}

fn parse_loc(loc: &str) -> Option<Position> {
    let (lat, lon) = loc.split_once(',')?;

    Some(Position {
        latitude: lat.trim().parse().ok()?,
        longitude: lon.trim().parse().ok()?,
    })
}

#[async_trait]
impl GeoCapability for IpInfoCapability {
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

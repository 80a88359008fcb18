use crate::{
    Config,
    capability::{ipapi::IpApiCapability, ipinfo::IpInfoCapability},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{convert::TryFrom, fmt::Debug, sync::Mutex, time::Duration};

pub mod ipapi;
pub mod ipinfo;

/// Options forwarded to the capability on every acquisition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionOptions {
    /// Prefer a faster, lower-power fix when false. Backends may ignore it.
    pub high_accuracy: bool,
    /// Upper bound on a single acquisition attempt.
    pub timeout: Duration,
    /// A cached fix younger than this may be reused instead of a fresh one.
    pub maximum_age: Duration,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: false,
            timeout: Duration::from_millis(15_000),
            maximum_age: Duration::from_millis(300_000),
        }
    }
}

/// A single fix as reported by a capability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// The fixed error vocabulary of the platform capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Other(String),
}

/// A source of the device's current position.
///
/// Implementations are injected into [`crate::LocationService`], which owns
/// classification of their failures into user-facing reasons.
#[async_trait]
pub trait GeoCapability: Send + Sync + Debug {
    /// Presence check. A capability reporting `false` is never asked for a
    /// position.
    fn supported(&self) -> bool {
        true
    }

    async fn current_position(
        &self,
        options: AcquisitionOptions,
    ) -> Result<Position, PositionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityId {
    IpApi,
    IpInfo,
}

impl CapabilityId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityId::IpApi => "ipapi",
            CapabilityId::IpInfo => "ipinfo",
        }
    }

    pub const fn all() -> &'static [CapabilityId] {
        &[CapabilityId::IpApi, CapabilityId::IpInfo]
    }

    /// Whether this backend needs an access token before it can be used.
    pub fn requires_token(&self) -> bool {
        match self {
            CapabilityId::IpApi => false,
            CapabilityId::IpInfo => true,
        }
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CapabilityId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "ipapi" => Ok(CapabilityId::IpApi),
            "ipinfo" => Ok(CapabilityId::IpInfo),
            _ => Err(anyhow::anyhow!(
                "Unknown capability '{value}'. Supported capabilities: ipapi, ipinfo."
            )),
        }
    }
}

/// Construct a capability from config and explicit CapabilityId.
pub fn capability_from_config(
    id: CapabilityId,
    config: &Config,
) -> anyhow::Result<Box<dyn GeoCapability>> {
    let boxed: Box<dyn GeoCapability> = match id {
        CapabilityId::IpApi => Box::new(IpApiCapability::new()),
        CapabilityId::IpInfo => {
            let token = config.capability_token(id).ok_or_else(|| {
                anyhow::anyhow!(
                    "No access token configured for capability '{id}'.\n\
                     Hint: run `geoloc configure {id}` and enter your token."
                )
            })?;
            Box::new(IpInfoCapability::new(token.to_owned()))
        }
    };

    Ok(boxed)
}

/// Construct the default capability from config, using `default_capability`.
pub fn default_capability_from_config(config: &Config) -> anyhow::Result<Box<dyn GeoCapability>> {
    let id = config.default_capability_id()?;
    capability_from_config(id, config)
}

/// Last successful fix, reused while younger than the caller's `maximum_age`.
#[derive(Debug, Default)]
pub(crate) struct FixCache(Mutex<Option<(Position, DateTime<Utc>)>>);

impl FixCache {
    pub(crate) fn fresh(&self, maximum_age: Duration) -> Option<Position> {
        let guard = self.0.lock().ok()?;
        let (position, obtained_at) = (*guard)?;
        let age = Utc::now().signed_duration_since(obtained_at).to_std().ok()?;
        (age < maximum_age).then_some(position)
    }

    pub(crate) fn store(&self, position: Position) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = Some((position, Utc::now()));
        }
    }
}

/// Map a transport-level failure onto the platform vocabulary.
pub(crate) fn transport_error(err: &reqwest::Error) -> PositionError {
    if err.is_timeout() {
        PositionError::Timeout
    } else {
        PositionError::PositionUnavailable
    }
}

//! Core library for the `geoloc` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over platform geolocation capabilities
//! - The location acquisition service and its lifecycle state
//!
//! It is used by `geoloc-cli`, but can also be reused by other binaries or services.

pub mod capability;
pub mod config;
pub mod model;
pub mod service;

pub use capability::{AcquisitionOptions, CapabilityId, GeoCapability, Position, PositionError};
pub use config::{CapabilityConfig, Config};
pub use model::{AcquisitionState, Coordinates, ErrorReason};
pub use service::LocationService;

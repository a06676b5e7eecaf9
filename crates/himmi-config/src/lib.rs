#![allow(clippy::must_use_candidate)]

//! Configuration for the Himmi playground
//!
//! Loaded from a TOML file with `{{ env.VAR }}` placeholder expansion

pub mod control_plane;
mod env;
pub mod gateway;
mod loader;
pub mod playground;
pub mod telemetry;

use serde::Deserialize;

pub use control_plane::*;
pub use gateway::*;
pub use playground::*;
pub use telemetry::{ExportProtocol, ExporterConfig, LogFormat, TelemetryConfig, TracingConfig};

/// Top-level playground configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Inference gateway connection
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Control plane hosting the catalog, identity, and analytics endpoints
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
    /// Session defaults
    #[serde(default)]
    pub playground: PlaygroundConfig,
    /// Logging and OTLP export
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

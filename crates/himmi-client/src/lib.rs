#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Typed HTTP clients for the Himmi inference gateway and control plane
//!
//! The gateway may answer a completion request with either an event stream
//! or a single JSON document; [`decoder`] turns both into one sequence of
//! [`ProtocolEvent`]s.

mod control;
pub mod decoder;
pub mod error;
mod gateway;
mod http;
pub mod types;

pub use control::ControlPlaneClient;
pub use decoder::{BodyKind, EventStream, ProtocolEvent, TransportDecoder};
pub use error::{ClientError, Result};
pub use gateway::{GatewayClient, Timeouts};
pub use types::*;

//! Error types for the intersection manager.

use thiserror::Error;

use crate::{Millis, VehicleId};

/// Errors that can occur while running the intersection manager.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or file I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A datagram could not be decoded into a known message.
    #[error("unknown message: {0}")]
    Decode(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A crossing request carried times the server cannot schedule.
    #[error("vehicle {vehicle} sent out-of-range times: ETA {eta}, ETC {etc}")]
    Timing {
        vehicle: VehicleId,
        eta: Millis,
        etc: Millis,
    },

    /// A message could not be delivered to a vehicle.
    #[error("failed to deliver {kind} to {to}")]
    Send {
        /// The intended recipient.
        to: VehicleId,
        /// The kind of message.
        kind: &'static str,
    },
}

impl Error {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}

/// Result alias using the crate [Error].
pub type Result<T, E = Error> = std::result::Result<T, E>;

//! An intersection manager for autonomous vehicles.
//!
//! Vehicles approaching the intersection send crossing requests over UDP;
//! the manager answers them under one of three admission policies:
//! a sequential reservation queue, a parallel policy admitting vehicles
//! whose paths do not cross, and a rotating traffic light.

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use grant::{Grant, GrantedList, LeasePolicy};
pub use layout::{IntersectionLayout, LayoutConfig, Road, RoadAttributes, RoadConfig};
pub use light::{RotationTiming, TrafficLightController};
pub use message::Message;
pub use parallel::ParallelController;
pub use policy::{AdmissionPolicy, Decision, DenyReason, PolicyKind};
pub use queue::VehicleQueue;
pub use sequential::{AdmissionOutcome, RequestOutcome, SequentialController, ALWAYS_AVAILABLE};
pub use server::{build_policy, Server, ServerHandle};
use slotmap::new_key_type;
pub use transport::{MemoryTransport, Transport, UdpTransport, MAX_DATAGRAM};
pub use util::Interval;
pub use vehicle::{LaneSpec, Vehicle, VehicleId, MAX_TIME_MS};

mod clock;
pub mod config;
mod error;
mod grant;
mod layout;
mod light;
mod message;
mod parallel;
mod policy;
mod queue;
pub mod sequential;
mod server;
mod transport;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Road].
    pub struct RoadId;
}

/// A point in time or a duration, in milliseconds.
pub type Millis = i64;

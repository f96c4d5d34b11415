use std::sync::Arc;
use std::thread::JoinHandle;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{Message, Result, VehicleId};

/// The admission policy the server runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// One vehicle at a time, reserved in ETA order.
    #[default]
    Sequential,
    /// Any number of vehicles whose paths do not cross.
    Parallel,
    /// Roads take turns on a fixed timer.
    #[serde(alias = "trafficlight")]
    #[value(alias = "trafficlight")]
    TrafficLight,
}

/// An intersection admission policy.
pub trait AdmissionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handles one message from a vehicle.
    fn handle(&self, msg: Message);

    /// Starts the policy's background threads.
    fn spawn_workers(self: Arc<Self>) -> Result<Vec<JoinHandle<()>>>;

    /// Asks the background threads to finish.
    fn shutdown(&self);
}

/// The answer to an immediate-decision access request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The vehicle may cross now.
    Granted,
    /// The vehicle already held a grant, which was sent again.
    Regranted,
    /// The vehicle must ask again later.
    Denied(DenyReason),
}

/// Why a request was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// The light is about to change.
    Transition,
    /// The vehicle's road does not have the green light.
    WrongRoad,
    /// The vehicle's entry point is not on any road.
    UnknownRoad,
    /// The vehicle's path crosses that of a vehicle in the intersection.
    Conflict(VehicleId),
}

impl Decision {
    /// Whether a grant was sent.
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted | Decision::Regranted)
    }
}

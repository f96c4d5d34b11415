use serde::{Deserialize, Serialize};

use crate::{LaneSpec, Millis, Result, VehicleId};

/// The messages exchanged between vehicles and the intersection manager.
///
/// On the wire every message is a JSON object tagged by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Vehicle asks to reserve a crossing slot.
    RequestAccess {
        vehicle: VehicleId,
        lane: LaneSpec,
        /// Estimated time of arrival, ms since the Unix epoch.
        eta: Millis,
        /// Estimated time of clearance, ms since the Unix epoch.
        etc: Millis,
    },
    /// The vehicle may enter the intersection at `eta`.
    ReservationTime { vehicle: VehicleId, eta: Millis },
    /// The vehicle may enter the intersection now.
    GrantAccess { vehicle: VehicleId },
    /// Vehicle has left the intersection.
    Exiting { vehicle: VehicleId },
    /// Vehicle received its [Message::ReservationTime].
    ReservationTimeAcknowledged { vehicle: VehicleId },
}

impl Message {
    /// The vehicle that sent or will receive the message.
    pub fn vehicle(&self) -> VehicleId {
        match self {
            Message::RequestAccess { vehicle, .. }
            | Message::ReservationTime { vehicle, .. }
            | Message::GrantAccess { vehicle }
            | Message::Exiting { vehicle }
            | Message::ReservationTimeAcknowledged { vehicle } => *vehicle,
        }
    }

    /// A short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::RequestAccess { .. } => "RequestAccess",
            Message::ReservationTime { .. } => "ReservationTime",
            Message::GrantAccess { .. } => "GrantAccess",
            Message::Exiting { .. } => "Exiting",
            Message::ReservationTimeAcknowledged { .. } => "ReservationTimeAcknowledged",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

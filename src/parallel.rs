use std::sync::Arc;
use std::thread::JoinHandle;

use itertools::Itertools;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::policy::{AdmissionPolicy, Decision, DenyReason};
use crate::{
    Clock, GrantedList, IntersectionLayout, LeasePolicy, Message, Result, Transport, Vehicle,
    VehicleId,
};

/// A controller that lets several vehicles cross at once
/// as long as none of their paths cross.
pub struct ParallelController {
    layout: IntersectionLayout,
    /// The vehicles in the intersection.
    inside: Mutex<GrantedList>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl ParallelController {
    pub fn new(
        layout: IntersectionLayout,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        lease: LeasePolicy,
    ) -> Self {
        Self {
            layout,
            inside: Mutex::new(GrantedList::new(lease)),
            transport,
            clock,
        }
    }

    /// The vehicles currently granted access.
    pub fn inside(&self) -> Vec<VehicleId> {
        self.inside.lock().iter().map(|g| g.vehicle().id()).collect()
    }

    /// Handles a crossing request, granting it immediately or not at all.
    pub fn request_access(&self, vehicle: Vehicle) -> Decision {
        let id = vehicle.id();
        let now = self.clock.now_ms();
        let decision = {
            let mut inside = self.inside.lock();
            for grant in inside.expire(now) {
                warn!(
                    "Vehicle {} never reported leaving; releasing its grant",
                    grant.vehicle().id()
                );
            }
            let conflict = inside
                .iter()
                .find(|g| self.layout.paths_cross(vehicle.lane(), g.vehicle().lane()))
                .map(|g| g.vehicle().id());
            if inside.contains(id) {
                Decision::Regranted
            } else if let Some(other) = conflict {
                Decision::Denied(DenyReason::Conflict(other))
            } else {
                inside.insert(vehicle, now);
                Decision::Granted
            }
        };

        match decision {
            Decision::Granted | Decision::Regranted => {
                info!("Granting vehicle {id} access to the intersection at {now}");
                if let Err(e) = self.transport.send(id, &Message::GrantAccess { vehicle: id }) {
                    warn!("Failed to send GrantAccess to vehicle {id}: {e}");
                }
            }
            Decision::Denied(reason) => {
                let inside = self.inside().into_iter().join(", ");
                info!("Denying vehicle {id} ({reason:?}); in the intersection: {inside}");
            }
        }
        decision
    }

    /// Handles a vehicle leaving the intersection.
    /// Returns `false` if the vehicle was not in it.
    pub fn exiting(&self, id: VehicleId) -> bool {
        let now = self.clock.now_ms();
        match self.inside.lock().remove(id) {
            Some(grant) => {
                info!(
                    "Vehicle {id} exited the intersection after {} ms",
                    now - grant.granted_at()
                );
                true
            }
            None => {
                debug!("Ignoring unexpected exit of vehicle {id}");
                false
            }
        }
    }
}

impl AdmissionPolicy for ParallelController {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn handle(&self, msg: Message) {
        match msg {
            Message::RequestAccess {
                vehicle,
                lane,
                eta,
                etc,
            } => match Vehicle::from_request(vehicle, lane, eta, etc) {
                Ok(vehicle) => {
                    self.request_access(vehicle);
                }
                Err(e) => warn!("Discarding request: {e}"),
            },
            Message::Exiting { vehicle } => {
                self.exiting(vehicle);
            }
            other => warn!("Ignoring unexpected {} from {}", other.kind(), other.vehicle()),
        }
    }

    fn spawn_workers(self: Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        Ok(vec![])
    }

    fn shutdown(&self) {}
}

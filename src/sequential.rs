//! First-come reservation policy.
//!
//! Requests wait in a queue ordered by ETA. A worker thread repeatedly takes
//! the head of the queue: if the intersection is free by the vehicle's ETA it
//! is granted that slot, otherwise its crossing is pushed back to when the
//! intersection frees up and it is queued again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::policy::AdmissionPolicy;
use crate::{
    Clock, GrantedList, LeasePolicy, Message, Millis, Result, Transport, Vehicle, VehicleId,
    VehicleQueue,
};

/// The cursor value meaning the intersection has never been reserved.
pub const ALWAYS_AVAILABLE: Millis = -1;

/// How long the admission worker sleeps when there is nothing to do,
/// unless woken by a new request.
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(50);

/// The sequential reservation controller.
pub struct SequentialController {
    /// The queue, the grants and the cursor share one lock.
    state: Mutex<State>,
    /// Signalled when a request is queued or on shutdown.
    wake: Condvar,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    idle_poll: Duration,
    stopped: AtomicBool,
}

struct State {
    /// Requests waiting for a reservation.
    queue: VehicleQueue,
    /// Vehicles holding a reservation.
    granted: GrantedList,
    /// The earliest time the intersection is free for the next vehicle.
    next_available: Millis,
}

/// The result of one admission step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Nothing is queued.
    Idle,
    /// The vehicle was reserved the slot starting at `eta`.
    Granted {
        vehicle: VehicleId,
        eta: Millis,
        etc: Millis,
    },
    /// The vehicle was pushed back to the given slot and queued again.
    Delayed {
        vehicle: VehicleId,
        eta: Millis,
        etc: Millis,
    },
    /// The vehicle already held a reservation; the queued request was dropped.
    Duplicate { vehicle: VehicleId },
}

/// What happened to a crossing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request joined the queue.
    Enqueued,
    /// The vehicle already has a request in the queue.
    AlreadyQueued,
    /// The vehicle holds an acknowledged reservation.
    AlreadyGranted,
    /// The vehicle holds an unacknowledged reservation, which was sent again.
    Resent,
}

impl SequentialController {
    /// Creates a controller with an empty queue and a free intersection.
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, lease: LeasePolicy) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VehicleQueue::new(),
                granted: GrantedList::new(lease),
                next_available: ALWAYS_AVAILABLE,
            }),
            wake: Condvar::new(),
            transport,
            clock,
            idle_poll: DEFAULT_IDLE_POLL,
            stopped: AtomicBool::new(false),
        }
    }

    /// Sets how long the worker sleeps between idle checks.
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// The earliest time the intersection is free for the next vehicle.
    pub fn next_available(&self) -> Millis {
        self.state.lock().next_available
    }

    /// The queued requests in admission order.
    pub fn queued(&self) -> Vec<Vehicle> {
        self.state.lock().queue.ordered().into_iter().cloned().collect()
    }

    /// The vehicles holding a reservation.
    pub fn granted(&self) -> Vec<Vehicle> {
        let state = self.state.lock();
        state.granted.iter().map(|g| g.vehicle().clone()).collect()
    }

    /// Whether the vehicle holds a reservation.
    pub fn is_granted(&self, id: VehicleId) -> bool {
        self.state.lock().granted.contains(id)
    }

    /// Handles a crossing request.
    ///
    /// Vehicles already queued or granted are not queued again, but a
    /// granted vehicle that has not acknowledged gets its reservation resent.
    pub fn request_access(&self, vehicle: Vehicle) -> RequestOutcome {
        let id = vehicle.id();
        let now = self.clock.now_ms();
        let (outcome, resend) = {
            let mut state = self.state.lock();
            state.expire_leases(now);
            if let Some(grant) = state.granted.get(id) {
                if grant.vehicle().is_acknowledged() {
                    (RequestOutcome::AlreadyGranted, None)
                } else {
                    let eta = grant.vehicle().eta();
                    let msg = Message::ReservationTime { vehicle: id, eta };
                    (RequestOutcome::Resent, Some(msg))
                }
            } else if state.queue.contains(id) {
                (RequestOutcome::AlreadyQueued, None)
            } else {
                debug!("Enqueueing {}", vehicle);
                state.queue.enqueue(vehicle);
                debug!("Queue: {}", state.queue.summary());
                self.wake.notify_one();
                (RequestOutcome::Enqueued, None)
            }
        };
        match (&outcome, resend) {
            (_, Some(msg)) => {
                info!("Vehicle {id} asked again before acknowledging; resending reservation");
                self.send(id, &msg);
            }
            (RequestOutcome::AlreadyQueued, _) => debug!("Vehicle {id} is already queued"),
            (RequestOutcome::AlreadyGranted, _) => debug!("Vehicle {id} was already granted access"),
            _ => {}
        }
        outcome
    }

    /// Handles a vehicle leaving the intersection.
    /// Returns `false` if the vehicle held no reservation.
    pub fn exiting(&self, id: VehicleId) -> bool {
        let now = self.clock.now_ms();
        match self.state.lock().granted.remove(id) {
            Some(grant) => {
                info!(
                    "Vehicle {id} exited the intersection {} ms after its reservation",
                    now.saturating_sub(grant.vehicle().eta())
                );
                true
            }
            None => {
                debug!("Ignoring exit of vehicle {id} without a reservation");
                false
            }
        }
    }

    /// Handles a vehicle acknowledging its reservation.
    pub fn acknowledge(&self, id: VehicleId) -> bool {
        let acknowledged = self.state.lock().granted.acknowledge(id);
        if !acknowledged {
            debug!("Ignoring acknowledgement from vehicle {id} without a reservation");
        }
        acknowledged
    }

    /// Runs one admission step on the head of the queue.
    pub fn step(&self) -> AdmissionOutcome {
        let now = self.clock.now_ms();
        let outcome = {
            let mut state = self.state.lock();
            state.expire_leases(now);
            state.admit_head(now)
        };
        match outcome {
            AdmissionOutcome::Granted { vehicle, eta, etc } => {
                info!("Granting vehicle {vehicle} the intersection from {eta} to {etc}");
                self.send(vehicle, &Message::ReservationTime { vehicle, eta });
            }
            AdmissionOutcome::Delayed { vehicle, eta, etc } => {
                info!("Delaying vehicle {vehicle} to cross from {eta} to {etc}");
            }
            AdmissionOutcome::Duplicate { vehicle } => {
                warn!("Dropping queued request of vehicle {vehicle}: already reserved");
            }
            AdmissionOutcome::Idle => {}
        }
        outcome
    }

    /// Admits vehicles until [Self::stop] is called.
    pub fn run(&self) {
        info!("Sequential admission loop started");
        while !self.stopped.load(Ordering::Acquire) {
            if self.step() == AdmissionOutcome::Idle {
                let mut state = self.state.lock();
                if state.queue.is_empty() && !self.stopped.load(Ordering::Acquire) {
                    self.wake.wait_for(&mut state, self.idle_poll);
                }
            }
        }
        info!("Sequential admission loop stopped");
    }

    /// Stops the admission loop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // Taking the lock orders the store before the waiter's re-check.
        let _state = self.state.lock();
        self.wake.notify_all();
    }

    fn send(&self, to: VehicleId, msg: &Message) {
        if let Err(e) = self.transport.send(to, msg) {
            warn!("Failed to send {} to vehicle {to}: {e}", msg.kind());
        }
    }
}

impl State {
    fn admit_head(&mut self, now: Millis) -> AdmissionOutcome {
        let Some(mut vehicle) = self.queue.dequeue() else {
            return AdmissionOutcome::Idle;
        };
        let id = vehicle.id();
        if self.granted.contains(id) {
            return AdmissionOutcome::Duplicate { vehicle: id };
        }
        if self.next_available <= vehicle.eta() {
            let (eta, etc) = (vehicle.eta(), vehicle.etc());
            let inserted = self.granted.insert(vehicle, now);
            debug_assert!(inserted, "vehicle {id} granted twice");
            self.next_available = etc;
            AdmissionOutcome::Granted {
                vehicle: id,
                eta,
                etc,
            }
        } else {
            vehicle.delay_until(self.next_available);
            let (eta, etc) = (vehicle.eta(), vehicle.etc());
            self.queue.enqueue(vehicle);
            AdmissionOutcome::Delayed {
                vehicle: id,
                eta,
                etc,
            }
        }
    }

    fn expire_leases(&mut self, now: Millis) {
        for grant in self.granted.expire(now) {
            warn!(
                "Reservation of vehicle {} lapsed at {} without an exit notification",
                grant.vehicle().id(),
                grant.expires_at()
            );
        }
    }
}

impl AdmissionPolicy for SequentialController {
    fn name(&self) -> &'static str {
        "sequential"
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
            Message::ReservationTimeAcknowledged { vehicle } => {
                self.acknowledge(vehicle);
            }
            other => warn!("Ignoring unexpected {} from {}", other.kind(), other.vehicle()),
        }
    }

    fn spawn_workers(self: Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        let worker = thread::Builder::new()
            .name("admission".into())
            .spawn(move || self.run())?;
        Ok(vec![worker])
    }

    fn shutdown(&self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::{AdmissionOutcome, State, ALWAYS_AVAILABLE};
    use crate::{GrantedList, LaneSpec, LeasePolicy, Vehicle, VehicleId, VehicleQueue};

    fn vehicle(port: u16, eta: i64, etc: i64) -> Vehicle {
        let id = VehicleId::new(([127, 0, 0, 1], port).into());
        Vehicle::new(id, LaneSpec::new("north_in", "south_out"), eta, etc)
    }

    #[test]
    fn queued_request_of_granted_vehicle_is_dropped() {
        let mut state = State {
            queue: VehicleQueue::new(),
            granted: GrantedList::new(LeasePolicy::default()),
            next_available: ALWAYS_AVAILABLE,
        };
        state.granted.insert(vehicle(1, 1000, 1005), 0);
        state.queue.enqueue(vehicle(1, 2000, 2005));

        assert_eq!(
            state.admit_head(0),
            AdmissionOutcome::Duplicate {
                vehicle: vehicle(1, 0, 0).id()
            }
        );
        assert_eq!(state.next_available, ALWAYS_AVAILABLE);
        assert_eq!(state.granted.len(), 1);
        assert!(state.queue.is_empty());
        assert_eq!(state.admit_head(0), AdmissionOutcome::Idle);
    }
}

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::policy::{AdmissionPolicy, Decision, DenyReason};
use crate::{
    Clock, Error, IntersectionLayout, LaneSpec, Message, Millis, Result, RoadId, Transport,
    VehicleId,
};

/// The timing of a traffic light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationTiming {
    /// How long each road keeps the green light, in ms.
    pub interval_ms: Millis,
    /// The "amber" period before each change, in ms, during which no vehicle is admitted.
    pub transition_ms: Millis,
}

/// A controller that gives each road the intersection in turn.
pub struct TrafficLightController {
    layout: IntersectionLayout,
    timing: RotationTiming,
    state: Mutex<LightState>,
    /// Signalled on shutdown.
    tick: Condvar,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    /// The number of rotations so far.
    rotations: AtomicU64,
    stopped: AtomicBool,
}

/// The state of the light.
struct LightState {
    /// Index into the layout's road order of the road with the green light.
    current: usize,
    /// When the green light moves to the next road.
    next_rotation: Millis,
}

impl Default for RotationTiming {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            transition_ms: 10_000,
        }
    }
}

impl RotationTiming {
    /// Checks that the amber period fits inside the rotation interval.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms <= 0 {
            return Err(Error::config("rotation interval must be positive"));
        }
        if self.transition_ms < 0 || self.transition_ms >= self.interval_ms {
            return Err(Error::config(format!(
                "transition period {} ms must lie within the rotation interval {} ms",
                self.transition_ms, self.interval_ms
            )));
        }
        Ok(())
    }
}

impl TrafficLightController {
    /// Creates a controller starting at a random road and a random point of its green phase.
    pub fn new(
        layout: IntersectionLayout,
        timing: RotationTiming,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        timing.validate()?;
        let mut rng = rand::thread_rng();
        let road = rng.gen_range(0..layout.num_roads().max(1));
        let until_switch = rng.gen_range(timing.transition_ms..timing.interval_ms);
        let first_rotation = clock.now_ms() + until_switch;
        Self::with_start(layout, timing, transport, clock, road, first_rotation)
    }

    /// Creates a controller giving the green light to the `road`th road until `first_rotation`.
    pub fn with_start(
        layout: IntersectionLayout,
        timing: RotationTiming,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        road: usize,
        first_rotation: Millis,
    ) -> Result<Self> {
        timing.validate()?;
        if layout.num_roads() == 0 {
            return Err(Error::config("a traffic light needs at least one road"));
        }
        let controller = Self {
            state: Mutex::new(LightState {
                current: road % layout.num_roads(),
                next_rotation: first_rotation,
            }),
            layout,
            timing,
            tick: Condvar::new(),
            transport,
            clock,
            rotations: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        };
        info!(
            "Enabling road {}; next rotation at {first_rotation}",
            controller.road_name(controller.current_road())
        );
        Ok(controller)
    }

    /// The road with the green light.
    pub fn current_road(&self) -> RoadId {
        self.layout.road_ids()[self.state.lock().current]
    }

    /// When the green light moves to the next road.
    pub fn next_rotation(&self) -> Millis {
        self.state.lock().next_rotation
    }

    /// The number of rotations so far.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    pub fn layout(&self) -> &IntersectionLayout {
        &self.layout
    }

    /// Handles a crossing request, granting it immediately or not at all.
    pub fn request_access(&self, id: VehicleId, lane: &LaneSpec) -> Decision {
        let now = self.clock.now_ms();
        let road = self.layout.road_of(lane);
        let decision = {
            let state = self.state.lock();
            if state.next_rotation - now < self.timing.transition_ms {
                Decision::Denied(DenyReason::Transition)
            } else {
                match road {
                    None => Decision::Denied(DenyReason::UnknownRoad),
                    Some(road) if road == self.layout.road_ids()[state.current] => {
                        Decision::Granted
                    }
                    Some(_) => Decision::Denied(DenyReason::WrongRoad),
                }
            }
        };
        match decision {
            Decision::Granted => {
                info!("Granting vehicle {id} access to the intersection at {now}");
                if let Err(e) = self.transport.send(id, &Message::GrantAccess { vehicle: id }) {
                    warn!("Failed to send GrantAccess to vehicle {id}: {e}");
                }
            }
            Decision::Denied(reason) => info!("Denying vehicle {id} on lane {lane}: {reason:?}"),
            Decision::Regranted => {}
        }
        decision
    }

    /// Gives the green light to the next road and schedules the following change.
    pub fn rotate(&self) -> RoadId {
        let mut state = self.state.lock();
        self.rotate_locked(&mut state)
    }

    /// Rotates the light on schedule until [Self::stop] is called.
    pub fn run(&self) {
        info!("Traffic light timer started");
        let mut state = self.state.lock();
        while !self.stopped.load(Ordering::Acquire) {
            let now = self.clock.now_ms();
            if now >= state.next_rotation {
                self.rotate_locked(&mut state);
                continue;
            }
            let wait = Duration::from_millis((state.next_rotation - now) as u64);
            self.tick.wait_for(&mut state, wait);
        }
        info!("Traffic light timer stopped");
    }

    /// Stops the rotation timer.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _state = self.state.lock();
        self.tick.notify_all();
    }

    fn rotate_locked(&self, state: &mut LightState) -> RoadId {
        let now = self.clock.now_ms();
        state.current = (state.current + 1) % self.layout.num_roads();
        state.next_rotation += self.timing.interval_ms;
        if state.next_rotation <= now {
            // Fell a whole interval behind; restart the schedule from now.
            state.next_rotation = now + self.timing.interval_ms;
        }
        self.rotations.fetch_add(1, Ordering::Relaxed);
        let road = self.layout.road_ids()[state.current];
        info!(
            "Rotating intersection: enabling road {}; next rotation at {} (in {} ms)",
            self.road_name(road),
            state.next_rotation,
            state.next_rotation - now
        );
        road
    }

    fn road_name(&self, road: RoadId) -> &str {
        self.layout.road(road).map_or("?", |r| r.name())
    }
}

impl AdmissionPolicy for TrafficLightController {
    fn name(&self) -> &'static str {
        "traffic-light"
    }

    fn handle(&self, msg: Message) {
        match msg {
            Message::RequestAccess { vehicle, lane, .. } => {
                self.request_access(vehicle, &lane);
            }
            Message::Exiting { vehicle } => {
                debug!("Vehicle {vehicle} exited the intersection");
            }
            other => warn!("Ignoring unexpected {} from {}", other.kind(), other.vehicle()),
        }
    }

    fn spawn_workers(self: Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        let timer = thread::Builder::new()
            .name("traffic-light".into())
            .spawn(move || self.run())?;
        Ok(vec![timer])
    }

    fn shutdown(&self) {
        self.stop();
    }
}

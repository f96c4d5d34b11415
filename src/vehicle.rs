use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::util::Interval;
use crate::{Error, Millis, Result};

/// Requests with an ETA or ETC further than this from the Unix epoch are rejected, in ms.
pub const MAX_TIME_MS: Millis = 1 << 50;

/// Identifies a vehicle by the address it listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(SocketAddr);

/// The path a vehicle takes through the intersection.
///
/// The controller treats this as an opaque token; only the
/// [IntersectionLayout](crate::IntersectionLayout) interprets the point names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneSpec {
    /// The entry point the vehicle arrives at.
    pub entry: String,
    /// The exit point the vehicle leaves through.
    pub exit: String,
}

/// A request to cross the intersection.
///
/// Two records are equal iff they belong to the same vehicle;
/// the lane and crossing window are excluded from identity.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    id: VehicleId,
    /// The path through the intersection.
    lane: LaneSpec,
    /// From the estimated time of arrival (ETA) to the
    /// estimated time of clearance (ETC), in ms.
    window: Interval<Millis>,
    /// Whether the request is waiting in the queue.
    enqueued: bool,
    /// Whether the vehicle acknowledged its reservation.
    acknowledged: bool,
    /// Whether the vehicle reported leaving the intersection.
    exited: bool,
}

impl VehicleId {
    /// Creates a vehicle ID from the vehicle's socket address.
    pub const fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// The vehicle's socket address.
    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    /// The vehicle's IP address.
    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    /// The vehicle's port.
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for VehicleId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl LaneSpec {
    /// Creates a lane spec from an entry and an exit point.
    pub fn new(entry: impl Into<String>, exit: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            exit: exit.into(),
        }
    }
}

impl fmt::Display for LaneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.entry, self.exit)
    }
}

impl Vehicle {
    /// Creates a crossing request.
    ///
    /// An `etc` earlier than `eta` is clamped to `eta`,
    /// since crossing cannot take negative time.
    pub fn new(id: VehicleId, lane: LaneSpec, eta: Millis, etc: Millis) -> Self {
        if etc < eta {
            warn!("Vehicle {id} reported ETC {etc} before ETA {eta}; clamping");
        }
        Self {
            id,
            lane,
            window: Interval::new(eta, Millis::max(eta, etc)),
            enqueued: false,
            acknowledged: false,
            exited: false,
        }
    }

    /// Creates a crossing request from times received over the network,
    /// rejecting times outside `±MAX_TIME_MS`.
    pub fn from_request(id: VehicleId, lane: LaneSpec, eta: Millis, etc: Millis) -> Result<Self> {
        let valid = -MAX_TIME_MS..=MAX_TIME_MS;
        if !valid.contains(&eta) || !valid.contains(&etc) {
            return Err(Error::Timing {
                vehicle: id,
                eta,
                etc,
            });
        }
        Ok(Self::new(id, lane, eta, etc))
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's path through the intersection.
    pub fn lane(&self) -> &LaneSpec {
        &self.lane
    }

    /// The estimated time of arrival in ms.
    pub fn eta(&self) -> Millis {
        self.window.min
    }

    /// The estimated time of clearance in ms.
    pub fn etc(&self) -> Millis {
        self.window.max
    }

    /// The time the vehicle occupies the intersection.
    pub fn window(&self) -> Interval<Millis> {
        self.window
    }

    /// How long the vehicle takes to cross, in ms.
    pub fn crossing_duration(&self) -> Millis {
        self.window.max.saturating_sub(self.window.min)
    }

    /// Pushes the crossing back so the vehicle arrives at `start`,
    /// preserving the crossing duration.
    pub(crate) fn delay_until(&mut self, start: Millis) {
        let duration = self.crossing_duration();
        self.window = Interval::new(start, start.saturating_add(duration));
    }

    /// Whether the request is waiting in the queue.
    pub fn is_enqueued(&self) -> bool {
        self.enqueued
    }

    pub(crate) fn set_enqueued(&mut self, enqueued: bool) {
        self.enqueued = enqueued;
    }

    /// Whether the vehicle acknowledged its reservation.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub(crate) fn set_acknowledged(&mut self, acknowledged: bool) {
        self.acknowledged = acknowledged;
    }

    /// Whether the vehicle reported leaving the intersection.
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    pub(crate) fn set_exited(&mut self, exited: bool) {
        self.exited = exited;
    }
}

impl PartialEq for Vehicle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Vehicle {}

impl Hash for Vehicle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ETA {} ETC {}",
            self.id,
            self.lane,
            self.eta(),
            self.etc()
        )
    }
}

#[cfg(test)]
mod test {
    use super::{LaneSpec, Vehicle, VehicleId, MAX_TIME_MS};

    fn id(port: u16) -> VehicleId {
        VehicleId::new(([10, 11, 12, 0], port).into())
    }

    #[test]
    fn identity_ignores_schedule() {
        let a = Vehicle::new(id(8888), LaneSpec::new("north_in", "south_out"), 1000, 1005);
        let b = Vehicle::new(id(8888), LaneSpec::new("east_in", "west_out"), 2000, 2500);
        let c = Vehicle::new(id(8889), LaneSpec::new("north_in", "south_out"), 1000, 1005);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn delay_preserves_duration() {
        let mut v = Vehicle::new(id(1), LaneSpec::new("a", "b"), 1002, 1007);
        v.delay_until(1005);
        assert_eq!((v.eta(), v.etc()), (1005, 1010));
        assert_eq!(v.crossing_duration(), 5);
    }

    #[test]
    fn clearance_never_precedes_arrival() {
        let v = Vehicle::new(id(1), LaneSpec::new("a", "b"), 1000, 900);
        assert_eq!(v.etc(), 1000);
        assert_eq!(v.crossing_duration(), 0);
    }

    #[test]
    fn out_of_range_times_are_rejected() {
        let lane = || LaneSpec::new("a", "b");
        assert!(Vehicle::from_request(id(1), lane(), 0, i64::MAX).is_err());
        assert!(Vehicle::from_request(id(1), lane(), i64::MIN, 1005).is_err());
        assert!(Vehicle::from_request(id(1), lane(), 0, MAX_TIME_MS + 1).is_err());
        let v = Vehicle::from_request(id(1), lane(), 1000, 1005).unwrap();
        assert_eq!((v.eta(), v.etc()), (1000, 1005));
    }

    #[test]
    fn extreme_windows_saturate() {
        let mut v = Vehicle::new(id(1), LaneSpec::new("a", "b"), i64::MIN, i64::MAX);
        assert_eq!(v.crossing_duration(), i64::MAX);
        v.delay_until(1000);
        assert_eq!((v.eta(), v.etc()), (1000, i64::MAX));
    }
}

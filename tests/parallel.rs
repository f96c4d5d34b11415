//! Tests of the parallel policy.

use std::net::SocketAddr;
use std::sync::Arc;

use intersection_manager::{
    AdmissionPolicy, Decision, DenyReason, IntersectionLayout, LaneSpec, LeasePolicy,
    ManualClock, MemoryTransport, Message, ParallelController, Vehicle, VehicleId,
};

fn id(port: u16) -> VehicleId {
    VehicleId::new(SocketAddr::from(([127, 0, 0, 1], port)))
}

fn request(port: u16, entry: &str, exit: &str) -> Vehicle {
    Vehicle::new(id(port), LaneSpec::new(entry, exit), 1000, 1005)
}

fn setup() -> (ParallelController, MemoryTransport, ManualClock) {
    let transport = MemoryTransport::new();
    let clock = ManualClock::new(0);
    let controller = ParallelController::new(
        IntersectionLayout::four_way(),
        Arc::new(transport.clone()),
        Arc::new(clock.clone()),
        LeasePolicy::default(),
    );
    (controller, transport, clock)
}

#[test]
fn compatible_paths_cross_together() {
    let (controller, transport, _clock) = setup();
    assert_eq!(
        controller.request_access(request(1, "north_in", "south_out")),
        Decision::Granted
    );
    assert_eq!(
        controller.request_access(request(2, "south_in", "north_out")),
        Decision::Granted
    );
    assert_eq!(controller.inside(), vec![id(1), id(2)]);
    assert_eq!(
        transport.take(),
        vec![
            (id(1), Message::GrantAccess { vehicle: id(1) }),
            (id(2), Message::GrantAccess { vehicle: id(2) }),
        ]
    );
}

#[test]
fn crossing_paths_are_denied() {
    let (controller, transport, _clock) = setup();
    controller.request_access(request(1, "north_in", "south_out"));
    transport.take();

    assert_eq!(
        controller.request_access(request(2, "east_in", "west_out")),
        Decision::Denied(DenyReason::Conflict(id(1)))
    );
    assert!(transport.sent().is_empty());
    assert_eq!(controller.inside(), vec![id(1)]);
}

#[test]
fn repeated_request_is_granted_again() {
    let (controller, transport, _clock) = setup();
    controller.request_access(request(1, "north_in", "south_out"));
    assert_eq!(
        controller.request_access(request(1, "north_in", "south_out")),
        Decision::Regranted
    );
    assert_eq!(controller.inside().len(), 1);
    assert_eq!(transport.sent().len(), 2);
}

#[test]
fn exit_frees_the_path() {
    let (controller, _transport, _clock) = setup();
    controller.request_access(request(1, "north_in", "south_out"));
    assert!(!controller
        .request_access(request(2, "east_in", "west_out"))
        .is_granted());

    controller.handle(Message::Exiting { vehicle: id(1) });
    assert!(!controller.exiting(id(1)));
    assert_eq!(
        controller.request_access(request(2, "east_in", "west_out")),
        Decision::Granted
    );
}

#[test]
fn lapsed_grants_stop_blocking() {
    let (controller, _transport, clock) = setup();
    controller.request_access(request(1, "north_in", "south_out"));

    clock.set(11_005);
    assert_eq!(
        controller.request_access(request(2, "east_in", "west_out")),
        Decision::Granted
    );
    assert_eq!(controller.inside(), vec![id(2)]);
}

#[test]
fn out_of_range_times_are_discarded() {
    let (controller, transport, _clock) = setup();
    controller.handle(Message::RequestAccess {
        vehicle: id(1),
        lane: LaneSpec::new("north_in", "south_out"),
        eta: i64::MIN,
        etc: i64::MAX,
    });
    controller.handle(Message::RequestAccess {
        vehicle: id(3),
        lane: LaneSpec::new("south_in", "north_out"),
        eta: 0,
        etc: i64::MAX,
    });
    assert!(controller.inside().is_empty());
    assert!(transport.sent().is_empty());

    controller.handle(Message::RequestAccess {
        vehicle: id(2),
        lane: LaneSpec::new("east_in", "west_out"),
        eta: 1000,
        etc: 1005,
    });
    assert_eq!(controller.inside(), vec![id(2)]);
    assert_eq!(
        transport.take(),
        vec![(id(2), Message::GrantAccess { vehicle: id(2) })]
    );
}

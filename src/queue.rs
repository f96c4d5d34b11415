use std::cmp::Ordering;
use std::collections::BinaryHeap;

use itertools::Itertools;

use crate::{Millis, Vehicle, VehicleId};

/// Pending crossing requests, earliest ETA first.
///
/// Entries are snapshots: a vehicle's schedule only changes by removing
/// it and enqueueing it again, so the heap order always matches the keys.
/// Equal ETAs leave in insertion order, although callers must not rely on it.
#[derive(Clone, Debug, Default)]
pub struct VehicleQueue {
    heap: BinaryHeap<Entry>,
    /// The next insertion sequence number.
    seq: u64,
}

#[derive(Clone, Debug)]
struct Entry {
    eta: Millis,
    seq: u64,
    vehicle: Vehicle,
}

impl VehicleQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts a vehicle.
    pub fn enqueue(&mut self, mut vehicle: Vehicle) {
        vehicle.set_enqueued(true);
        self.seq += 1;
        self.heap.push(Entry {
            eta: vehicle.eta(),
            seq: self.seq,
            vehicle,
        });
    }

    /// The vehicle with the earliest ETA.
    pub fn peek(&self) -> Option<&Vehicle> {
        self.heap.peek().map(|entry| &entry.vehicle)
    }

    /// Removes and returns the vehicle with the earliest ETA.
    pub fn dequeue(&mut self) -> Option<Vehicle> {
        self.heap.pop().map(|entry| {
            let mut vehicle = entry.vehicle;
            vehicle.set_enqueued(false);
            vehicle
        })
    }

    /// Removes the given vehicle wherever it sits in the queue.
    pub fn remove(&mut self, id: VehicleId) -> Option<Vehicle> {
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        let removed = entries
            .iter()
            .position(|entry| entry.vehicle.id() == id)
            .map(|idx| entries.swap_remove(idx).vehicle);
        self.heap = BinaryHeap::from(entries);
        removed.map(|mut vehicle| {
            vehicle.set_enqueued(false);
            vehicle
        })
    }

    /// Whether a request from the given vehicle is pending.
    pub fn contains(&self, id: VehicleId) -> bool {
        self.heap.iter().any(|entry| entry.vehicle.id() == id)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// The pending vehicles in admission order.
    pub fn ordered(&self) -> Vec<&Vehicle> {
        self.heap
            .iter()
            .sorted_by(|a, b| b.cmp(a))
            .map(|entry| &entry.vehicle)
            .collect()
    }

    /// A one-line listing of the queue for logs.
    pub fn summary(&self) -> String {
        self.ordered()
            .into_iter()
            .map(|v| format!("{}@{}", v.id(), v.eta()))
            .join(" - ")
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Reversed so the max-heap yields the earliest ETA first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .eta
            .cmp(&self.eta)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod test {
    use super::VehicleQueue;
    use crate::{LaneSpec, Vehicle, VehicleId};

    fn vehicle(host: u8, eta: i64) -> Vehicle {
        let id = VehicleId::new(([10, 11, 12, host], 8888).into());
        Vehicle::new(id, LaneSpec::new("north_in", "south_out"), eta, eta + 5)
    }

    #[test]
    fn pops_in_eta_order() {
        let mut queue = VehicleQueue::new();
        for (host, eta) in [(0, 21), (1, 2), (2, 12), (3, 16), (4, 0)] {
            queue.enqueue(vehicle(host, eta));
        }
        assert_eq!(queue.peek().map(|v| v.eta()), Some(0));
        let etas: Vec<_> = std::iter::from_fn(|| queue.dequeue())
            .map(|v| v.eta())
            .collect();
        assert_eq!(etas, vec![0, 2, 12, 16, 21]);
        assert!(queue.is_empty());
    }

    #[test]
    fn membership_is_by_identity() {
        let mut queue = VehicleQueue::new();
        queue.enqueue(vehicle(1, 100));
        assert!(queue.contains(vehicle(1, 999).id()));
        assert!(!queue.contains(vehicle(2, 100).id()));
        assert!(queue.peek().unwrap().is_enqueued());
    }

    #[test]
    fn remove_keeps_heap_order() {
        let mut queue = VehicleQueue::new();
        for (host, eta) in [(0, 30), (1, 10), (2, 20), (3, 40)] {
            queue.enqueue(vehicle(host, eta));
        }
        let removed = queue.remove(vehicle(1, 0).id());
        assert_eq!(removed.as_ref().map(|v| v.eta()), Some(10));
        assert!(!removed.map_or(true, |v| v.is_enqueued()));
        assert!(queue.remove(vehicle(9, 0).id()).is_none());
        let etas: Vec<_> = queue.ordered().iter().map(|v| v.eta()).collect();
        assert_eq!(etas, vec![20, 30, 40]);
    }

    #[test]
    fn equal_etas_do_not_collide() {
        let mut queue = VehicleQueue::new();
        queue.enqueue(vehicle(1, 50));
        queue.enqueue(vehicle(2, 50));
        assert_eq!(queue.len(), 2);
        assert!(queue.dequeue().is_some());
        assert!(queue.dequeue().is_some());
        assert!(queue.dequeue().is_none());
    }
}

use serde::{Deserialize, Serialize};

use crate::{Millis, Vehicle, VehicleId};

/// How long a grant stays valid without an exit notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeasePolicy {
    /// The lease lasts this many crossing durations past the ETC.
    pub factor: u32,
    /// The lease never lasts less than this past the ETC, in ms.
    pub min_lease_ms: Millis,
}

/// A vehicle that was told it may cross and has not reported leaving yet.
#[derive(Clone, Debug)]
pub struct Grant {
    vehicle: Vehicle,
    /// When the grant was issued.
    granted_at: Millis,
    /// When the grant lapses if the vehicle never exits.
    expires_at: Millis,
}

/// The vehicles currently granted access, at most one entry per vehicle.
#[derive(Clone, Debug, Default)]
pub struct GrantedList {
    grants: Vec<Grant>,
    lease: LeasePolicy,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            factor: 4,
            min_lease_ms: 10_000,
        }
    }
}

impl LeasePolicy {
    /// The time at which a grant issued at `granted_at` lapses.
    pub fn expiry(&self, vehicle: &Vehicle, granted_at: Millis) -> Millis {
        let lease = Millis::max(
            Millis::from(self.factor).saturating_mul(vehicle.crossing_duration()),
            self.min_lease_ms,
        );
        Millis::max(vehicle.etc(), granted_at).saturating_add(lease)
    }
}

impl Grant {
    /// The granted vehicle.
    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    /// When the grant was issued.
    pub fn granted_at(&self) -> Millis {
        self.granted_at
    }

    /// When the grant lapses.
    pub fn expires_at(&self) -> Millis {
        self.expires_at
    }
}

impl GrantedList {
    /// Creates an empty list whose grants follow the given lease policy.
    pub fn new(lease: LeasePolicy) -> Self {
        Self {
            grants: vec![],
            lease,
        }
    }

    /// Records a grant. Returns `false`, leaving the list untouched,
    /// if the vehicle already holds one.
    pub fn insert(&mut self, vehicle: Vehicle, now: Millis) -> bool {
        if self.contains(vehicle.id()) {
            return false;
        }
        let expires_at = self.lease.expiry(&vehicle, now);
        self.grants.push(Grant {
            vehicle,
            granted_at: now,
            expires_at,
        });
        true
    }

    /// Whether the vehicle holds a grant.
    pub fn contains(&self, id: VehicleId) -> bool {
        self.get(id).is_some()
    }

    /// Gets the vehicle's grant.
    pub fn get(&self, id: VehicleId) -> Option<&Grant> {
        self.grants.iter().find(|grant| grant.vehicle.id() == id)
    }

    /// Removes the vehicle's grant, marking the vehicle as exited.
    /// Unknown vehicles are ignored.
    pub fn remove(&mut self, id: VehicleId) -> Option<Grant> {
        let idx = self.grants.iter().position(|grant| grant.vehicle.id() == id)?;
        let mut grant = self.grants.remove(idx);
        grant.vehicle.set_exited(true);
        Some(grant)
    }

    /// Marks the vehicle's reservation as acknowledged.
    /// Returns `false` if the vehicle holds no grant.
    pub fn acknowledge(&mut self, id: VehicleId) -> bool {
        match self.grants.iter_mut().find(|grant| grant.vehicle.id() == id) {
            Some(grant) => {
                grant.vehicle.set_acknowledged(true);
                true
            }
            None => false,
        }
    }

    /// Drops every grant whose lease ran out by `now` and returns them.
    pub fn expire(&mut self, now: Millis) -> Vec<Grant> {
        let (expired, live) = std::mem::take(&mut self.grants)
            .into_iter()
            .partition(|grant| grant.expires_at <= now);
        self.grants = live;
        expired
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter()
    }
}

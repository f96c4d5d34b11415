use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::{Error, LaneSpec, Result, RoadId};

/// The roads meeting at an intersection and where their lanes touch its boundary.
///
/// Boundary points are kept in clockwise order around the intersection.
/// Two paths cross when their chords between entry and exit interleave on that ring.
#[derive(Clone, Debug, Default)]
pub struct IntersectionLayout {
    /// The roads at the intersection.
    roads: SlotMap<RoadId, Road>,
    /// The roads in rotation order.
    order: Vec<RoadId>,
    /// Every entry and exit point, clockwise.
    ring: Vec<String>,
}

/// A road approaching the intersection.
#[derive(Clone, Debug)]
pub struct Road {
    /// The road's name.
    name: String,
    /// Points where vehicles on this road enter the intersection.
    entries: SmallVec<[String; 2]>,
    /// Points where vehicles leave the intersection onto this road.
    exits: SmallVec<[String; 2]>,
}

/// The attributes of a road.
pub struct RoadAttributes<'a> {
    /// The road's name.
    pub name: &'a str,
    /// Entry points, in clockwise order.
    pub entries: &'a [&'a str],
    /// Exit points, in clockwise order.
    pub exits: &'a [&'a str],
}

/// Serialized form of a [IntersectionLayout].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// The roads, clockwise.
    pub roads: Vec<RoadConfig>,
}

/// Serialized form of a [Road].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadConfig {
    pub name: String,
    pub entries: Vec<String>,
    pub exits: Vec<String>,
}

impl IntersectionLayout {
    /// Creates a layout with no roads.
    pub fn new() -> Self {
        Default::default()
    }

    /// A four-way intersection with one lane each way on every road,
    /// for right-hand traffic.
    pub fn four_way() -> Self {
        let mut layout = Self::new();
        for name in ["north", "east", "south", "west"] {
            let entry = format!("{name}_in");
            let exit = format!("{name}_out");
            layout.add_road(&RoadAttributes {
                name,
                entries: &[entry.as_str()],
                exits: &[exit.as_str()],
            });
        }
        layout
    }

    /// Builds a layout from its serialized form, rejecting empty layouts
    /// and point names used twice.
    pub fn from_config(config: &LayoutConfig) -> Result<Self> {
        if config.roads.is_empty() {
            return Err(Error::config("intersection layout has no roads"));
        }
        let mut seen = HashSet::new();
        let points = config
            .roads
            .iter()
            .flat_map(|road| road.entries.iter().chain(&road.exits));
        for point in points {
            if !seen.insert(point.as_str()) {
                return Err(Error::config(format!(
                    "boundary point {point:?} is used more than once"
                )));
            }
        }

        let mut layout = Self::new();
        for road in &config.roads {
            let entries = road.entries.iter().map(String::as_str).collect_vec();
            let exits = road.exits.iter().map(String::as_str).collect_vec();
            layout.add_road(&RoadAttributes {
                name: &road.name,
                entries: &entries,
                exits: &exits,
            });
        }
        Ok(layout)
    }

    /// Adds the next road, clockwise from the previous one.
    pub fn add_road(&mut self, attributes: &RoadAttributes) -> RoadId {
        let road = Road {
            name: attributes.name.to_owned(),
            entries: attributes.entries.iter().map(|p| p.to_string()).collect(),
            exits: attributes.exits.iter().map(|p| p.to_string()).collect(),
        };
        self.ring.extend(road.entries.iter().cloned());
        self.ring.extend(road.exits.iter().cloned());
        let id = self.roads.insert(road);
        self.order.push(id);
        id
    }

    /// The number of roads.
    pub fn num_roads(&self) -> usize {
        self.order.len()
    }

    /// The roads in rotation order.
    pub fn road_ids(&self) -> &[RoadId] {
        &self.order
    }

    /// Gets a road.
    pub fn road(&self, id: RoadId) -> Option<&Road> {
        self.roads.get(id)
    }

    /// The road a vehicle on the given lane arrives from.
    pub fn road_of(&self, lane: &LaneSpec) -> Option<RoadId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.roads[*id].entries.iter().any(|e| *e == lane.entry))
    }

    /// Whether two paths through the intersection may collide.
    ///
    /// Paths sharing an entry or exit point always conflict, as do
    /// paths through points the layout does not know.
    pub fn paths_cross(&self, a: &LaneSpec, b: &LaneSpec) -> bool {
        if a.entry == b.entry || a.exit == b.exit {
            return true;
        }
        let chord = |lane: &LaneSpec| {
            let from = self.position(&lane.entry)?;
            let to = self.position(&lane.exit)?;
            Some((usize::min(from, to), usize::max(from, to)))
        };
        match (chord(a), chord(b)) {
            (Some((lo, hi)), Some((b0, b1))) => {
                let inside = |p: usize| lo < p && p < hi;
                inside(b0) != inside(b1)
            }
            _ => true,
        }
    }

    fn position(&self, point: &str) -> Option<usize> {
        self.ring.iter().position(|p| p == point)
    }
}

impl Road {
    /// The road's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Points where vehicles enter the intersection from this road.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Points where vehicles leave the intersection onto this road.
    pub fn exits(&self) -> &[String] {
        &self.exits
    }
}

use crate::error::{KernelError, KernelResult};
use crate::simulation_engine::lanes::{LaneId, Road};
use std::collections::BTreeMap;

/// Static lane-to-lane routing: each source lane has exactly one exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: BTreeMap<LaneId, LaneId>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::reference()
    }
}

impl RouteTable {
    /// The junction's standard exits: straight lanes cross to the next road
    /// over, turn lanes swing across to the opposite side.
    pub fn reference() -> Self {
        use Road::*;
        let routes = [
            (LaneId::priority(A), LaneId::entry(B)),
            (LaneId::turn(A), LaneId::entry(C)),
            (LaneId::priority(B), LaneId::entry(A)),
            (LaneId::turn(B), LaneId::entry(D)),
            (LaneId::priority(C), LaneId::entry(D)),
            (LaneId::turn(C), LaneId::entry(A)),
            (LaneId::priority(D), LaneId::entry(B)),
            (LaneId::turn(D), LaneId::entry(C)),
        ];
        Self {
            routes: routes.into_iter().collect(),
        }
    }

    /// Builds a table, checking that every source lane has exactly one exit
    /// and that no entry lane is used as a source.
    ///
    /// Same-road routes are accepted here; the scheduler rejects them at move
    /// time.
    pub fn new(routes: impl IntoIterator<Item = (LaneId, LaneId)>) -> KernelResult<Self> {
        let mut table = BTreeMap::new();
        for (source, destination) in routes {
            if !source.kind.is_source() {
                return Err(KernelError::Configuration(format!(
                    "entry lane {} cannot be a route source",
                    source
                )));
            }
            if table.insert(source, destination).is_some() {
                return Err(KernelError::Configuration(format!(
                    "lane {} is mapped more than once",
                    source
                )));
            }
        }
        let missing: Vec<String> = LaneId::sources()
            .filter(|lane| !table.contains_key(lane))
            .map(|lane| lane.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(KernelError::Configuration(format!(
                "no destination mapped for {}",
                missing.join(", ")
            )));
        }
        Ok(Self { routes: table })
    }

    pub fn destination(&self, source: LaneId) -> Option<LaneId> {
        self.routes.get(&source).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LaneId, LaneId)> + '_ {
        self.routes.iter().map(|(&source, &destination)| (source, destination))
    }

    /// Routes that would send a vehicle back onto its own road.
    pub fn same_road_routes(&self) -> Vec<(LaneId, LaneId)> {
        self.iter()
            .filter(|(source, destination)| source.road == destination.road)
            .collect()
    }
}

use crate::simulation_engine::lanes::LaneId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque vehicle identifier, e.g. `car_AL2_7`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A vehicle waiting in a lane.
///
/// Vehicles carry no destination: where they go is decided by the route
/// table of the lane they are dequeued from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    /// Generator round that produced this vehicle.
    pub seq: u64,
    /// Lane the vehicle was generated into.
    pub origin: LaneId,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, seq: u64, origin: LaneId) -> Self {
        Self {
            id: VehicleId::new(id),
            seq,
            origin,
        }
    }

    /// A generator-made vehicle, named `car_<LANE>_<round>`.
    pub fn generated(origin: LaneId, round: u64) -> Self {
        Self::new(format!("car_{}_{}", origin, round), round, origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::lanes::Road;

    #[test]
    fn generated_ids_embed_lane_and_round() {
        let vehicle = Vehicle::generated(LaneId::priority(Road::A), 7);
        assert_eq!(vehicle.id.as_str(), "car_AL2_7");
        assert_eq!(vehicle.seq, 7);
        assert_eq!(vehicle.origin, LaneId::priority(Road::A));
    }
}

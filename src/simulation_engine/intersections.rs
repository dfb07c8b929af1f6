use crate::simulation_engine::lanes::Road;
use crate::simulation_engine::vehicles::VehicleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four contention zones of the intersection box, named after the
/// road a crossing vehicle leaves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Side(pub Road);

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
struct SideState {
    occupant: Option<VehicleId>,
    /// Ticks left before the occupant has cleared the side.
    remaining: u32,
}

/// Single-occupancy locks for the four sides of the intersection.
#[derive(Debug, Clone, Default)]
pub struct IntersectionSides {
    sides: [SideState; 4],
}

impl IntersectionSides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `side` for `vehicle` for `hold_ticks` ticks. Returns false if the
    /// side is already held.
    pub fn try_enter(&mut self, side: Side, vehicle: &VehicleId, hold_ticks: u32) -> bool {
        let state = &mut self.sides[side.0.index()];
        if state.occupant.is_some() {
            return false;
        }
        state.occupant = Some(vehicle.clone());
        state.remaining = hold_ticks.max(1);
        true
    }

    /// Releases `side`, returning whoever held it.
    pub fn leave(&mut self, side: Side) -> Option<VehicleId> {
        let state = &mut self.sides[side.0.index()];
        state.remaining = 0;
        state.occupant.take()
    }

    /// Counts down one tick on every held side and releases the ones that
    /// have cleared.
    pub fn advance(&mut self) -> Vec<(Side, VehicleId)> {
        let mut released = Vec::new();
        for road in Road::ALL {
            let state = &mut self.sides[road.index()];
            if state.occupant.is_none() {
                continue;
            }
            state.remaining = state.remaining.saturating_sub(1);
            if state.remaining == 0 {
                if let Some(vehicle) = state.occupant.take() {
                    released.push((Side(road), vehicle));
                }
            }
        }
        released
    }

    pub fn is_busy(&self, side: Side) -> bool {
        self.sides[side.0.index()].occupant.is_some()
    }

    pub fn occupant(&self, side: Side) -> Option<&VehicleId> {
        self.sides[side.0.index()].occupant.as_ref()
    }

    pub fn occupied_count(&self) -> usize {
        self.sides.iter().filter(|s| s.occupant.is_some()).count()
    }
}

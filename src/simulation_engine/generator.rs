use crate::global_variables::{HIGH_PRIORITY_RANK, NORMAL_PRIORITY_RANK};
use crate::simulation_engine::lane_store::LaneStore;
use crate::simulation_engine::lanes::{LaneId, Road};
use crate::simulation_engine::vehicles::Vehicle;
use log::{debug, info};

/// Rank pair used for priority lanes: congested lanes get `high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityRanks {
    pub high: i32,
    pub normal: i32,
}

impl Default for PriorityRanks {
    fn default() -> Self {
        Self {
            high: HIGH_PRIORITY_RANK,
            normal: NORMAL_PRIORITY_RANK,
        }
    }
}

impl PriorityRanks {
    /// Rank for a lane given whether it is over the backlog threshold.
    pub fn for_backlog(&self, congested: bool) -> i32 {
        if congested {
            self.high
        } else {
            self.normal
        }
    }
}

/// Injects one vehicle into every turn and priority lane per round.
#[derive(Debug, Clone, Default)]
pub struct VehicleGenerator {
    round: u64,
    ranks: PriorityRanks,
}

impl VehicleGenerator {
    pub fn new(ranks: PriorityRanks) -> Self {
        Self { round: 0, ranks }
    }

    /// Rounds completed so far; also the round number of the next batch.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Runs one round and returns the number of vehicles created.
    ///
    /// Turn lanes are filled first, then priority lanes, each priority vehicle
    /// ranked by the backlog it joins.
    pub fn generate(&mut self, store: &mut LaneStore) -> usize {
        let round = self.round;
        let mut created = 0;

        for road in Road::ALL {
            let lane = LaneId::turn(road);
            store.enqueue(lane, Vehicle::generated(lane, round), self.ranks.normal);
            created += 1;
        }
        info!("[GEN] Generated cars {} in L3 lanes (left turn)", round);

        for road in Road::ALL {
            let lane = LaneId::priority(road);
            let rank = self.ranks.for_backlog(store.is_congested(lane));
            if rank == self.ranks.high {
                debug!("[GEN] {} is congested, car_{}_{} enters at rank {}", lane, lane, round, rank);
            }
            store.enqueue(lane, Vehicle::generated(lane, round), rank);
            created += 1;
        }
        info!("[GEN] Generated cars {} in L2 lanes (priority/straight)", round);

        self.round += 1;
        created
    }
}

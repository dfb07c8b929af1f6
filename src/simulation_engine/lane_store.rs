use crate::global_variables::{DEFAULT_CONGESTION_THRESHOLD, LANE_COUNT};
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::queues::LaneQueue;
use crate::simulation_engine::vehicles::Vehicle;

/// The twelve lane queues of the junction, indexed by [`LaneId`].
#[derive(Debug, Clone)]
pub struct LaneStore {
    lanes: Vec<LaneQueue>,
    congestion_threshold: usize,
}

impl Default for LaneStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONGESTION_THRESHOLD)
    }
}

impl LaneStore {
    pub fn new(congestion_threshold: usize) -> Self {
        let lanes: Vec<LaneQueue> = LaneId::all()
            .map(|lane| LaneQueue::for_kind(lane.kind))
            .collect();
        debug_assert_eq!(lanes.len(), LANE_COUNT);
        Self {
            lanes,
            congestion_threshold,
        }
    }

    pub fn congestion_threshold(&self) -> usize {
        self.congestion_threshold
    }

    fn lane(&self, lane: LaneId) -> &LaneQueue {
        &self.lanes[lane.index()]
    }

    fn lane_mut(&mut self, lane: LaneId) -> &mut LaneQueue {
        &mut self.lanes[lane.index()]
    }

    /// `rank` only matters for priority lanes.
    pub fn enqueue(&mut self, lane: LaneId, vehicle: Vehicle, rank: i32) {
        self.lane_mut(lane).enqueue(vehicle, rank);
    }

    /// `None` when the lane is empty.
    pub fn dequeue(&mut self, lane: LaneId) -> Option<Vehicle> {
        self.lane_mut(lane).dequeue()
    }

    pub fn size(&self, lane: LaneId) -> usize {
        self.lane(lane).len()
    }

    pub fn is_empty(&self, lane: LaneId) -> bool {
        self.lane(lane).is_empty()
    }

    pub fn set_priority(&mut self, lane: LaneId, rank: i32) {
        self.lane_mut(lane).set_priority(rank);
    }

    /// A priority lane holding more than the backlog threshold.
    pub fn is_congested(&self, lane: LaneId) -> bool {
        self.lane(lane).is_priority() && self.size(lane) > self.congestion_threshold
    }

    /// Vehicles in dequeue order.
    pub fn contents(&self, lane: LaneId) -> Vec<&Vehicle> {
        self.lane(lane).contents()
    }

    /// Vehicles waiting across every lane.
    pub fn total_queued(&self) -> usize {
        self.lanes.iter().map(LaneQueue::len).sum()
    }

    pub fn sizes(&self) -> impl Iterator<Item = (LaneId, usize)> + '_ {
        LaneId::all().map(move |lane| (lane, self.size(lane)))
    }
}

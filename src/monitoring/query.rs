use crate::control_system::traffic_light_controller::LightColor;
use crate::error::KernelResult;
use crate::shared_data::StatsSnapshot;
use crate::simulation_engine::lanes::{LaneId, Road};
use crate::simulation_engine::movement::Move;
use crate::simulation_engine::simulation::KernelHandle;

/// Read-only access to a running junction for presentation layers and
/// monitors. It can consume moves from the default cursor but never changes
/// lane contents.
#[derive(Debug, Clone)]
pub struct JunctionView {
    handle: KernelHandle,
}

impl JunctionView {
    pub fn new(handle: KernelHandle) -> Self {
        Self { handle }
    }

    pub async fn lane_size(&self, lane: LaneId) -> KernelResult<usize> {
        self.handle.lane_size(lane).await
    }

    /// Answered from the published light state, without a round trip.
    pub fn light_color(&self, road: Road) -> LightColor {
        self.handle.light_state().color(road)
    }

    pub async fn pending_move_count(&self) -> KernelResult<usize> {
        self.handle.pending_move_count().await
    }

    pub async fn drain_next_move(&self) -> KernelResult<Option<Move>> {
        self.handle.drain_next_move().await
    }

    pub async fn snapshot(&self) -> KernelResult<StatsSnapshot> {
        self.handle.snapshot().await
    }
}

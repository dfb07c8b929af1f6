use crate::control_system::traffic_light_controller::LightState;
use crate::shared_data::StatsSnapshot;
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::movement::Move;
use crate::simulation_engine::traversal::TickReport;
use crate::simulation_engine::vehicles::Vehicle;
use tokio::sync::oneshot;

/// Requests accepted by the kernel actor. Every variant that produces a value
/// carries the oneshot it is answered on.
#[derive(Debug)]
pub enum KernelCommand {
    Enqueue {
        lane: LaneId,
        vehicle: Vehicle,
        rank: i32,
    },
    Dequeue {
        lane: LaneId,
        reply: oneshot::Sender<Option<Vehicle>>,
    },
    SetPriority {
        lane: LaneId,
        rank: i32,
    },
    LaneSize {
        lane: LaneId,
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<StatsSnapshot>,
    },
    /// One generator round.
    Generate {
        reply: oneshot::Sender<usize>,
    },
    /// One scheduler tick under the given lights.
    Traverse {
        lights: LightState,
        reply: oneshot::Sender<TickReport>,
    },
    PendingMoveCount {
        reply: oneshot::Sender<usize>,
    },
    DrainNextMove {
        reply: oneshot::Sender<Option<Move>>,
    },
}

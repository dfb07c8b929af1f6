use crate::simulation_engine::intersections::Side;
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::vehicles::VehicleId;

/// Errors raised by the junction kernel.
///
/// An empty lane is not an error: `dequeue` returns `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Source and destination lanes sit on the same road.
    #[error("impossible route: {vehicle} trying to go {from} -> {to}")]
    InvalidRoute {
        from: LaneId,
        to: LaneId,
        vehicle: VehicleId,
    },

    /// An intersection side is occupied by another crossing vehicle.
    #[error("intersection side {side} is busy")]
    ResourceBusy { side: Side },

    /// Startup configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A lane identifier outside the 4x3 layout.
    #[error("unknown lane '{0}'")]
    UnknownLane(String),

    /// Text that is not a `<SRC>-><DST>::<VEHICLE>` record.
    #[error("malformed move record '{0}'")]
    MalformedMove(String),

    /// The kernel task has stopped.
    #[error("junction kernel is no longer running")]
    KernelClosed,

    /// A simulation task panicked or stopped before shutdown.
    #[error("simulation task failed: {0}")]
    TaskFailed(String),
}

pub type KernelResult<T> = Result<T, KernelError>;

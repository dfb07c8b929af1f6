use crate::config::SimConfig;
use crate::control_system::traffic_light_controller::LightState;
use crate::error::KernelResult;
use crate::shared_data::{current_timestamp, LaneStat, StatsSnapshot};
use crate::simulation_engine::generator::VehicleGenerator;
use crate::simulation_engine::lane_store::LaneStore;
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::movement::{CursorId, Move, MoveLog};
use crate::simulation_engine::routes::RouteTable;
use crate::simulation_engine::traversal::{TickReport, TraversalScheduler};
use crate::simulation_engine::vehicles::Vehicle;
use log::warn;

/// The whole simulation state for one intersection, owned by a single task.
#[derive(Debug)]
pub struct Junction {
    store: LaneStore,
    routes: RouteTable,
    scheduler: TraversalScheduler,
    generator: VehicleGenerator,
    moves: MoveLog,
    /// Cursor behind `drain_next_move` / `pending_move_count`.
    default_reader: CursorId,
}

impl Default for Junction {
    fn default() -> Self {
        Self::from_parts(
            LaneStore::default(),
            RouteTable::reference(),
            TraversalScheduler::default(),
            VehicleGenerator::default(),
            MoveLog::default(),
        )
    }
}

impl Junction {
    /// Builds a junction from a config, validating it first.
    pub fn new(config: &SimConfig) -> KernelResult<Self> {
        config.validate()?;
        let routes = config.route_table()?;
        for (source, destination) in routes.same_road_routes() {
            warn!(
                "[ROUTES] {} -> {} returns to its own road; moves from {} will be rejected",
                source, destination, source
            );
        }
        Ok(Self::from_parts(
            LaneStore::new(config.congestion_threshold),
            routes,
            TraversalScheduler::new(config.movement_policy, config.ranks(), config.crossing_ticks),
            VehicleGenerator::new(config.ranks()),
            MoveLog::with_capacity(config.move_log_capacity),
        ))
    }

    pub fn from_parts(
        store: LaneStore,
        routes: RouteTable,
        scheduler: TraversalScheduler,
        generator: VehicleGenerator,
        mut moves: MoveLog,
    ) -> Self {
        let default_reader = moves.open_cursor();
        Self {
            store,
            routes,
            scheduler,
            generator,
            moves,
            default_reader,
        }
    }

    pub fn enqueue(&mut self, lane: LaneId, vehicle: Vehicle, rank: i32) {
        self.store.enqueue(lane, vehicle, rank);
    }

    pub fn dequeue(&mut self, lane: LaneId) -> Option<Vehicle> {
        self.store.dequeue(lane)
    }

    pub fn set_priority(&mut self, lane: LaneId, rank: i32) {
        self.store.set_priority(lane, rank);
    }

    pub fn lane_size(&self, lane: LaneId) -> usize {
        self.store.size(lane)
    }

    pub fn store(&self) -> &LaneStore {
        &self.store
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn scheduler(&self) -> &TraversalScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut TraversalScheduler {
        &mut self.scheduler
    }

    /// One generator round.
    pub fn generate(&mut self) -> usize {
        self.generator.generate(&mut self.store)
    }

    /// One scheduler tick under `lights`.
    pub fn traverse(&mut self, lights: &LightState) -> TickReport {
        self.scheduler
            .tick(lights, &mut self.store, &self.routes, &mut self.moves)
    }

    pub fn pending_move_count(&self) -> usize {
        self.moves.pending(self.default_reader)
    }

    pub fn drain_next_move(&mut self) -> Option<Move> {
        self.moves.next(self.default_reader)
    }

    /// Extra independent reader over the move log.
    pub fn open_move_cursor(&mut self) -> CursorId {
        self.moves.open_cursor()
    }

    pub fn next_move_for(&mut self, cursor: CursorId) -> Option<Move> {
        self.moves.next(cursor)
    }

    pub fn close_move_cursor(&mut self, cursor: CursorId) {
        self.moves.close_cursor(cursor);
    }

    pub fn move_log(&self) -> &MoveLog {
        &self.moves
    }

    pub fn snapshot(&self, lights: &LightState) -> StatsSnapshot {
        let counters = self.scheduler.counters();
        let lanes = self
            .store
            .sizes()
            .map(|(lane, size)| LaneStat {
                lane,
                kind: lane.kind,
                size,
                congested: self.store.is_congested(lane),
                destination: self.routes.destination(lane),
            })
            .collect();
        StatsSnapshot {
            timestamp: current_timestamp(),
            lights: *lights,
            lanes,
            pending_moves: self.pending_move_count(),
            in_transit: self.scheduler.pending_len(),
            total_moves: self.moves.total(),
            delivered: counters.delivered,
            rejected_routes: counters.rejected_routes,
            deferred_moves: counters.deferred_moves,
            generated_rounds: self.generator.round(),
            ticks: counters.ticks,
        }
    }
}

//! The per-tick consumer that moves vehicles across the intersection.
//!
//! Each tick runs, in order:
//! 1. release intersection sides whose crossing has finished,
//! 2. re-rank every priority lane by its backlog,
//! 3. drain congested priority lanes down to the threshold (ignores lights
//!    and sides),
//! 4. retry moves still waiting for a side,
//! 5. move vehicles from green roads according to the [`MovementPolicy`].
//!
//! Routes are validated before a vehicle leaves its lane, so a rejected route
//! never loses the vehicle.

use crate::error::KernelError;
use crate::control_system::traffic_light_controller::LightState;
use crate::global_variables::DEFAULT_CROSSING_TICKS;
use crate::simulation_engine::generator::PriorityRanks;
use crate::simulation_engine::intersections::{IntersectionSides, Side};
use crate::simulation_engine::lane_store::LaneStore;
use crate::simulation_engine::lanes::{LaneId, LaneKind, Road};
use crate::simulation_engine::movement::{Move, MoveLog, PendingMove};
use crate::simulation_engine::routes::RouteTable;
use crate::simulation_engine::vehicles::Vehicle;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How many lanes a green road may release per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MovementPolicy {
    /// One vehicle from the priority lane and one from the turn lane.
    #[default]
    BothLanes,
    /// The priority lane if it has anyone waiting, otherwise the turn lane.
    EitherLane,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub moves: Vec<Move>,
    pub rejected: Vec<KernelError>,
    /// Moves sent (back) to the pending queue because their side was busy.
    pub deferred: usize,
    /// Pending moves left after the tick.
    pub pending: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalCounters {
    pub ticks: u64,
    pub delivered: u64,
    pub rejected_routes: u64,
    pub deferred_moves: u64,
    pub drained: u64,
}

#[derive(Debug, Clone)]
pub struct TraversalScheduler {
    policy: MovementPolicy,
    ranks: PriorityRanks,
    crossing_ticks: u32,
    sides: IntersectionSides,
    pending: VecDeque<PendingMove>,
    counters: TraversalCounters,
}

impl Default for TraversalScheduler {
    fn default() -> Self {
        Self::new(MovementPolicy::default(), PriorityRanks::default(), DEFAULT_CROSSING_TICKS)
    }
}

impl TraversalScheduler {
    pub fn new(policy: MovementPolicy, ranks: PriorityRanks, crossing_ticks: u32) -> Self {
        Self {
            policy,
            ranks,
            crossing_ticks,
            sides: IntersectionSides::new(),
            pending: VecDeque::new(),
            counters: TraversalCounters::default(),
        }
    }

    pub fn policy(&self) -> MovementPolicy {
        self.policy
    }

    pub fn counters(&self) -> TraversalCounters {
        self.counters
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn sides(&self) -> &IntersectionSides {
        &self.sides
    }

    pub fn sides_mut(&mut self) -> &mut IntersectionSides {
        &mut self.sides
    }

    /// Runs one full scheduler tick.
    pub fn tick(
        &mut self,
        lights: &LightState,
        store: &mut LaneStore,
        routes: &RouteTable,
        log: &mut MoveLog,
    ) -> TickReport {
        let mut report = TickReport::default();
        self.counters.ticks += 1;

        for (side, vehicle) in self.sides.advance() {
            debug!("[SIDE] {} cleared side {}", vehicle, side);
        }
        self.rerank(store);
        self.drain_backlogs(store, routes, log, &mut report);
        self.retry_pending(store, log, &mut report);
        self.move_on_green(lights, store, routes, log, &mut report);

        report.pending = self.pending.len();
        report
    }

    /// Sets each priority lane's whole backlog to high rank when congested,
    /// normal rank otherwise.
    pub fn rerank(&self, store: &mut LaneStore) {
        for road in Road::ALL {
            let lane = LaneId::priority(road);
            let rank = self.ranks.for_backlog(store.is_congested(lane));
            store.set_priority(lane, rank);
        }
    }

    /// Moves vehicles out of every congested priority lane until it is back at
    /// the threshold, whatever the lights say.
    pub fn drain_backlogs(
        &mut self,
        store: &mut LaneStore,
        routes: &RouteTable,
        log: &mut MoveLog,
        report: &mut TickReport,
    ) {
        for road in Road::ALL {
            let lane = LaneId::priority(road);
            if !store.is_congested(lane) {
                continue;
            }
            info!(
                "[PRIORITY] {} has {} cars (>{}), moving excess",
                lane,
                store.size(lane),
                store.congestion_threshold()
            );
            while store.is_congested(lane) {
                let Some(destination) = self.validated_route(lane, store, routes, report) else {
                    break;
                };
                let Some(vehicle) = store.dequeue(lane) else {
                    break;
                };
                self.counters.drained += 1;
                self.commit(lane, destination, vehicle, store, log, report);
            }
        }
    }

    /// Gives every move already waiting one more try at its side. Moves that
    /// are still blocked go to the back of the queue.
    pub fn retry_pending(&mut self, store: &mut LaneStore, log: &mut MoveLog, report: &mut TickReport) {
        for _ in 0..self.pending.len() {
            let Some(mut pending) = self.pending.pop_front() else {
                break;
            };
            let side = Side(pending.destination.road);
            if self.sides.try_enter(side, &pending.vehicle.id, self.crossing_ticks) {
                self.commit(pending.source, pending.destination, pending.vehicle, store, log, report);
            } else {
                pending.attempts += 1;
                self.defer(pending, report);
            }
        }
    }

    /// Releases vehicles from every road whose light is green.
    pub fn move_on_green(
        &mut self,
        lights: &LightState,
        store: &mut LaneStore,
        routes: &RouteTable,
        log: &mut MoveLog,
        report: &mut TickReport,
    ) {
        for road in Road::ALL {
            if !lights.is_green(road) {
                continue;
            }
            let priority = LaneId::priority(road);
            let turn = LaneId::turn(road);
            match self.policy {
                MovementPolicy::BothLanes => {
                    self.move_one(priority, store, routes, log, report);
                    self.move_one(turn, store, routes, log, report);
                }
                MovementPolicy::EitherLane => {
                    let lane = if store.is_empty(priority) { turn } else { priority };
                    self.move_one(lane, store, routes, log, report);
                }
            }
        }
    }

    /// Dequeues one vehicle from `lane` and sends it across, or parks it as a
    /// pending move if its side is taken. Returns false when nothing left the
    /// lane.
    fn move_one(
        &mut self,
        lane: LaneId,
        store: &mut LaneStore,
        routes: &RouteTable,
        log: &mut MoveLog,
        report: &mut TickReport,
    ) -> bool {
        if store.is_empty(lane) {
            return false;
        }
        let Some(destination) = self.validated_route(lane, store, routes, report) else {
            return false;
        };
        let Some(vehicle) = store.dequeue(lane) else {
            return false;
        };
        let side = Side(destination.road);
        if self.sides.try_enter(side, &vehicle.id, self.crossing_ticks) {
            self.commit(lane, destination, vehicle, store, log, report);
        } else {
            let pending = PendingMove {
                source: lane,
                destination,
                vehicle,
                attempts: 1,
            };
            self.defer(pending, report);
        }
        true
    }

    /// Looks up the exit for `source`, rejecting routes that stay on the same
    /// road. Leaves the lane untouched either way.
    fn validated_route(
        &mut self,
        source: LaneId,
        store: &LaneStore,
        routes: &RouteTable,
        report: &mut TickReport,
    ) -> Option<LaneId> {
        // RouteTable::new maps every source lane, and only source lanes get here.
        let Some(destination) = routes.destination(source) else {
            debug_assert!(false, "no route for source lane {}", source);
            return None;
        };
        if destination.road != source.road {
            return Some(destination);
        }
        let vehicle = store
            .contents(source)
            .first()
            .map(|v| v.id.clone())
            .unwrap_or_default();
        let rejection = KernelError::InvalidRoute {
            from: source,
            to: destination,
            vehicle,
        };
        error!("[ERROR] {}", rejection);
        self.counters.rejected_routes += 1;
        report.rejected.push(rejection);
        None
    }

    fn defer(&mut self, pending: PendingMove, report: &mut TickReport) {
        let busy = KernelError::ResourceBusy {
            side: Side(pending.destination.road),
        };
        debug!(
            "[WAIT] {} {}->{} deferred ({}), attempt {}",
            pending.vehicle.id, pending.source, pending.destination, busy, pending.attempts
        );
        self.counters.deferred_moves += 1;
        report.deferred += 1;
        self.pending.push_back(pending);
    }

    fn commit(
        &mut self,
        source: LaneId,
        destination: LaneId,
        vehicle: Vehicle,
        store: &mut LaneStore,
        log: &mut MoveLog,
        report: &mut TickReport,
    ) {
        info!("[MOVE] {} from {} -> {}", vehicle.id, source, destination);
        let record = log.append(Move::new(source, destination, vehicle.id.clone())).clone();
        if destination.kind == LaneKind::Entry {
            self.counters.delivered += 1;
        } else {
            let rank = self.ranks.for_backlog(store.is_congested(destination));
            store.enqueue(destination, vehicle, rank);
        }
        report.moves.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::traffic_light_controller::Phase;

    fn fill(store: &mut LaneStore, lane: LaneId, count: u64) {
        for i in 0..count {
            store.enqueue(lane, Vehicle::generated(lane, i), 0);
        }
    }

    fn texts(report: &TickReport) -> Vec<String> {
        report.moves.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn green_roads_release_both_lanes_per_tick() {
        let mut store = LaneStore::default();
        let routes = RouteTable::reference();
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::default();
        for road in Road::ALL {
            fill(&mut store, LaneId::priority(road), 2);
            fill(&mut store, LaneId::turn(road), 2);
        }

        let lights = LightState::with_phase(Phase::AcGreen);
        let report = scheduler.tick(&lights, &mut store, &routes, &mut log);
        assert_eq!(
            texts(&report),
            [
                "AL2->BL1::car_AL2_0",
                "AL3->CL1::car_AL3_0",
                "CL2->DL1::car_CL2_0",
                "CL3->AL1::car_CL3_0",
            ]
        );
        assert_eq!(store.size(LaneId::priority(Road::B)), 2);
        assert_eq!(scheduler.counters().delivered, 4);
    }

    #[test]
    fn either_lane_policy_prefers_the_priority_lane() {
        let mut store = LaneStore::default();
        let routes = RouteTable::reference();
        let mut log = MoveLog::new();
        let mut scheduler =
            TraversalScheduler::new(MovementPolicy::EitherLane, PriorityRanks::default(), 1);
        fill(&mut store, LaneId::priority(Road::B), 1);
        fill(&mut store, LaneId::turn(Road::B), 2);

        let lights = LightState::with_phase(Phase::BdGreen);
        let first = scheduler.tick(&lights, &mut store, &routes, &mut log);
        assert_eq!(texts(&first), ["BL2->AL1::car_BL2_0"]);
        let second = scheduler.tick(&lights, &mut store, &routes, &mut log);
        assert_eq!(texts(&second), ["BL3->DL1::car_BL3_0"]);
    }

    #[test]
    fn drain_reduces_backlog_to_threshold() {
        let mut store = LaneStore::new(10);
        let routes = RouteTable::reference();
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::default();
        let lane = LaneId::priority(Road::A);
        fill(&mut store, lane, 15);

        let mut report = TickReport::default();
        scheduler.drain_backlogs(&mut store, &routes, &mut log, &mut report);
        assert_eq!(store.size(lane), 10);
        assert_eq!(report.moves.len(), 5);
        assert!(report.moves.iter().all(|m| m.source == lane));
        assert_eq!(scheduler.counters().drained, 5);
    }

    #[test]
    fn drain_runs_while_the_road_is_red() {
        let mut store = LaneStore::new(10);
        let routes = RouteTable::reference();
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::default();
        let lane = LaneId::priority(Road::A);
        fill(&mut store, lane, 15);

        let report = scheduler.tick(&LightState::with_phase(Phase::BdGreen), &mut store, &routes, &mut log);
        assert_eq!(report.moves.len(), 5);
        assert_eq!(store.size(lane), 10);
        // Drained moves bypass the sides entirely.
        assert_eq!(scheduler.sides().occupied_count(), 0);
    }

    #[test]
    fn busy_side_defers_the_move_instead_of_dropping_it() {
        let mut store = LaneStore::default();
        let routes = RouteTable::reference();
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::default();
        let lane = LaneId::turn(Road::A);
        fill(&mut store, lane, 1);
        let blocker = crate::simulation_engine::vehicles::VehicleId::new("crossing");
        assert!(scheduler.sides_mut().try_enter(Side(Road::C), &blocker, 2));

        let lights = LightState::with_phase(Phase::AcGreen);
        let first = scheduler.tick(&lights, &mut store, &routes, &mut log);
        assert!(first.moves.is_empty());
        assert_eq!(first.deferred, 1);
        assert_eq!(first.pending, 1);
        assert!(store.is_empty(lane));

        // Blocker clears at the start of this tick; the pending move commits.
        let second = scheduler.tick(&lights, &mut store, &routes, &mut log);
        assert_eq!(texts(&second), ["AL3->CL1::car_AL3_0"]);
        assert_eq!(second.pending, 0);
        assert_eq!(scheduler.counters().deferred_moves, 1);
    }

    #[test]
    fn pending_moves_retry_even_after_the_light_turns_red() {
        let mut store = LaneStore::default();
        let routes = RouteTable::reference();
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::new(MovementPolicy::BothLanes, PriorityRanks::default(), 1);
        fill(&mut store, LaneId::priority(Road::A), 1);
        let blocker = crate::simulation_engine::vehicles::VehicleId::new("crossing");
        scheduler.sides_mut().try_enter(Side(Road::B), &blocker, 2);

        scheduler.tick(&LightState::with_phase(Phase::AcGreen), &mut store, &routes, &mut log);
        let report = scheduler.tick(&LightState::with_phase(Phase::BdGreen), &mut store, &routes, &mut log);
        assert_eq!(texts(&report), ["AL2->BL1::car_AL2_0"]);
    }

    #[test]
    fn same_road_route_is_rejected_before_dequeue() {
        let routes = RouteTable::new(RouteTable::reference().iter().map(|(source, destination)| {
            if source == LaneId::priority(Road::A) {
                (source, LaneId::entry(Road::A))
            } else {
                (source, destination)
            }
        }))
        .unwrap();
        let mut store = LaneStore::default();
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::default();
        let lane = LaneId::priority(Road::A);
        fill(&mut store, lane, 1);

        let report = scheduler.tick(&LightState::with_phase(Phase::AcGreen), &mut store, &routes, &mut log);
        assert!(report.moves.is_empty());
        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(
            &report.rejected[0],
            KernelError::InvalidRoute { from, to, vehicle }
                if *from == lane && *to == LaneId::entry(Road::A) && vehicle.as_str() == "car_AL2_0"
        ));
        assert_eq!(store.size(lane), 1);
        assert_eq!(log.total(), 0);
    }

    #[test]
    fn rejected_route_stops_the_drain_loop() {
        let routes = RouteTable::new(RouteTable::reference().iter().map(|(source, destination)| {
            if source == LaneId::priority(Road::D) {
                (source, LaneId::entry(Road::D))
            } else {
                (source, destination)
            }
        }))
        .unwrap();
        let mut store = LaneStore::new(3);
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::default();
        fill(&mut store, LaneId::priority(Road::D), 6);

        let report = scheduler.tick(&LightState::with_phase(Phase::AcGreen), &mut store, &routes, &mut log);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(store.size(LaneId::priority(Road::D)), 6);
    }

    #[test]
    fn further_hop_destinations_keep_the_vehicle() {
        let routes = RouteTable::new(RouteTable::reference().iter().map(|(source, destination)| {
            if source == LaneId::turn(Road::A) {
                (source, LaneId::turn(Road::B))
            } else {
                (source, destination)
            }
        }))
        .unwrap();
        let mut store = LaneStore::default();
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::default();
        fill(&mut store, LaneId::turn(Road::A), 1);

        let report = scheduler.tick(&LightState::with_phase(Phase::AcGreen), &mut store, &routes, &mut log);
        assert_eq!(texts(&report), ["AL3->BL3::car_AL3_0"]);
        assert_eq!(store.size(LaneId::turn(Road::B)), 1);
        assert_eq!(scheduler.counters().delivered, 0);
    }

    #[test]
    fn vehicles_on_entry_lanes_are_never_routed() {
        let routes = RouteTable::reference();
        let mut store = LaneStore::default();
        let mut log = MoveLog::new();
        let mut scheduler = TraversalScheduler::default();
        for road in Road::ALL {
            fill(&mut store, LaneId::entry(road), 15);
        }

        for phase in [Phase::AcGreen, Phase::BdGreen] {
            let report = scheduler.tick(&LightState::with_phase(phase), &mut store, &routes, &mut log);
            assert!(report.moves.is_empty());
            assert!(report.rejected.is_empty());
        }
        for road in Road::ALL {
            assert_eq!(store.size(LaneId::entry(road)), 15);
        }
    }

    #[test]
    fn rerank_escalates_only_congested_lanes() {
        let mut store = LaneStore::new(1);
        let scheduler = TraversalScheduler::default();
        fill(&mut store, LaneId::priority(Road::A), 2);
        fill(&mut store, LaneId::priority(Road::B), 1);
        store.enqueue(LaneId::priority(Road::B), Vehicle::generated(LaneId::priority(Road::B), 9), -10);
        scheduler.rerank(&mut store);
        // B is congested too (2 > 1), so its whole backlog is re-ranked in current order.
        let names: Vec<String> = store
            .contents(LaneId::priority(Road::B))
            .iter()
            .map(|v| v.id.to_string())
            .collect();
        assert_eq!(names, ["car_BL2_9", "car_BL2_0"]);
    }
}

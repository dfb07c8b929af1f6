// src/shared_data.rs

use crate::control_system::traffic_light_controller::{LightColor, LightState};
use crate::simulation_engine::lanes::{LaneId, LaneKind, Road};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Per-lane figures in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStat {
    pub lane: LaneId,
    pub kind: LaneKind,
    pub size: usize,
    pub congested: bool,
    /// Exit lane from the route table; `None` for entry sinks.
    pub destination: Option<LaneId>,
}

/// Read-only projection of the kernel, rebuilt on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub timestamp: u64,
    pub lights: LightState,
    pub lanes: Vec<LaneStat>,
    /// Moves committed but not yet drained by the default reader.
    pub pending_moves: usize,
    /// Vehicles that left their lane and are waiting for an intersection side.
    pub in_transit: usize,
    pub total_moves: u64,
    pub delivered: u64,
    pub rejected_routes: u64,
    pub deferred_moves: u64,
    pub generated_rounds: u64,
    pub ticks: u64,
}

impl StatsSnapshot {
    pub fn lane_size(&self, lane: LaneId) -> usize {
        self.lanes
            .iter()
            .find(|stat| stat.lane == lane)
            .map(|stat| stat.size)
            .unwrap_or(0)
    }

    pub fn light_color(&self, road: Road) -> LightColor {
        self.lights.color(road)
    }

    /// Vehicles sitting in any lane.
    pub fn queued(&self) -> usize {
        self.lanes.iter().map(|stat| stat.size).sum()
    }

    /// Multi-line report in the style of the console statistics block.
    pub fn report(&self) -> String {
        let mut lines = vec![
            "=".repeat(60),
            "LANE STATISTICS & ROUTES:".to_string(),
            "=".repeat(60),
        ];
        for stat in self.lanes.iter().filter(|stat| stat.kind != LaneKind::Entry) {
            let target = stat
                .destination
                .map(|lane| lane.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            let lane_type = match stat.kind {
                LaneKind::Priority => "Priority",
                _ => "Left Turn",
            };
            lines.push(format!(
                "{} -> {} ({}): {} vehicles{}",
                stat.lane,
                target,
                lane_type,
                stat.size,
                if stat.congested { " [CONGESTED]" } else { "" }
            ));
        }
        lines.push(format!("Lights: {}", self.lights));
        lines.push(format!(
            "Moves pending: {} | in transit: {} | delivered: {} | rejected: {}",
            self.pending_moves, self.in_transit, self.delivered, self.rejected_routes
        ));
        lines.push("=".repeat(60));
        lines.join("\n")
    }
}

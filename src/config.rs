use crate::error::{KernelError, KernelResult};
use crate::global_variables::{
    DEFAULT_CONGESTION_THRESHOLD, DEFAULT_CROSSING_TICKS, DEFAULT_GENERATOR_INTERVAL_SECS,
    DEFAULT_LIGHT_CYCLE_SECS, DEFAULT_MOVE_LOG_CAPACITY, DEFAULT_STATS_INTERVAL_SECS,
    DEFAULT_TICK_INTERVAL_SECS, HIGH_PRIORITY_RANK, MAX_PERIOD_SECS, NORMAL_PRIORITY_RANK,
};
use crate::simulation_engine::generator::PriorityRanks;
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::routes::RouteTable;
use crate::simulation_engine::traversal::MovementPolicy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Every tunable of the simulation. Missing fields in a config file fall back
/// to the defaults in `global_variables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub light_cycle_secs: f64,
    pub generator_interval_secs: f64,
    pub tick_interval_secs: f64,
    /// 0 turns the periodic statistics log off.
    pub stats_interval_secs: f64,
    pub congestion_threshold: usize,
    pub high_priority_rank: i32,
    pub normal_priority_rank: i32,
    pub movement_policy: MovementPolicy,
    /// Ticks an intersection side stays held after a light-gated crossing.
    pub crossing_ticks: u32,
    /// Moves the log keeps for a reader that has fallen behind.
    pub move_log_capacity: usize,
    /// Upper bound for the random start offset of each periodic task.
    pub phase_jitter_ms: u64,
    pub seed: Option<u64>,
    /// Replaces the reference route table when set.
    pub routes: Option<BTreeMap<LaneId, LaneId>>,
    pub moves_csv: Option<PathBuf>,
    pub amqp_url: Option<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            light_cycle_secs: DEFAULT_LIGHT_CYCLE_SECS,
            generator_interval_secs: DEFAULT_GENERATOR_INTERVAL_SECS,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
            congestion_threshold: DEFAULT_CONGESTION_THRESHOLD,
            high_priority_rank: HIGH_PRIORITY_RANK,
            normal_priority_rank: NORMAL_PRIORITY_RANK,
            movement_policy: MovementPolicy::default(),
            crossing_ticks: DEFAULT_CROSSING_TICKS,
            move_log_capacity: DEFAULT_MOVE_LOG_CAPACITY,
            phase_jitter_ms: 0,
            seed: None,
            routes: None,
            moves_csv: None,
            amqp_url: None,
        }
    }
}

/// First-tick offsets for the three periodic tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartOffsets {
    pub lights: Duration,
    pub generator: Duration,
    pub scheduler: Duration,
}

impl SimConfig {
    /// Reads a JSON config file.
    pub fn load(path: &Path) -> KernelResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            KernelError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            KernelError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Checks everything that must hold before any task starts.
    pub fn validate(&self) -> KernelResult<()> {
        self.light_cycle()?;
        self.generator_interval()?;
        self.tick_interval()?;
        self.stats_interval()?;
        if self.congestion_threshold == 0 {
            return Err(KernelError::Configuration(
                "congestion_threshold must be at least 1".to_string(),
            ));
        }
        if self.phase_jitter_ms / 1000 >= MAX_PERIOD_SECS {
            return Err(KernelError::Configuration(format!(
                "phase_jitter_ms must stay under {}s, got {}ms",
                MAX_PERIOD_SECS, self.phase_jitter_ms
            )));
        }
        if self.move_log_capacity == 0 {
            return Err(KernelError::Configuration(
                "move_log_capacity must be at least 1".to_string(),
            ));
        }
        if self.high_priority_rank >= self.normal_priority_rank {
            return Err(KernelError::Configuration(format!(
                "high_priority_rank ({}) must sort before normal_priority_rank ({})",
                self.high_priority_rank, self.normal_priority_rank
            )));
        }
        self.route_table().map(|_| ())
    }

    pub fn route_table(&self) -> KernelResult<RouteTable> {
        match &self.routes {
            Some(routes) => RouteTable::new(routes.iter().map(|(&s, &d)| (s, d))),
            None => Ok(RouteTable::reference()),
        }
    }

    pub fn ranks(&self) -> PriorityRanks {
        PriorityRanks {
            high: self.high_priority_rank,
            normal: self.normal_priority_rank,
        }
    }

    pub fn light_cycle(&self) -> KernelResult<Duration> {
        period("light_cycle_secs", self.light_cycle_secs)
    }

    pub fn generator_interval(&self) -> KernelResult<Duration> {
        period("generator_interval_secs", self.generator_interval_secs)
    }

    pub fn tick_interval(&self) -> KernelResult<Duration> {
        period("tick_interval_secs", self.tick_interval_secs)
    }

    /// `None` when the statistics log is turned off.
    pub fn stats_interval(&self) -> KernelResult<Option<Duration>> {
        if self.stats_interval_secs == 0.0 {
            return Ok(None);
        }
        period("stats_interval_secs", self.stats_interval_secs).map(Some)
    }

    /// Random first-tick offsets within `phase_jitter_ms`, reproducible when
    /// `seed` is set.
    pub fn start_offsets(&self) -> StartOffsets {
        if self.phase_jitter_ms == 0 {
            return StartOffsets::default();
        }
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut offset = || Duration::from_millis(rng.random_range(0..=self.phase_jitter_ms));
        StartOffsets {
            lights: offset(),
            generator: offset(),
            scheduler: offset(),
        }
    }
}

/// Seconds to a timer period: at least one nanosecond (a zero period panics
/// `tokio::time::interval`) and at most `MAX_PERIOD_SECS`.
fn period(name: &str, secs: f64) -> KernelResult<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() && duration.as_secs() < MAX_PERIOD_SECS => Ok(duration),
        _ => Err(KernelError::Configuration(format!(
            "{} must be between 1ns and {}s, got {}",
            name, MAX_PERIOD_SECS, secs
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::lanes::Road;

    #[test]
    fn defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.light_cycle(), Ok(Duration::from_secs(9)));
        assert_eq!(config.tick_interval(), Ok(Duration::from_secs(1)));
        assert_eq!(config.stats_interval(), Ok(Some(Duration::from_secs(10))));
        assert_eq!(config.congestion_threshold, 10);
        assert_eq!(config.start_offsets(), StartOffsets::default());
    }

    #[test]
    fn stats_interval_zero_turns_the_report_off() {
        let config = SimConfig {
            stats_interval_secs: 0.0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.stats_interval(), Ok(None));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"light_cycle_secs": 5.0, "movement_policy": "either_lane"}"#)
                .unwrap();
        assert_eq!(config.light_cycle_secs, 5.0);
        assert_eq!(config.movement_policy, MovementPolicy::EitherLane);
        assert_eq!(config.generator_interval_secs, DEFAULT_GENERATOR_INTERVAL_SECS);
    }

    #[test]
    fn bad_values_are_configuration_errors() {
        let cases = [
            SimConfig { tick_interval_secs: 0.0, ..SimConfig::default() },
            SimConfig { light_cycle_secs: f64::NAN, ..SimConfig::default() },
            SimConfig { stats_interval_secs: -1.0, ..SimConfig::default() },
            SimConfig { congestion_threshold: 0, ..SimConfig::default() },
            SimConfig { high_priority_rank: 0, ..SimConfig::default() },
            SimConfig { move_log_capacity: 0, ..SimConfig::default() },
            // Rounds down to a zero period.
            SimConfig { tick_interval_secs: 1e-10, ..SimConfig::default() },
            SimConfig { stats_interval_secs: 1e-12, ..SimConfig::default() },
            // Too large for a Duration.
            SimConfig { light_cycle_secs: 1e30, ..SimConfig::default() },
            SimConfig { generator_interval_secs: f64::INFINITY, ..SimConfig::default() },
            SimConfig { tick_interval_secs: 1e12, ..SimConfig::default() },
            SimConfig { phase_jitter_ms: u64::MAX, ..SimConfig::default() },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(KernelError::Configuration(_))));
        }
    }

    #[test]
    fn incomplete_route_override_fails_validation() {
        let mut routes: BTreeMap<LaneId, LaneId> = RouteTable::reference().iter().collect();
        routes.remove(&LaneId::priority(Road::B));
        let config = SimConfig {
            routes: Some(routes),
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(KernelError::Configuration(m)) if m.contains("BL2")));
    }

    #[test]
    fn route_overrides_parse_from_lane_names() {
        let mut json = String::from("{\"routes\": {");
        let entries: Vec<String> = RouteTable::reference()
            .iter()
            .map(|(s, d)| format!("\"{}\": \"{}\"", s, d))
            .collect();
        json.push_str(&entries.join(","));
        json.push_str("}}");
        let config: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.route_table().unwrap(), RouteTable::reference());
    }

    #[test]
    fn seeded_offsets_are_reproducible_and_bounded() {
        let config = SimConfig {
            phase_jitter_ms: 500,
            seed: Some(7),
            ..SimConfig::default()
        };
        let first = config.start_offsets();
        assert_eq!(first, config.start_offsets());
        for offset in [first.lights, first.generator, first.scheduler] {
            assert!(offset <= Duration::from_millis(500));
        }
    }
}

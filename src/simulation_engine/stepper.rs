//! Virtual-time driver: runs the light cycle, the generator and the scheduler
//! against one [`Junction`] without touching the wall clock.

use crate::config::{SimConfig, StartOffsets};
use crate::control_system::traffic_light_controller::{LightState, TrafficLightController};
use crate::error::KernelResult;
use crate::shared_data::StatsSnapshot;
use crate::simulation_engine::junction::Junction;
use crate::simulation_engine::traversal::TickReport;
use std::time::Duration;

pub struct Stepper {
    junction: Junction,
    lights: TrafficLightController,
    tick_interval: Duration,
    generator_interval: Duration,
    now: Duration,
    next_toggle: Duration,
    next_generation: Duration,
}

impl Stepper {
    pub fn new(config: &SimConfig) -> KernelResult<Self> {
        let junction = Junction::new(config)?;
        Self::with_junction(junction, config, config.start_offsets())
    }

    pub fn with_junction(
        junction: Junction,
        config: &SimConfig,
        offsets: StartOffsets,
    ) -> KernelResult<Self> {
        let lights = TrafficLightController::new(config.light_cycle()?);
        Ok(Self {
            junction,
            next_toggle: offsets.lights + lights.cycle(),
            lights,
            tick_interval: config.tick_interval()?,
            generator_interval: config.generator_interval()?,
            now: offsets.scheduler,
            next_generation: offsets.generator,
        })
    }

    /// Advances virtual time by one scheduler tick. Light toggles and
    /// generator rounds that fall due up to the new time happen first.
    pub fn step(&mut self) -> TickReport {
        self.now += self.tick_interval;
        while self.next_toggle <= self.now {
            self.lights.toggle();
            self.next_toggle += self.lights.cycle();
        }
        while self.next_generation <= self.now {
            self.junction.generate();
            self.next_generation += self.generator_interval;
        }
        let lights = self.lights.state();
        self.junction.traverse(&lights)
    }

    /// Runs `ticks` steps and returns the number of moves committed.
    pub fn run(&mut self, ticks: u64) -> usize {
        (0..ticks).map(|_| self.step().moves.len()).sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.now
    }

    pub fn light_state(&self) -> LightState {
        self.lights.state()
    }

    pub fn junction(&self) -> &Junction {
        &self.junction
    }

    pub fn junction_mut(&mut self) -> &mut Junction {
        &mut self.junction
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.junction.snapshot(&self.lights.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::traffic_light_controller::Phase;

    #[test]
    fn lights_toggle_on_the_configured_cycle() {
        let config = SimConfig {
            light_cycle_secs: 5.0,
            ..SimConfig::default()
        };
        let mut stepper = Stepper::new(&config).unwrap();
        let mut phases = Vec::new();
        for _ in 0..10 {
            stepper.step();
            phases.push(stepper.light_state().phase);
        }
        assert_eq!(phases[..4], [Phase::AcGreen; 4]);
        assert_eq!(phases[4..9], [Phase::BdGreen; 5]);
        assert_eq!(phases[9], Phase::AcGreen);
        assert_eq!(stepper.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn generator_rounds_follow_their_interval() {
        let mut stepper = Stepper::new(&SimConfig::default()).unwrap();
        stepper.run(12);
        // Rounds at t = 0, 5 and 10 seconds.
        assert_eq!(stepper.snapshot().generated_rounds, 3);
    }

    #[test]
    fn long_runs_keep_vehicles_accounted_for() {
        let mut stepper = Stepper::new(&SimConfig::default()).unwrap();
        let moved = stepper.run(300);
        let snapshot = stepper.snapshot();
        let generated = snapshot.generated_rounds * 8;
        assert_eq!(moved as u64, snapshot.total_moves);
        assert_eq!(
            generated,
            snapshot.queued() as u64 + snapshot.delivered + snapshot.in_transit as u64
        );
        assert_eq!(snapshot.rejected_routes, 0);
    }

    #[test]
    fn out_of_range_periods_are_rejected() {
        for config in [
            SimConfig { light_cycle_secs: 1e30, ..SimConfig::default() },
            SimConfig { tick_interval_secs: 1e-10, ..SimConfig::default() },
        ] {
            assert!(matches!(
                Stepper::new(&config),
                Err(crate::error::KernelError::Configuration(_))
            ));
        }
    }

    #[test]
    fn an_unread_move_log_stays_within_its_capacity() {
        let config = SimConfig {
            move_log_capacity: 16,
            ..SimConfig::default()
        };
        let mut stepper = Stepper::new(&config).unwrap();
        let moved = stepper.run(2_000);
        let log = stepper.junction().move_log();
        assert!(moved > 16);
        assert!(log.retained() <= 16);
        assert_eq!(log.total(), moved as u64);
        assert_eq!(log.dropped(), moved as u64 - 16);
    }
}

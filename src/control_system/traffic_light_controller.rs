use crate::communication::shutdown::ShutdownSignal;
use crate::simulation_engine::lanes::Road;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Which road pair currently has right-of-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Roads A and C green, B and D red.
    AcGreen,
    /// Roads B and D green, A and C red.
    BdGreen,
}

impl Phase {
    pub fn next(self) -> Self {
        match self {
            Phase::AcGreen => Phase::BdGreen,
            Phase::BdGreen => Phase::AcGreen,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightColor {
    Green,
    Red,
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LightColor::Green => write!(f, "GREEN"),
            LightColor::Red => write!(f, "RED"),
        }
    }
}

/// The published light state. Colors are derived from the phase, so A/C and
/// B/D can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub phase: Phase,
    /// Number of toggles since start.
    pub cycle: u64,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            phase: Phase::AcGreen,
            cycle: 0,
        }
    }
}

impl LightState {
    pub fn with_phase(phase: Phase) -> Self {
        Self { phase, cycle: 0 }
    }

    pub fn color(&self, road: Road) -> LightColor {
        let green = match self.phase {
            Phase::AcGreen => matches!(road, Road::A | Road::C),
            Phase::BdGreen => matches!(road, Road::B | Road::D),
        };
        if green {
            LightColor::Green
        } else {
            LightColor::Red
        }
    }

    pub fn is_green(&self, road: Road) -> bool {
        self.color(road) == LightColor::Green
    }

    pub fn colors(&self) -> [(Road, LightColor); 4] {
        Road::ALL.map(|road| (road, self.color(road)))
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self
            .colors()
            .iter()
            .map(|(road, color)| format!("{}:{}", road, color))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Free-running two-phase light cycle.
#[derive(Debug, Clone)]
pub struct TrafficLightController {
    state: LightState,
    cycle: Duration,
}

impl TrafficLightController {
    pub fn new(cycle: Duration) -> Self {
        Self {
            state: LightState::default(),
            cycle,
        }
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    /// Flips to the other road pair.
    pub fn toggle(&mut self) -> LightState {
        self.state = LightState {
            phase: self.state.phase.next(),
            cycle: self.state.cycle + 1,
        };
        info!("[LIGHTS] {}", self.state);
        self.state
    }

    /// Toggles every `cycle`, publishing each new state, until shutdown.
    /// Intended to be spawned as its own task.
    pub async fn run_update_loop(
        mut self,
        publisher: watch::Sender<LightState>,
        mut shutdown: ShutdownSignal,
        start_delay: Duration,
    ) {
        publisher.send_replace(self.state);
        info!("[LIGHTS] {}", self.state);

        let mut ticker = interval_at(Instant::now() + start_delay + self.cycle, self.cycle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let state = self.toggle();
                    publisher.send_replace(state);
                }
            }
        }
        debug!("[LIGHTS] controller stopped after {} toggles", self.state.cycle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::shutdown::shutdown_channel;

    #[test]
    fn starts_with_a_and_c_green() {
        let controller = TrafficLightController::new(Duration::from_secs(9));
        let state = controller.state();
        assert_eq!(state.phase, Phase::AcGreen);
        assert!(state.is_green(Road::A) && state.is_green(Road::C));
        assert!(!state.is_green(Road::B) && !state.is_green(Road::D));
    }

    #[test]
    fn phases_alternate_strictly_and_pairs_stay_complementary() {
        let mut controller = TrafficLightController::new(Duration::from_secs(9));
        let mut previous = controller.state();
        for n in 1..=50 {
            let state = controller.toggle();
            assert_ne!(state.phase, previous.phase);
            assert_eq!(state.cycle, n);
            assert_eq!(state.color(Road::A), state.color(Road::C));
            assert_eq!(state.color(Road::B), state.color(Road::D));
            assert_ne!(state.color(Road::A), state.color(Road::B));
            let greens = Road::ALL.iter().filter(|&&r| state.is_green(r)).count();
            assert_eq!(greens, 2);
            previous = state;
        }
    }

    #[test]
    fn display_lists_every_road() {
        let state = LightState::with_phase(Phase::BdGreen);
        assert_eq!(state.to_string(), "A:RED B:GREEN C:RED D:GREEN");
    }

    #[tokio::test(start_paused = true)]
    async fn update_loop_publishes_on_each_cycle_and_stops_on_shutdown() {
        let controller = TrafficLightController::new(Duration::from_secs(9));
        let (tx, mut rx) = watch::channel(LightState::with_phase(Phase::BdGreen));
        let (trigger, signal) = shutdown_channel();
        let handle = tokio::spawn(controller.run_update_loop(tx, signal, Duration::ZERO));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().phase, Phase::AcGreen);

        rx.changed().await.unwrap();
        let state = *rx.borrow_and_update();
        assert_eq!(state.phase, Phase::BdGreen);
        assert_eq!(state.cycle, 1);

        trigger.trigger();
        handle.await.unwrap();
    }
}

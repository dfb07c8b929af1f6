// simulation.rs
use crate::communication::messages::KernelCommand;
use crate::communication::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
use crate::config::SimConfig;
use crate::control_system::traffic_light_controller::{LightState, TrafficLightController};
use crate::error::{KernelError, KernelResult};
use crate::global_variables::{COMMAND_BUFFER, MOVE_BROADCAST_BUFFER};
use crate::monitoring::move_bus::run_move_publisher;
use crate::monitoring::move_recorder::record_moves;
use crate::monitoring::query::JunctionView;
use crate::monitoring::stats_reporter::run_stats_reporter;
use crate::shared_data::StatsSnapshot;
use crate::simulation_engine::junction::Junction;
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::movement::Move;
use crate::simulation_engine::traversal::TickReport;
use crate::simulation_engine::vehicles::Vehicle;
use log::{debug, error, info};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Cloneable client of the kernel actor. Every call fails with
/// [`KernelError::KernelClosed`] once the actor is gone.
#[derive(Debug, Clone)]
pub struct KernelHandle {
    commands: mpsc::Sender<KernelCommand>,
    lights: watch::Receiver<LightState>,
}

impl KernelHandle {
    async fn send(&self, command: KernelCommand) -> KernelResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| KernelError::KernelClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> KernelCommand,
    ) -> KernelResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| KernelError::KernelClosed)
    }

    pub async fn enqueue(&self, lane: LaneId, vehicle: Vehicle, rank: i32) -> KernelResult<()> {
        self.send(KernelCommand::Enqueue { lane, vehicle, rank }).await
    }

    pub async fn dequeue(&self, lane: LaneId) -> KernelResult<Option<Vehicle>> {
        self.request(|reply| KernelCommand::Dequeue { lane, reply }).await
    }

    pub async fn set_priority(&self, lane: LaneId, rank: i32) -> KernelResult<()> {
        self.send(KernelCommand::SetPriority { lane, rank }).await
    }

    pub async fn lane_size(&self, lane: LaneId) -> KernelResult<usize> {
        self.request(|reply| KernelCommand::LaneSize { lane, reply }).await
    }

    pub async fn snapshot(&self) -> KernelResult<StatsSnapshot> {
        self.request(|reply| KernelCommand::Snapshot { reply }).await
    }

    pub async fn generate(&self) -> KernelResult<usize> {
        self.request(|reply| KernelCommand::Generate { reply }).await
    }

    pub async fn traverse(&self, lights: LightState) -> KernelResult<TickReport> {
        self.request(|reply| KernelCommand::Traverse { lights, reply })
            .await
    }

    pub async fn pending_move_count(&self) -> KernelResult<usize> {
        self.request(|reply| KernelCommand::PendingMoveCount { reply })
            .await
    }

    pub async fn drain_next_move(&self) -> KernelResult<Option<Move>> {
        self.request(|reply| KernelCommand::DrainNextMove { reply })
            .await
    }

    /// Last published light state.
    pub fn light_state(&self) -> LightState {
        *self.lights.borrow()
    }

    pub fn view(&self) -> JunctionView {
        JunctionView::new(self.clone())
    }
}

/// Single owner of the [`Junction`]. Commands are applied one at a time in
/// arrival order.
struct KernelActor {
    junction: Junction,
    commands: mpsc::Receiver<KernelCommand>,
    lights: watch::Receiver<LightState>,
    moves: broadcast::Sender<Move>,
}

impl KernelActor {
    async fn run(mut self, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
            }
        }
        let counters = self.junction.scheduler().counters();
        info!(
            "[STATS] kernel stopped: {} ticks, {} moves, {} delivered, {} rejected",
            counters.ticks,
            self.junction.move_log().total(),
            counters.delivered,
            counters.rejected_routes
        );
    }

    fn apply(&mut self, command: KernelCommand) {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            KernelCommand::Enqueue { lane, vehicle, rank } => {
                self.junction.enqueue(lane, vehicle, rank);
            }
            KernelCommand::Dequeue { lane, reply } => {
                let _ = reply.send(self.junction.dequeue(lane));
            }
            KernelCommand::SetPriority { lane, rank } => {
                self.junction.set_priority(lane, rank);
            }
            KernelCommand::LaneSize { lane, reply } => {
                let _ = reply.send(self.junction.lane_size(lane));
            }
            KernelCommand::Snapshot { reply } => {
                let lights = *self.lights.borrow();
                let _ = reply.send(self.junction.snapshot(&lights));
            }
            KernelCommand::Generate { reply } => {
                let _ = reply.send(self.junction.generate());
            }
            KernelCommand::Traverse { lights, reply } => {
                let report = self.junction.traverse(&lights);
                for record in &report.moves {
                    // No subscribers is fine; the move log still has it.
                    let _ = self.moves.send(record.clone());
                }
                let _ = reply.send(report);
            }
            KernelCommand::PendingMoveCount { reply } => {
                let _ = reply.send(self.junction.pending_move_count());
            }
            KernelCommand::DrainNextMove { reply } => {
                let _ = reply.send(self.junction.drain_next_move());
            }
        }
    }
}

/// Generator task: one round per `period`, first round after `start_delay`.
async fn run_generator_loop(
    handle: KernelHandle,
    period: Duration,
    start_delay: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = interval_at(Instant::now() + start_delay, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                if handle.generate().await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("[GEN] generator stopped");
}

/// Scheduler task: one traversal tick per `period` under the current lights.
async fn run_scheduler_loop(
    handle: KernelHandle,
    period: Duration,
    start_delay: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = interval_at(Instant::now() + start_delay + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                let lights = handle.light_state();
                match handle.traverse(lights).await {
                    Ok(report) if report.pending > 0 => {
                        debug!("[WAIT] {} moves waiting for a side", report.pending);
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }
    debug!("[MOVE] scheduler stopped");
}

/// How a supervised task ended when it did not panic.
#[derive(Debug, Clone, Copy)]
struct TaskExit {
    name: &'static str,
    /// Core tasks run until shutdown; the others may stop on their own.
    core: bool,
}

fn spawn_core<F>(tasks: &mut JoinSet<TaskExit>, name: &'static str, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tasks.spawn(async move {
        task.await;
        TaskExit { name, core: true }
    });
}

fn spawn_auxiliary<F>(tasks: &mut JoinSet<TaskExit>, name: &'static str, job: F)
where
    F: FnOnce() + Send + 'static,
{
    tasks.spawn_blocking(move || {
        job();
        TaskExit { name, core: false }
    });
}

/// A panic is always a failure. A core task that returns is one too unless
/// the runtime is already `stopping`.
fn check_exit(joined: Result<TaskExit, JoinError>, stopping: bool) -> KernelResult<()> {
    match joined {
        Ok(exit) if exit.core && !stopping => Err(KernelError::TaskFailed(format!(
            "{} stopped before shutdown",
            exit.name
        ))),
        Ok(exit) => {
            debug!("[STATS] task {} stopped", exit.name);
            Ok(())
        }
        Err(e) => Err(KernelError::TaskFailed(e.to_string())),
    }
}

/// A running simulation: the kernel actor plus its periodic tasks. The tasks
/// run and stop as one unit.
pub struct SimulationRuntime {
    handle: KernelHandle,
    trigger: ShutdownTrigger,
    move_feed: broadcast::Receiver<Move>,
    tasks: JoinSet<TaskExit>,
}

impl SimulationRuntime {
    /// Validates `config` and spawns every task on the current tokio runtime.
    pub fn start(config: &SimConfig) -> KernelResult<Self> {
        let junction = Junction::new(config)?;
        let light_cycle = config.light_cycle()?;
        let generator_interval = config.generator_interval()?;
        let tick_interval = config.tick_interval()?;
        let stats_interval = config.stats_interval()?;
        let offsets = config.start_offsets();
        let (trigger, signal) = shutdown_channel();

        let controller = TrafficLightController::new(light_cycle);
        let (light_tx, light_rx) = watch::channel(controller.state());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (move_tx, move_feed) = broadcast::channel(MOVE_BROADCAST_BUFFER);

        let handle = KernelHandle {
            commands: command_tx,
            lights: light_rx.clone(),
        };

        let mut tasks = JoinSet::new();
        if let Some(path) = config.moves_csv.clone() {
            let feed = move_tx.subscribe();
            spawn_auxiliary(&mut tasks, "move_recorder", move || record_moves(path, feed));
        }
        if let Some(url) = config.amqp_url.clone() {
            let feed = move_tx.subscribe();
            spawn_auxiliary(&mut tasks, "move_publisher", move || run_move_publisher(url, feed));
        }

        let actor = KernelActor {
            junction,
            commands: command_rx,
            lights: light_rx,
            moves: move_tx,
        };
        spawn_core(&mut tasks, "kernel", actor.run(trigger.subscribe()));
        spawn_core(
            &mut tasks,
            "lights",
            controller.run_update_loop(light_tx, trigger.subscribe(), offsets.lights),
        );
        spawn_core(
            &mut tasks,
            "generator",
            run_generator_loop(
                handle.clone(),
                generator_interval,
                offsets.generator,
                trigger.subscribe(),
            ),
        );
        spawn_core(
            &mut tasks,
            "scheduler",
            run_scheduler_loop(handle.clone(), tick_interval, offsets.scheduler, trigger.subscribe()),
        );
        if let Some(period) = stats_interval {
            spawn_core(
                &mut tasks,
                "stats",
                run_stats_reporter(handle.view(), period, trigger.subscribe()),
            );
        }
        drop(signal);

        info!(
            "[LIGHTS] simulation started: cycle {:?}, generator every {:?}, tick every {:?}",
            light_cycle, generator_interval, tick_interval
        );
        Ok(Self {
            handle,
            trigger,
            move_feed,
            tasks,
        })
    }

    pub fn handle(&self) -> KernelHandle {
        self.handle.clone()
    }

    pub fn view(&self) -> JunctionView {
        self.handle.view()
    }

    /// A fresh receiver for every move committed from now on.
    pub fn subscribe_moves(&self) -> broadcast::Receiver<Move> {
        self.move_feed.resubscribe()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.trigger.subscribe()
    }

    /// Runs until `shutdown` fires or a task fails, then stops every task.
    /// A failed task is returned as [`KernelError::TaskFailed`].
    pub async fn run_until(mut self, mut shutdown: ShutdownSignal) -> KernelResult<()> {
        let failure = loop {
            tokio::select! {
                _ = shutdown.wait() => break None,
                Some(joined) = self.tasks.join_next() => {
                    if let Err(e) = check_exit(joined, false) {
                        break Some(e);
                    }
                }
            }
        };
        if let Some(e) = &failure {
            error!("[ERROR] {}, stopping the simulation", e);
        }
        let stopped = self.shutdown().await;
        match failure {
            Some(e) => Err(e),
            None => stopped,
        }
    }

    /// Stops every task and waits for all of them to finish. Returns the
    /// first task failure seen while stopping.
    pub async fn shutdown(mut self) -> KernelResult<()> {
        self.trigger.trigger();
        drop(self.move_feed);
        let mut first_failure = None;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = check_exit(joined, true) {
                error!("[ERROR] {}", e);
                first_failure.get_or_insert(e);
            }
        }
        info!("[STATS] all simulation tasks stopped");
        first_failure.map_or(Ok(()), Err)
    }
}

/// Runs a simulation until `shutdown` fires, then stops it cleanly.
pub async fn run_simulation(config: &SimConfig, shutdown: ShutdownSignal) -> KernelResult<()> {
    SimulationRuntime::start(config)?.run_until(shutdown).await
}

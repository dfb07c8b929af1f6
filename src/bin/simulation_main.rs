// simulation_main.rs
use anyhow::Context;
use clap::Parser;
use junction_sim::communication::shutdown::shutdown_channel;
use junction_sim::config::SimConfig;
use junction_sim::simulation_engine::simulation::SimulationRuntime;
use junction_sim::simulation_engine::stepper::Stepper;
use junction_sim::simulation_engine::traversal::MovementPolicy;
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "simulation_main")]
#[command(about = "Four-way signalized junction simulation")]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run this many scheduler ticks on virtual time, print the final snapshot and exit
    #[arg(long)]
    ticks: Option<u64>,

    #[arg(long)]
    light_cycle_secs: Option<f64>,

    #[arg(long)]
    generator_interval_secs: Option<f64>,

    #[arg(long)]
    tick_interval_secs: Option<f64>,

    /// 0 disables the periodic statistics log
    #[arg(long)]
    stats_interval_secs: Option<f64>,

    #[arg(long)]
    congestion_threshold: Option<usize>,

    #[arg(long, value_enum)]
    movement_policy: Option<MovementPolicy>,

    #[arg(long)]
    crossing_ticks: Option<u32>,

    #[arg(long)]
    seed: Option<u64>,

    /// Moves kept for readers that have not caught up
    #[arg(long)]
    move_log_capacity: Option<usize>,

    /// Append committed moves to this CSV file
    #[arg(long)]
    moves_csv: Option<PathBuf>,

    /// Publish committed moves to RabbitMQ at this URL
    #[arg(long)]
    amqp_url: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(SimConfig, Option<u64>)> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path).context("loading config file")?,
            None => SimConfig::default(),
        };
        if let Some(v) = self.light_cycle_secs {
            config.light_cycle_secs = v;
        }
        if let Some(v) = self.generator_interval_secs {
            config.generator_interval_secs = v;
        }
        if let Some(v) = self.tick_interval_secs {
            config.tick_interval_secs = v;
        }
        if let Some(v) = self.stats_interval_secs {
            config.stats_interval_secs = v;
        }
        if let Some(v) = self.congestion_threshold {
            config.congestion_threshold = v;
        }
        if let Some(v) = self.movement_policy {
            config.movement_policy = v;
        }
        if let Some(v) = self.crossing_ticks {
            config.crossing_ticks = v;
        }
        if let Some(v) = self.move_log_capacity {
            config.move_log_capacity = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.moves_csv.is_some() {
            config.moves_csv = self.moves_csv;
        }
        if self.amqp_url.is_some() {
            config.amqp_url = self.amqp_url;
        }
        config.validate().context("invalid configuration")?;
        Ok((config, self.ticks))
    }
}

fn run_headless(config: &SimConfig, ticks: u64) -> anyhow::Result<()> {
    let mut stepper = Stepper::new(config).context("building junction")?;
    let moved = stepper.run(ticks);
    info!(
        "[STATS] {} ticks ({:?} simulated), {} moves",
        ticks,
        stepper.elapsed(),
        moved
    );
    let snapshot = stepper.snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("serializing snapshot")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let (config, ticks) = Cli::parse().into_config()?;
    if let Some(ticks) = ticks {
        return run_headless(&config, ticks);
    }

    let (trigger, shutdown) = shutdown_channel();
    let runtime = SimulationRuntime::start(&config).context("starting simulation")?;
    let view = runtime.view();
    let mut supervisor = tokio::spawn(runtime.run_until(shutdown));

    tokio::select! {
        finished = &mut supervisor => {
            finished
                .context("simulation supervisor panicked")?
                .context("simulation failed")?;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
        }
    }

    info!("Ctrl-C received, shutting down");
    if let Ok(snapshot) = view.snapshot().await {
        info!("[STATS] final state\n{}", snapshot.report());
    }
    trigger.trigger();
    supervisor
        .await
        .context("simulation supervisor panicked")?
        .context("simulation failed")?;
    Ok(())
}

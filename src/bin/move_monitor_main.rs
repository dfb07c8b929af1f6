// move_monitor_main.rs
use anyhow::Context;
use clap::Parser;
use junction_sim::global_variables::AMQP_URL;
use junction_sim::monitoring::move_bus::listen_moves;
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "move_monitor_main")]
#[command(about = "Records junction moves from RabbitMQ into a CSV file")]
struct Cli {
    #[arg(long, default_value = AMQP_URL)]
    amqp_url: String,

    #[arg(long, default_value = "junction_moves.csv")]
    csv: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let recorded = listen_moves(cli.amqp_url, cli.csv.clone())
        .await
        .context("consuming junction moves")?;
    info!("Recorded {} moves to {}", recorded, cli.csv.display());
    Ok(())
}

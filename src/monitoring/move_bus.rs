use crate::error::{KernelError, KernelResult};
use crate::global_variables::QUEUE_JUNCTION_MOVES;
use crate::monitoring::move_recorder::{MoveCsvWriter, MoveRecord};
use crate::simulation_engine::movement::Move;
use amiquip::{
    Connection, ConsumerMessage, ConsumerOptions, Exchange, Publish, QueueDeclareOptions,
    Result as AmiquipResult,
};
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Message body for one move: its text form.
pub fn encode_move(record: &Move) -> Vec<u8> {
    record.to_string().into_bytes()
}

pub fn decode_move(body: &[u8]) -> KernelResult<Move> {
    let text = std::str::from_utf8(body)
        .map_err(|_| KernelError::MalformedMove(String::from_utf8_lossy(body).into_owned()))?;
    text.trim().parse()
}

fn publish_moves(url: &str, moves: &mut broadcast::Receiver<Move>) -> AmiquipResult<u64> {
    let mut connection = Connection::insecure_open(url)?;
    let channel = connection.open_channel(None)?;
    let exchange = Exchange::direct(&channel);
    channel.queue_declare(QUEUE_JUNCTION_MOVES, QueueDeclareOptions::default())?;
    info!("[MOVE] publishing moves to queue {}", QUEUE_JUNCTION_MOVES);

    let mut published = 0;
    loop {
        match moves.blocking_recv() {
            Ok(record) => {
                exchange.publish(Publish::new(&encode_move(&record), QUEUE_JUNCTION_MOVES))?;
                published += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("[MOVE] publisher fell behind, {} moves not published", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    connection.close()?;
    Ok(published)
}

/// Publishes every broadcast move to the `junction_moves` queue until the
/// kernel closes the feed. A broker failure stops publishing but leaves the
/// simulation running. Blocks the calling thread.
pub fn run_move_publisher(url: String, mut moves: broadcast::Receiver<Move>) {
    match publish_moves(&url, &mut moves) {
        Ok(published) => info!("[MOVE] publisher sent {} moves", published),
        Err(e) => error!("[ERROR] move publisher stopped: {}", e),
    }
}

/// Consumes the `junction_moves` queue into a CSV file until the broker ends
/// the consumer. Bodies that do not parse are logged and acknowledged.
pub async fn listen_moves(url: String, csv_path: PathBuf) -> anyhow::Result<u64> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<u64> {
        let mut writer = MoveCsvWriter::open(&csv_path)
            .map_err(|e| anyhow::anyhow!("cannot open {}: {}", csv_path.display(), e))?;
        let mut connection = Connection::insecure_open(&url)?;
        let channel = connection.open_channel(None)?;
        let queue = channel.queue_declare(QUEUE_JUNCTION_MOVES, QueueDeclareOptions::default())?;
        let consumer = queue.consume(ConsumerOptions::default())?;
        info!("[MOVE] listening for moves on {}...", QUEUE_JUNCTION_MOVES);

        let mut recorded = 0;
        for message in consumer.receiver().iter() {
            match message {
                ConsumerMessage::Delivery(delivery) => {
                    match decode_move(&delivery.body) {
                        Ok(record) => {
                            info!("[MOVE] {}", record);
                            if let Err(e) = writer.write(&MoveRecord::from(&record)) {
                                error!("[ERROR] writing move {} to CSV: {}", record, e);
                            } else {
                                recorded += 1;
                            }
                        }
                        Err(e) => error!("[ERROR] {}", e),
                    }
                    consumer.ack(delivery)?;
                }
                other => {
                    info!("[MOVE] consumer ended: {:?}", other);
                    break;
                }
            }
        }
        connection.close()?;
        Ok(recorded)
    })
    .await?
}

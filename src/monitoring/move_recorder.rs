use crate::shared_data::current_timestamp;
use crate::simulation_engine::movement::Move;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// One CSV row per committed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub timestamp: u64,
    pub seq: u64,
    pub source: String,
    pub destination: String,
    pub vehicle: String,
    /// The `<SRC>-><DST>::<VEHICLE>` text form.
    pub record: String,
}

impl From<&Move> for MoveRecord {
    fn from(record: &Move) -> Self {
        Self {
            timestamp: current_timestamp(),
            seq: record.seq,
            source: record.source.to_string(),
            destination: record.destination.to_string(),
            vehicle: record.vehicle.to_string(),
            record: record.to_string(),
        }
    }
}

/// Appending CSV writer. The header is written only when the file is new.
pub struct MoveCsvWriter {
    writer: csv::Writer<File>,
}

impl MoveCsvWriter {
    pub fn open(path: &Path) -> Result<Self, Box<dyn Error>> {
        let file_exists = path.exists() && path.metadata()?.len() > 0;
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);
        Ok(Self { writer })
    }

    pub fn write(&mut self, record: &MoveRecord) -> Result<(), Box<dyn Error>> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads every record back from a move CSV file.
pub fn read_moves(path: &Path) -> Result<Vec<MoveRecord>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

/// Writes every broadcast move to `path` until the kernel closes the feed.
/// Blocks the calling thread.
pub fn record_moves(path: PathBuf, mut moves: broadcast::Receiver<Move>) {
    let mut writer = match MoveCsvWriter::open(&path) {
        Ok(writer) => writer,
        Err(e) => {
            error!("[ERROR] cannot open {}: {}", path.display(), e);
            return;
        }
    };
    info!("[MOVE] recording moves to {}", path.display());
    let mut written = 0u64;
    loop {
        match moves.blocking_recv() {
            Ok(record) => {
                if let Err(e) = writer.write(&MoveRecord::from(&record)) {
                    error!("[ERROR] writing move {} to CSV: {}", record, e);
                } else {
                    written += 1;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("[MOVE] recorder fell behind, {} moves not written", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    info!("[MOVE] recorder wrote {} moves to {}", written, path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::lanes::{LaneId, Road};
    use crate::simulation_engine::vehicles::VehicleId;

    fn temp_csv(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}_{}.csv", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn recorder_appends_every_move_until_the_feed_closes() {
        let path = temp_csv("junction_moves_recorder");
        let (tx, rx) = broadcast::channel(16);
        let task = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || record_moves(path, rx))
        };

        for (seq, name) in ["car_0", "car_1"].into_iter().enumerate() {
            let mut record = Move::new(LaneId::turn(Road::A), LaneId::entry(Road::C), VehicleId::new(name));
            record.seq = seq as u64;
            tx.send(record).unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let records = read_moves(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record, "AL3->CL1::car_0");
        assert_eq!(records[1].seq, 1);
        assert_eq!(records[1].destination, "CL1");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reopening_does_not_repeat_the_header() {
        let path = temp_csv("junction_moves_reopen");
        let record = MoveRecord::from(&Move::new(
            LaneId::priority(Road::B),
            LaneId::entry(Road::A),
            VehicleId::new("car_BL2_0"),
        ));
        MoveCsvWriter::open(&path).unwrap().write(&record).unwrap();
        MoveCsvWriter::open(&path).unwrap().write(&record).unwrap();

        let records = read_moves(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.record == "BL2->AL1::car_BL2_0"));
        let _ = std::fs::remove_file(&path);
    }
}

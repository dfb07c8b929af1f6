use crate::error::KernelError;
use crate::global_variables::DEFAULT_MOVE_LOG_CAPACITY;
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::vehicles::{Vehicle, VehicleId};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// A committed transfer of one vehicle between two lanes.
///
/// The text form `AL2->BL1::car_AL2_7` is what presentation consumers read;
/// it does not carry `seq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub source: LaneId,
    pub destination: LaneId,
    pub vehicle: VehicleId,
    pub seq: u64,
}

impl Move {
    pub fn new(source: LaneId, destination: LaneId, vehicle: VehicleId) -> Self {
        Self {
            source,
            destination,
            vehicle,
            seq: 0,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}->{}::{}", self.source, self.destination, self.vehicle)
    }
}

impl FromStr for Move {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || KernelError::MalformedMove(s.to_string());
        let (route, vehicle) = s.split_once("::").ok_or_else(malformed)?;
        let (source, destination) = route.split_once("->").ok_or_else(malformed)?;
        if vehicle.is_empty() || vehicle.chars().any(char::is_whitespace) {
            return Err(malformed());
        }
        let source = source.parse().map_err(|_| malformed())?;
        let destination = destination.parse().map_err(|_| malformed())?;
        Ok(Move::new(source, destination, VehicleId::new(vehicle)))
    }
}

/// A vehicle that has left its lane on green but has not yet been admitted
/// to its intersection side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub source: LaneId,
    pub destination: LaneId,
    pub vehicle: Vehicle,
    pub attempts: u32,
}

/// Handle for one independent reader of a [`MoveLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CursorId(u64);

/// Append-only record of committed moves with independent read cursors.
///
/// Entries every cursor has passed are dropped; the sequence numbering keeps
/// counting from where it was. At most `capacity` entries are kept: past that
/// the oldest go, and a cursor that had not read them skips ahead.
#[derive(Debug)]
pub struct MoveLog {
    entries: VecDeque<Move>,
    /// Sequence number of `entries[0]`.
    base: u64,
    next_seq: u64,
    /// Next sequence number each cursor will read.
    cursors: BTreeMap<CursorId, u64>,
    next_cursor: u64,
    capacity: usize,
    /// Entries evicted before every cursor had read them.
    dropped: u64,
}

impl Default for MoveLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MOVE_LOG_CAPACITY)
    }
}

impl MoveLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            base: 0,
            next_seq: 0,
            cursors: BTreeMap::new(),
            next_cursor: 0,
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Records a move, stamping it with the next sequence number.
    pub fn append(&mut self, mut record: Move) -> &Move {
        record.seq = self.next_seq;
        self.next_seq += 1;
        if self.cursors.is_empty() {
            // Nobody will ever read what is already here.
            self.entries.clear();
            self.base = record.seq;
        }
        self.entries.push_back(record);
        if self.entries.len() > self.capacity {
            if self.dropped == 0 {
                warn!(
                    "[MOVE] move log holds {} unread moves, dropping the oldest",
                    self.capacity
                );
            }
            self.entries.pop_front();
            self.base += 1;
            self.dropped += 1;
        }
        &self.entries[self.entries.len() - 1]
    }

    /// Opens a cursor at the oldest entry still retained.
    pub fn open_cursor(&mut self) -> CursorId {
        let id = CursorId(self.next_cursor);
        self.next_cursor += 1;
        self.cursors.insert(id, self.base);
        id
    }

    pub fn close_cursor(&mut self, cursor: CursorId) {
        self.cursors.remove(&cursor);
        self.compact();
    }

    /// Moves `cursor` has not read yet. Unknown cursors see nothing.
    pub fn pending(&self, cursor: CursorId) -> usize {
        self.cursors
            .get(&cursor)
            .map(|&position| (self.next_seq - position.max(self.base)) as usize)
            .unwrap_or(0)
    }

    /// Next unread move for `cursor`, or `None` once it has caught up.
    pub fn next(&mut self, cursor: CursorId) -> Option<Move> {
        let mut position = *self.cursors.get(&cursor)?;
        if position < self.base {
            warn!(
                "[MOVE] reader fell behind, {} moves skipped",
                self.base - position
            );
            position = self.base;
        }
        if position >= self.next_seq {
            return None;
        }
        let record = self.entries.get((position - self.base) as usize).cloned();
        self.cursors.insert(cursor, position + 1);
        self.compact();
        record
    }

    /// Moves committed since the log was created.
    pub fn total(&self) -> u64 {
        self.next_seq
    }

    /// Entries evicted by the capacity limit before every reader saw them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries still held in memory.
    pub fn retained(&self) -> usize {
        self.entries.len()
    }

    fn compact(&mut self) {
        let oldest_needed = self
            .cursors
            .values()
            .copied()
            .min()
            .unwrap_or(self.next_seq);
        while self.base < oldest_needed && !self.entries.is_empty() {
            self.entries.pop_front();
            self.base += 1;
        }
    }
}

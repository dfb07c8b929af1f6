//! Lane queues.
//!
//! Turn lanes are plain FIFO queues. Priority lanes are ordered by
//! `(rank, insertion sequence)`: a lower rank leaves first and equal ranks
//! leave in the order they arrived. Both sit behind [`LaneQueue`] so the
//! lane store and the scheduler never care which kind they hold.

use crate::simulation_engine::lanes::LaneKind;
use crate::simulation_engine::vehicles::Vehicle;
use std::collections::{BTreeMap, VecDeque};

/// Strict insertion-order queue.
#[derive(Debug, Clone, Default)]
pub struct FifoQueue {
    items: VecDeque<Vehicle>,
}

impl FifoQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, vehicle: Vehicle) {
        self.items.push_back(vehicle);
    }

    pub fn dequeue(&mut self) -> Option<Vehicle> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.items.iter()
    }
}

/// Rank-ordered queue with stable ties.
///
/// Keys are `(rank, seq)` where `seq` grows with every insert, so the map's
/// natural order is the dequeue order and an insert costs `O(log n)`.
#[derive(Debug, Clone, Default)]
pub struct PriorityQueue {
    entries: BTreeMap<(i32, u64), Vehicle>,
    next_seq: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, vehicle: Vehicle, rank: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((rank, seq), vehicle);
    }

    pub fn dequeue(&mut self) -> Option<Vehicle> {
        self.entries.pop_first().map(|(_, vehicle)| vehicle)
    }

    /// Rewrites every entry to `rank`.
    ///
    /// The current dequeue order is kept: existing sequence numbers are handed
    /// back out in that order, so the backlog moves as one block and anything
    /// enqueued later still queues behind it.
    pub fn set_priority(&mut self, rank: i32) {
        if self.entries.is_empty() {
            return;
        }
        let mut seqs: Vec<u64> = self.entries.keys().map(|&(_, seq)| seq).collect();
        seqs.sort_unstable();
        let current = std::mem::take(&mut self.entries);
        self.entries = seqs
            .into_iter()
            .zip(current.into_values())
            .map(|(seq, vehicle)| ((rank, seq), vehicle))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.entries.values()
    }

    /// `(rank, vehicle)` pairs in dequeue order.
    pub fn ranked(&self) -> impl Iterator<Item = (i32, &Vehicle)> {
        self.entries.iter().map(|(&(rank, _), vehicle)| (rank, vehicle))
    }
}

/// A lane's contents, either FIFO or rank-ordered.
#[derive(Debug, Clone)]
pub enum LaneQueue {
    Fifo(FifoQueue),
    Priority(PriorityQueue),
}

impl LaneQueue {
    /// Priority lanes get a rank-ordered queue, every other lane a FIFO.
    pub fn for_kind(kind: LaneKind) -> Self {
        match kind {
            LaneKind::Priority => LaneQueue::Priority(PriorityQueue::new()),
            LaneKind::Entry | LaneKind::Turn => LaneQueue::Fifo(FifoQueue::new()),
        }
    }

    /// FIFO lanes ignore `rank`.
    pub fn enqueue(&mut self, vehicle: Vehicle, rank: i32) {
        match self {
            LaneQueue::Fifo(queue) => queue.enqueue(vehicle),
            LaneQueue::Priority(queue) => queue.enqueue(vehicle, rank),
        }
    }

    pub fn dequeue(&mut self) -> Option<Vehicle> {
        match self {
            LaneQueue::Fifo(queue) => queue.dequeue(),
            LaneQueue::Priority(queue) => queue.dequeue(),
        }
    }

    /// No-op on FIFO lanes.
    pub fn set_priority(&mut self, rank: i32) {
        if let LaneQueue::Priority(queue) = self {
            queue.set_priority(rank);
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LaneQueue::Fifo(queue) => queue.len(),
            LaneQueue::Priority(queue) => queue.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_priority(&self) -> bool {
        matches!(self, LaneQueue::Priority(_))
    }

    /// Vehicles in dequeue order.
    pub fn contents(&self) -> Vec<&Vehicle> {
        match self {
            LaneQueue::Fifo(queue) => queue.iter().collect(),
            LaneQueue::Priority(queue) => queue.iter().collect(),
        }
    }
}

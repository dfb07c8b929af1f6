use crate::error::KernelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four approaches to the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Road {
    A,
    B,
    C,
    D,
}

impl Road {
    pub const ALL: [Road; 4] = [Road::A, Road::B, Road::C, Road::D];

    pub fn letter(self) -> char {
        match self {
            Road::A => 'A',
            Road::B => 'B',
            Road::C => 'C',
            Road::D => 'D',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'A' => Some(Road::A),
            'B' => Some(Road::B),
            'C' => Some(Road::C),
            'D' => Some(Road::D),
            _ => None,
        }
    }

    /// Position in `Road::ALL`.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Road {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// The role of a lane, fixed by its slot number on the road.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LaneKind {
    /// Slot 1. Incoming sink: vehicles are delivered here and never leave.
    Entry,
    /// Slot 2. Straight-through lane, dequeued by rank.
    Priority,
    /// Slot 3. Left-turn lane, plain FIFO.
    Turn,
}

impl LaneKind {
    pub const ALL: [LaneKind; 3] = [LaneKind::Entry, LaneKind::Priority, LaneKind::Turn];

    pub fn slot(self) -> u8 {
        match self {
            LaneKind::Entry => 1,
            LaneKind::Priority => 2,
            LaneKind::Turn => 3,
        }
    }

    pub fn from_slot(slot: u8) -> Option<Self> {
        match slot {
            1 => Some(LaneKind::Entry),
            2 => Some(LaneKind::Priority),
            3 => Some(LaneKind::Turn),
            _ => None,
        }
    }

    /// Entry lanes are sinks and never feed the traversal.
    pub fn is_source(self) -> bool {
        self != LaneKind::Entry
    }
}

/// A lane identifier such as `AL2`: road letter, `L`, slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct LaneId {
    pub road: Road,
    pub kind: LaneKind,
}

impl LaneId {
    pub const fn new(road: Road, kind: LaneKind) -> Self {
        Self { road, kind }
    }

    pub fn entry(road: Road) -> Self {
        Self::new(road, LaneKind::Entry)
    }

    pub fn priority(road: Road) -> Self {
        Self::new(road, LaneKind::Priority)
    }

    pub fn turn(road: Road) -> Self {
        Self::new(road, LaneKind::Turn)
    }

    /// All twelve lanes, ordered road-major (`AL1`, `AL2`, `AL3`, `BL1`, ...).
    pub fn all() -> impl Iterator<Item = LaneId> {
        Road::ALL
            .into_iter()
            .flat_map(|road| LaneKind::ALL.into_iter().map(move |kind| LaneId::new(road, kind)))
    }

    /// Lanes that can be traversal sources (slots 2 and 3).
    pub fn sources() -> impl Iterator<Item = LaneId> {
        Self::all().filter(|lane| lane.kind.is_source())
    }

    /// Dense index into a 12-slot array, matching the order of `all()`.
    pub fn index(self) -> usize {
        self.road.index() * 3 + (self.kind.slot() as usize - 1)
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}L{}", self.road, self.kind.slot())
    }
}

impl FromStr for LaneId {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let parsed = match (chars.next(), chars.next(), chars.next(), chars.next()) {
            (Some(letter), Some('L'), Some(digit), None) => {
                let road = Road::from_letter(letter);
                let kind = digit
                    .to_digit(10)
                    .and_then(|d| LaneKind::from_slot(d as u8));
                road.zip(kind).map(|(road, kind)| LaneId::new(road, kind))
            }
            _ => None,
        };
        parsed.ok_or_else(|| KernelError::UnknownLane(s.to_string()))
    }
}

impl From<LaneId> for String {
    fn from(lane: LaneId) -> Self {
        lane.to_string()
    }
}

impl TryFrom<String> for LaneId {
    type Error = KernelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_names_round_trip_through_text() {
        for lane in LaneId::all() {
            let text = lane.to_string();
            assert_eq!(text.parse::<LaneId>().unwrap(), lane);
        }
        assert_eq!(LaneId::priority(Road::A).to_string(), "AL2");
        assert_eq!(LaneId::turn(Road::D).to_string(), "DL3");
    }

    #[test]
    fn rejects_lanes_outside_the_layout() {
        for bad in ["EL1", "AL4", "AL0", "A2", "AL22", "", "aL1"] {
            assert_eq!(
                bad.parse::<LaneId>(),
                Err(KernelError::UnknownLane(bad.to_string()))
            );
        }
    }

    #[test]
    fn dense_indices_cover_all_twelve_slots() {
        let indices: Vec<usize> = LaneId::all().map(LaneId::index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
        assert_eq!(LaneId::sources().count(), 8);
    }
}

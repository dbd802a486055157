//! Event-id normalization and the offsets probed when looking for the external
//! data belonging to an event
//!
//! Some data sources encode sub-run repetitions of the same event space by
//! adding multiples of 100000 to the true event id, and multi-file productions
//! further shift ids by multiples of 1000000. Every cross-dataset comparison of
//! this program goes through the types below, so that this arithmetic lives in
//! exactly one place.

use std::fmt::{self, Display};

/// Period of the sub-run event id wraparound
pub const EVENT_WRAP: i64 = 100_000;

/// Event id shift between files of a multi-file production
pub const SUB_RUN_STRIDE: i64 = 1_000_000;

/// Reduce an event id to its position within the wrapped event space
pub fn normalize_event(event_id: i64) -> i64 {
    event_id.rem_euclid(EVENT_WRAP)
}

/// Key identifying a track start across datasets
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchKey {
    /// Event id, reduced modulo EVENT_WRAP
    pub event: i64,

    /// Plate on which the track starts
    pub plate: i32,

    /// Segment identifier on that plate
    pub segment: i32,
}
//
impl MatchKey {
    /// Build a key, normalizing the event id
    pub fn new(event_id: i64, plate: i32, segment: i32) -> Self {
        Self {
            event: normalize_event(event_id),
            plate,
            segment,
        }
    }
}

impl Display for MatchKey {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "(event {}, plate {}, segment {})",
            self.event, self.plate, self.segment
        )
    }
}

/// Offsets added to an event id when looking for the files that may hold it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetPolicy {
    offsets: Vec<i64>,
}
//
impl OffsetPolicy {
    /// Probe the given offsets, in order, dropping duplicates
    pub fn new(offsets: impl IntoIterator<Item = i64>) -> Self {
        let mut result = Vec::new();
        for offset in offsets {
            if !result.contains(&offset) {
                result.push(offset);
            }
        }
        Self { offsets: result }
    }

    /// Policy for multi-file productions: shifts of -1 to +5 file strides
    pub fn sub_runs() -> Self {
        Self::new((-1..=5).map(|i| i * SUB_RUN_STRIDE))
    }

    /// Merge another set of offsets after this one
    pub fn with_offsets(mut self, extra: impl IntoIterator<Item = i64>) -> Self {
        let merged = self.offsets.drain(..).chain(extra).collect::<Vec<_>>();
        Self::new(merged)
    }

    /// Offsets probed by this policy
    pub fn offsets(&self) -> &[i64] {
        &self.offsets[..]
    }

    /// Event ids to look for, in probing order, for a given base event id
    ///
    /// Offsets which would overflow the event id are skipped.
    ///
    pub fn candidates(&self, event_id: i64) -> impl Iterator<Item = i64> + '_ {
        self.offsets
            .iter()
            .filter_map(move |&offset| event_id.checked_add(offset))
    }
}

impl Default for OffsetPolicy {
    /// Only look for the event id itself
    fn default() -> Self {
        Self::new([0])
    }
}

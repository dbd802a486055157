//! Comparison of two measurements of the same vertex file, looking for the
//! tracks which fail the momentum selection with a short plate range but pass
//! it with a long one

use crate::{matchkey::MatchKey, numeric::Float, vertex::{Track, VertexTrackStore}};

use std::collections::BTreeSet;

/// Momentum above which a track passes the selection (GeV)
pub const PASS_MOMENTUM: Float = 200.;

/// Momentum below which a track clearly fails the selection (GeV)
pub const FAIL_MOMENTUM: Float = 100.;

/// Tracks whose selection outcome depends on the measurement plate range
#[derive(Clone, Debug, Default)]
pub struct Investigation {
    /// (short range track, long range track) pairs
    pub pairs: Vec<(Track, Track)>,

    /// Number of distinct events in the long range file
    pub num_events: usize,
}

/// Find the tracks failing with the short range that pass with the long one
///
/// Tracks left unmeasured by the short range measurement count as failing.
///
pub fn investigate(short: &VertexTrackStore, long: &VertexTrackStore) -> Investigation {
    let num_events = long
        .tracks()
        .iter()
        .map(|track| track.event_id)
        .collect::<BTreeSet<_>>()
        .len();

    // Index the passing long range tracks for binary search
    let mut passing = long
        .tracks()
        .iter()
        .filter(|track| track.p_reco.is_some_and(|p| p > PASS_MOMENTUM))
        .map(|track| (track.key(), track))
        .collect::<Vec<(MatchKey, &Track)>>();
    passing.sort_by_key(|&(key, _)| key);

    let pairs = short
        .tracks()
        .iter()
        .filter(|track| track.p_reco.map_or(true, |p| p < FAIL_MOMENTUM))
        .filter_map(|track| {
            let key = track.key();
            let lower = passing.partition_point(|&(other, _)| other < key);
            passing
                .get(lower)
                .filter(|&&(other, _)| other == key)
                .map(|&(_, long_track)| (track.clone(), long_track.clone()))
        })
        .collect();

    Investigation { pairs, num_events }
}

//! This module accumulates the truth vs reconstructed momentum statistics of
//! vertex files: how often an event's high-momentum status survives
//! reconstruction

use crate::{numeric::Float, vertex::Track};

/// Default momentum threshold (GeV)
pub const DEFAULT_THRESHOLD: Float = 200.;

/// PDG code of the muon
const PDG_MUON: i32 = 13;

/// 2x2 table of events, by truth and reconstructed status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Contingency {
    /// p_true above threshold, p_reco above threshold
    pub true_over_reco_over: usize,

    /// p_true above threshold, p_reco below threshold
    pub true_over_reco_under: usize,

    /// p_true below threshold, p_reco above threshold
    pub true_under_reco_over: usize,

    /// p_true below threshold, p_reco below threshold
    pub true_under_reco_under: usize,
}
//
impl Contingency {
    /// Count one event
    fn integrate(&mut self, true_over: bool, reco_over: bool) {
        let counter = match (true_over, reco_over) {
            (true, true) => &mut self.true_over_reco_over,
            (true, false) => &mut self.true_over_reco_under,
            (false, true) => &mut self.true_under_reco_over,
            (false, false) => &mut self.true_under_reco_under,
        };
        *counter += 1;
    }

    /// Number of events whose truth status is above threshold
    pub fn true_over(&self) -> usize {
        self.true_over_reco_over + self.true_over_reco_under
    }

    /// Number of events whose truth status is below threshold
    pub fn true_under(&self) -> usize {
        self.true_under_reco_over + self.true_under_reco_under
    }
}

/// Status of one event with respect to the momentum threshold
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct EventStatus {
    true_over: bool,
    reco_over: bool,
    mu_true_over: bool,
    mu_reco_over: bool,
}

/// Accumulates per-event momentum statistics
#[derive(Clone, Debug)]
pub struct RatioAccumulator {
    /// Momentum threshold (GeV)
    pub threshold: Float,

    /// Number of track groups seen, including skipped ones
    pub num_events: usize,

    /// Number of events skipped because a track was not measured
    pub skipped_events: usize,

    /// Statistics over all tracks
    pub all: Contingency,

    /// Statistics over muon tracks only
    pub muons: Contingency,
}
//
impl RatioAccumulator {
    /// Prepare for accumulation
    pub fn new(threshold: Float) -> Self {
        Self {
            threshold,
            num_events: 0,
            skipped_events: 0,
            all: Contingency::default(),
            muons: Contingency::default(),
        }
    }

    /// Integrate the tracks of one vertex
    ///
    /// An event is "over" if any of its tracks is over threshold. Events which
    /// hold an unmeasured track are skipped. Returns whether the event was
    /// counted.
    ///
    pub fn integrate(&mut self, group: &[Track]) -> bool {
        self.num_events += 1;
        let Some(status) = self.event_status(group) else {
            self.skipped_events += 1;
            return false;
        };
        self.all.integrate(status.true_over, status.reco_over);
        self.muons.integrate(status.mu_true_over, status.mu_reco_over);
        true
    }

    /// Evaluate an event, or None if one of its tracks was not measured
    fn event_status(&self, group: &[Track]) -> Option<EventStatus> {
        let mut status = EventStatus::default();
        for track in group {
            let p_reco = track.p_reco?;
            let true_over = track.p_true.is_some_and(|p| p > self.threshold);
            let reco_over = p_reco > self.threshold;
            status.true_over |= true_over;
            status.reco_over |= reco_over;
            if track.abs_pdg() == Some(PDG_MUON) {
                status.mu_true_over |= true_over;
                status.mu_reco_over |= reco_over;
            }
        }
        Some(status)
    }
}

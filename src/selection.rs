//! Mechanism to select the tracks which fake a high-momentum hadron in the
//! neutrino event selection

use crate::{numeric::Float, vertex::Track};

/// Cuts defining a fake hadron candidate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FakeHadronCut {
    /// Minimal reconstructed momentum (GeV)
    pub p_min: Float,

    /// Minimal distance of the first segment from the origin of the plate
    /// coordinates
    pub r_min: Float,

    /// Minimal number of plates spanned
    pub min_npl: i32,
}
//
impl FakeHadronCut {
    /// Setup the cuts
    pub fn new(p_min: Float, r_min: Float, min_npl: i32) -> Self {
        Self {
            p_min,
            r_min,
            min_npl,
        }
    }

    /// Decide whether a track passes the cut or should be rejected
    pub fn keep(&self, track: &Track) -> bool {
        // Unmeasured tracks cannot fake a high momentum
        let Some(p_reco) = track.p_reco else {
            return false;
        };
        if p_reco <= self.p_min {
            return false;
        }

        // Check that the track is long enough to be trusted
        if track.npl < self.min_npl {
            return false;
        }

        // Check the position of the track start
        track.first_position.norm() > self.r_min
    }
}

impl Default for FakeHadronCut {
    fn default() -> Self {
        Self::new(200., 0.005, 10)
    }
}

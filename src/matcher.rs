//! Matching of vertex-file tracks against external candidate tracks, and
//! extraction of measurements from the matched candidates

use crate::{
    config::MeasurementConfig,
    numeric::Float,
    source::CandidateTrack,
    vertex::Track,
};

use tracing::{debug, warn};

/// Decide whether a candidate track is the one a vertex-file track refers to
///
/// The record matches if any segment of the candidate has the same plate and
/// segment ids, with event ids compared modulo the sub-run wraparound.
///
pub fn matches(candidate: &CandidateTrack, record: &Track) -> bool {
    let key = record.key();
    candidate.segments.iter().any(|segment| segment.key() == key)
}

/// Find the candidate which a vertex-file track refers to
///
/// The first matching candidate wins. Further matches are reported, since
/// they usually mean that a track was split or duplicated in the source.
///
pub fn find_match<'c>(
    candidates: &'c [CandidateTrack],
    record: &Track,
) -> Option<&'c CandidateTrack> {
    let mut matching = candidates
        .iter()
        .filter(|candidate| matches(candidate, record));
    let first = matching.next()?;
    for duplicate in matching {
        warn!(
            "Track {} also matches candidate {}, keeping candidate {}",
            record.key(),
            duplicate.id,
            first.id
        );
    }
    Some(first)
}

/// External momentum reconstruction
pub trait MomentumEstimator {
    /// Estimate the momentum of a candidate track, if it can be measured
    fn measure(&self, candidate: &CandidateTrack) -> Option<Float>;
}

/// Momentum estimator which trusts the momentum already stored on linked
/// tracks, subject to track quality cuts
pub struct StoredMomentum {
    config: MeasurementConfig,
}
//
impl StoredMomentum {
    /// Set up the estimator
    pub fn new(config: MeasurementConfig) -> Self {
        Self { config }
    }
}

impl MomentumEstimator for StoredMomentum {
    fn measure(&self, candidate: &CandidateTrack) -> Option<Float> {
        // Short tracks do not give a usable multiple-scattering measurement
        if candidate.npl() < self.config.min_plates {
            debug!(
                "Candidate {} spans {} plates, not measured",
                candidate.id,
                candidate.npl()
            );
            return None;
        }

        // Kinked tracks are usually mis-linked
        let angle_diff = candidate.max_angle_diff();
        if angle_diff > self.config.max_angle_diff {
            if self.config.reject_kinked {
                debug!("Candidate {} is kinked ({}), not measured", candidate.id, angle_diff);
                return None;
            }
            debug!("Candidate {} is kinked ({})", candidate.id, angle_diff);
        }

        candidate.momentum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{numeric::Vector2, source::Segment};

    fn record(event_id: i64, plate_id: i32, seg_id: i32) -> Track {
        Track {
            event_id,
            plate_id,
            seg_id,
            first_position: Vector2::zeros(),
            plate_id_last: plate_id,
            npl: 1,
            pdg_id: None,
            p_true: None,
            p_reco: None,
            ivertex: Some(0),
            signal: false,
        }
    }

    fn candidate(id: i32, keys: &[(i64, i32, i32)], slopes: &[Float]) -> CandidateTrack {
        CandidateTrack {
            id,
            momentum: Some(100. + id as Float),
            segments: keys
                .iter()
                .zip(slopes.iter().chain(std::iter::repeat(&0.)))
                .map(|(&(event_id, plate_id, segment_id), &tx)| Segment {
                    event_id,
                    plate_id,
                    segment_id,
                    mc_track_id: id,
                    slope: Vector2::new(tx, 0.),
                })
                .collect(),
        }
    }

    #[test]
    fn test_matches_modulo_wrap() {
        let target = record(450, 5, 7);
        assert!(matches(&candidate(0, &[(100_450, 5, 7)], &[]), &target));
        assert!(!matches(&candidate(0, &[(451, 5, 7)], &[]), &target));
        assert!(!matches(&candidate(0, &[(450, 6, 7)], &[]), &target));
        assert!(!matches(&candidate(0, &[(450, 5, 8)], &[]), &target));
    }

    #[test]
    fn test_matches_any_segment() {
        let target = record(450, 6, 2);
        let track = candidate(0, &[(450, 5, 1), (450, 6, 2), (450, 7, 3)], &[]);
        assert!(matches(&track, &target));
    }

    #[test]
    fn test_find_match() {
        let candidates = vec![
            candidate(0, &[(450, 4, 1)], &[]),
            candidate(1, &[(450, 5, 7)], &[]),
            candidate(2, &[(100_450, 5, 7)], &[]),
        ];
        assert_eq!(find_match(&candidates, &record(450, 5, 7)).unwrap().id, 1);
        assert!(find_match(&candidates, &record(450, 5, 8)).is_none());
        assert!(find_match(&[], &record(450, 5, 7)).is_none());
    }

    #[test]
    fn test_stored_momentum_cuts() {
        let config = MeasurementConfig {
            min_plates: 3,
            max_angle_diff: 0.5,
            reject_kinked: true,
        };
        let estimator = StoredMomentum::new(config);

        let good = candidate(1, &[(1, 1, 1), (1, 2, 1), (1, 3, 1)], &[0., 0.1, 0.2]);
        assert_eq!(estimator.measure(&good), Some(101.));

        let short = candidate(2, &[(1, 1, 1), (1, 2, 1)], &[]);
        assert_eq!(estimator.measure(&short), None);

        let kinked = candidate(3, &[(1, 1, 1), (1, 2, 1), (1, 3, 1)], &[0., 0.9, 0.9]);
        assert_eq!(estimator.measure(&kinked), None);

        let tolerant = StoredMomentum::new(MeasurementConfig {
            reject_kinked: false,
            ..config
        });
        assert_eq!(tolerant.measure(&kinked), Some(103.));

        let mut unmeasured = good.clone();
        unmeasured.momentum = None;
        assert_eq!(estimator.measure(&unmeasured), None);
    }
}

//! Correlation of vertex-file track groups with external linked-track data
//!
//! For each vertex, the correlator looks up the source files of the vertex's
//! event (under every offset of the configured policy), reads their candidate
//! tracks, and hands each newly matched (track, candidate) pair to a payload
//! which enriches the track record.

use crate::{
    matchkey::OffsetPolicy,
    matcher::{find_match, MomentumEstimator},
    source::{CandidateTrack, EventFilter, SourceIndex, TrackSource},
    truth::TruthManager,
    vertex::{Track, VertexTrackStore},
};

use tracing::{debug, info, warn};

use std::path::PathBuf;

/// What a correlation run did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    /// Number of vertices owning at least one track
    pub vertices: usize,

    /// Number of tracks which were matched to a candidate
    pub matched_tracks: usize,

    /// Number of source files which were successfully read
    pub sources_read: usize,

    /// Source files which could not be used, in order of discovery
    pub invalid_files: Vec<PathBuf>,
}
//
impl CorrelationSummary {
    /// Display the summary, including the list of invalid files
    pub fn print(&self) {
        println!("Vertices with tracks : {}", self.vertices);
        println!("Matched tracks       : {}", self.matched_tracks);
        println!("Source files read    : {}", self.sources_read);
        println!("Invalid files: ");
        for file in &self.invalid_files {
            println!("{}", file.display());
        }
    }
}

/// Correlation driver
pub struct Correlator<'a, S: TrackSource> {
    /// Reader of the external track data
    source: &'a S,

    /// External track data files, by event
    index: &'a SourceIndex,

    /// Event id offsets to probe
    policy: &'a OffsetPolicy,
}
//
impl<'a, S: TrackSource> Correlator<'a, S> {
    /// Set up a correlator
    pub fn new(source: &'a S, index: &'a SourceIndex, policy: &'a OffsetPolicy) -> Self {
        Self {
            source,
            index,
            policy,
        }
    }

    /// Match every vertex's tracks, calling `on_match` once per matched track
    ///
    /// The first candidate found for a track wins: files probed later for the
    /// same vertex do not revisit it. Tracks which precede every vertex are
    /// not correlated.
    ///
    pub fn run(
        &self,
        store: &mut VertexTrackStore,
        mut on_match: impl FnMut(&mut Track, &CandidateTrack),
    ) -> CorrelationSummary {
        let mut summary = CorrelationSummary::default();
        store.sort_by_vertex();
        let ivertices = store
            .vertices()
            .iter()
            .map(|vertex| vertex.ivertex)
            .collect::<Vec<_>>();

        for ivertex in ivertices {
            let group = store.tracks_for_vertex_mut(ivertex);

            // All tracks of a vertex come from the same event
            let Some(event_id) = group.first().map(|track| track.event_id) else {
                continue;
            };
            summary.vertices += 1;
            let filter = EventFilter::new(event_id);
            let mut matched = vec![false; group.len()];

            'probing: for target in self.policy.candidates(event_id) {
                for path in self.index.files_for_event(target) {
                    if matched.iter().all(|&done| done) {
                        break 'probing;
                    }
                    let candidates = match self.source.read(path, Some(&filter)) {
                        Ok(candidates) => candidates,
                        Err(error) => {
                            warn!("Skipping source: {}", error);
                            let path = error.path().to_owned();
                            if !summary.invalid_files.contains(&path) {
                                summary.invalid_files.push(path);
                            }
                            continue;
                        }
                    };
                    summary.sources_read += 1;

                    for (track, done) in group.iter_mut().zip(matched.iter_mut()) {
                        if *done {
                            continue;
                        }
                        if let Some(candidate) = find_match(&candidates, track) {
                            debug!("{} matched in {}", track.key(), path.display());
                            on_match(track, candidate);
                            *done = true;
                            summary.matched_tracks += 1;
                        }
                    }
                }
            }
        }

        info!(
            "{} of {} tracks matched over {} vertices",
            summary.matched_tracks,
            store.tracks().len(),
            summary.vertices
        );
        summary
    }

    /// Fill the reconstructed momentum of every matched track
    ///
    /// With `update_extent`, the last plate and plate count of matched tracks
    /// are also refreshed from the candidate.
    ///
    pub fn measure_momenta(
        &self,
        store: &mut VertexTrackStore,
        estimator: &impl MomentumEstimator,
        update_extent: bool,
    ) -> CorrelationSummary {
        self.run(store, |track, candidate| {
            track.p_reco = estimator.measure(candidate);
            if update_extent {
                if let Some(last) = candidate.last_segment() {
                    track.plate_id_last = last.plate_id;
                }
                track.npl = candidate.npl();
            }
        })
    }

    /// Flag every matched track which belongs to the truth interaction
    pub fn flag_signal(
        &self,
        store: &mut VertexTrackStore,
        truth: &TruthManager,
    ) -> CorrelationSummary {
        self.run(store, |track, candidate| {
            track.signal = truth.is_track(candidate);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        matchkey::SUB_RUN_STRIDE,
        numeric::{Float, Vector2},
        source::{Segment, SourceError},
        truth::TruthBuilder,
    };

    use std::{cell::Cell, collections::HashMap, path::Path};

    /// In-memory track source
    #[derive(Default)]
    struct MockSource {
        files: HashMap<PathBuf, Vec<CandidateTrack>>,
        reads: Cell<usize>,
    }
    //
    impl MockSource {
        fn with_file(mut self, path: &str, tracks: Vec<CandidateTrack>) -> Self {
            self.files.insert(PathBuf::from(path), tracks);
            self
        }
    }
    //
    impl TrackSource for MockSource {
        fn read(
            &self,
            path: &Path,
            filter: Option<&EventFilter>,
        ) -> Result<Vec<CandidateTrack>, SourceError> {
            self.reads.set(self.reads.get() + 1);
            let tracks = self.files.get(path).ok_or_else(|| SourceError::Empty {
                path: path.to_owned(),
            })?;
            Ok(tracks
                .iter()
                .filter(|track| filter.map_or(true, |filter| filter.keep(track)))
                .cloned()
                .collect())
        }
    }

    /// Estimator returning a fixed value and counting its invocations
    struct MockEstimator {
        value: Float,
        calls: Cell<usize>,
    }
    //
    impl MomentumEstimator for MockEstimator {
        fn measure(&self, _candidate: &CandidateTrack) -> Option<Float> {
            self.calls.set(self.calls.get() + 1);
            Some(self.value)
        }
    }

    fn estimator() -> MockEstimator {
        MockEstimator {
            value: 123.5,
            calls: Cell::new(0),
        }
    }

    fn candidate(id: i32, event_id: i64, plate_id: i32, segment_id: i32) -> CandidateTrack {
        CandidateTrack {
            id,
            momentum: None,
            segments: vec![
                Segment {
                    event_id,
                    plate_id,
                    segment_id,
                    mc_track_id: id,
                    slope: Vector2::zeros(),
                },
                Segment {
                    event_id,
                    plate_id: plate_id + 4,
                    segment_id: 99,
                    mc_track_id: id,
                    slope: Vector2::zeros(),
                },
            ],
        }
    }

    const VERTICES: &str = "\
1ry_vtx 1 0 0 1 2
1ry_trk 5 7 0 0 5 1 13 100 -999 200
1ry_trk 5 8 0 0 5 1 211 10 -999 200
1ry_vtx 1 0 0 1 1
1ry_trk 3 1 0 0 3 1 13 100 -999 300
";

    fn store() -> VertexTrackStore {
        VertexTrackStore::parse_reader(VERTICES.as_bytes()).unwrap()
    }

    fn index(paths: &[&str]) -> SourceIndex {
        SourceIndex::new(paths.iter().map(PathBuf::from)).unwrap()
    }

    fn p_recos(store: &VertexTrackStore) -> Vec<Option<Float>> {
        store.tracks().iter().map(|track| track.p_reco).collect()
    }

    #[test]
    fn test_single_match() {
        let source =
            MockSource::default().with_file("evt_200_pl1", vec![candidate(0, 100_200, 5, 7)]);
        let index = index(&["evt_200_pl1"]);
        let policy = OffsetPolicy::default();
        let estimator = estimator();
        let mut store = store();

        let summary = Correlator::new(&source, &index, &policy).measure_momenta(
            &mut store,
            &estimator,
            false,
        );

        assert_eq!(p_recos(&store), vec![Some(123.5), None, None]);
        assert_eq!(estimator.calls.get(), 1);
        assert_eq!(summary.vertices, 2);
        assert_eq!(summary.matched_tracks, 1);
        assert_eq!(summary.sources_read, 1);
        assert!(summary.invalid_files.is_empty());

        // Unmatched tracks keep the text-format sentinel
        let mut output = Vec::new();
        store.write_to(&mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("1ry_trk\t5\t7\t0\t0\t5\t1\t13\t100\t123.5\t200\n"));
        assert!(output.contains("1ry_trk\t5\t8\t0\t0\t5\t1\t211\t10\t-999\t200\n"));
    }

    #[test]
    fn test_no_candidate_means_no_measurement() {
        let source = MockSource::default().with_file("evt_200_pl1", vec![candidate(0, 200, 9, 9)]);
        let index = index(&["evt_200_pl1"]);
        let policy = OffsetPolicy::default();
        let estimator = estimator();
        let mut store = store();

        let summary = Correlator::new(&source, &index, &policy).measure_momenta(
            &mut store,
            &estimator,
            false,
        );

        assert_eq!(estimator.calls.get(), 0);
        assert_eq!(summary.matched_tracks, 0);
        assert_eq!(p_recos(&store), vec![None, None, None]);
    }

    #[test]
    fn test_first_match_wins_across_offsets() {
        let source = MockSource::default()
            .with_file("evt_200_a", vec![candidate(0, 200, 5, 7)])
            .with_file(
                "evt_1000200_a",
                vec![candidate(1, 1_000_200, 5, 7), candidate(2, 1_000_200, 5, 8)],
            );
        let index = index(&["evt_200_a", "evt_1000200_a"]);
        let policy = OffsetPolicy::sub_runs();
        let mut store = store();
        let mut seen = Vec::new();

        Correlator::new(&source, &index, &policy).run(&mut store, |track, candidate| {
            seen.push((track.seg_id, candidate.id));
        });

        assert_eq!(seen, vec![(7, 0), (8, 2)]);
    }

    #[test]
    fn test_offset_probing_stops_when_group_is_complete() {
        let source = MockSource::default()
            .with_file("evt_300_a", vec![candidate(0, 300, 3, 1)])
            .with_file("evt_1000300_a", vec![candidate(1, 1_000_300, 3, 1)]);
        let index = index(&["evt_300_a", "evt_1000300_a"]);
        let policy = OffsetPolicy::new([0, SUB_RUN_STRIDE]);
        let mut store = store();

        let summary = Correlator::new(&source, &index, &policy).run(&mut store, |_, _| {});

        assert_eq!(summary.matched_tracks, 1);
        assert_eq!(source.reads.get(), 1);
    }

    #[test]
    fn test_offsets_outside_policy_are_ignored() {
        let source = MockSource::default()
            .with_file("evt_1000200_a", vec![candidate(0, 1_000_200, 5, 7)]);
        let index = index(&["evt_1000200_a"]);
        let policy = OffsetPolicy::default();
        let mut store = store();

        let summary = Correlator::new(&source, &index, &policy).run(&mut store, |_, _| {});

        assert_eq!(summary.matched_tracks, 0);
        assert_eq!(source.reads.get(), 0);
    }

    #[test]
    fn test_invalid_files_are_skipped() {
        let source = MockSource::default().with_file("evt_200_b", vec![candidate(0, 200, 5, 8)]);
        let index = index(&["evt_200_a", "evt_200_b"]);
        let policy = OffsetPolicy::default();
        let estimator = estimator();
        let mut store = store();

        let summary = Correlator::new(&source, &index, &policy).measure_momenta(
            &mut store,
            &estimator,
            false,
        );

        assert_eq!(summary.invalid_files, vec![PathBuf::from("evt_200_a")]);
        assert_eq!(summary.sources_read, 1);
        assert_eq!(p_recos(&store), vec![None, Some(123.5), None]);
    }

    #[test]
    fn test_orphan_tracks_are_not_correlated() {
        let input = format!("1ry_trk 5 7 0 0 5 1 13 100 -999 200\n{}", VERTICES);
        let mut store = VertexTrackStore::parse_reader(input.as_bytes()).unwrap();
        let source = MockSource::default().with_file("evt_200_pl1", vec![candidate(0, 200, 5, 7)]);
        let index = index(&["evt_200_pl1"]);
        let policy = OffsetPolicy::default();
        let estimator = estimator();

        Correlator::new(&source, &index, &policy).measure_momenta(&mut store, &estimator, false);

        assert_eq!(store.orphan_tracks()[0].p_reco, None);
        assert_eq!(store.tracks_for_vertex(0)[0].p_reco, Some(123.5));
    }

    #[test]
    fn test_update_extent() {
        let source = MockSource::default().with_file("evt_200_pl1", vec![candidate(0, 200, 5, 7)]);
        let index = index(&["evt_200_pl1"]);
        let policy = OffsetPolicy::default();
        let estimator = estimator();
        let mut store = store();

        Correlator::new(&source, &index, &policy).measure_momenta(&mut store, &estimator, true);

        let track = &store.tracks_for_vertex(0)[0];
        assert_eq!(track.plate_id_last, 9);
        assert_eq!(track.npl, 5);
        let untouched = &store.tracks_for_vertex(0)[1];
        assert_eq!(untouched.plate_id_last, 5);
        assert_eq!(untouched.npl, 1);
    }

    #[test]
    fn test_flag_signal() {
        let mut builder = TruthBuilder::new(false);
        builder.read_truth_str("200 14 - 0\n").unwrap();
        let truth = builder.build();
        let source = MockSource::default().with_file(
            "evt_200_pl1",
            vec![candidate(0, 100_200, 5, 7), candidate(5, 100_200, 5, 8)],
        );
        let index = index(&["evt_200_pl1"]);
        let policy = OffsetPolicy::default();
        let mut store = store();

        Correlator::new(&source, &index, &policy).flag_signal(&mut store, &truth);

        let flags = store.tracks().iter().map(|track| track.signal).collect::<Vec<_>>();
        assert_eq!(flags, vec![true, false, false]);
    }
}

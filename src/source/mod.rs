//! Read-only view of the external linked-track data that vertex files are
//! correlated against
//!
//! The reconstruction library which produces linked tracks is reduced here to
//! what the matching logic needs: tracks made of segments, each segment
//! carrying an (event, plate, segment) identity. Storage formats plug in by
//! implementing `TrackSource`.

mod linked;

pub use self::linked::LinkedTracksFile;

use crate::{
    matchkey::{normalize_event, MatchKey},
    numeric::{Float, Vector2},
};

use eyre::{eyre, WrapErr};
use regex::Regex;
use thiserror::Error;

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// One plate-level observation of a linked track
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// MC event identifier (may carry sub-run offsets)
    pub event_id: i64,

    /// Plate on which the segment was observed
    pub plate_id: i32,

    /// Segment identifier on that plate
    pub segment_id: i32,

    /// Truth track identifier of the particle which left the segment
    pub mc_track_id: i32,

    /// Track slopes (tx, ty) at this segment
    pub slope: Vector2,
}
//
impl Segment {
    /// Key of this segment in the cross-dataset identity space
    pub fn key(&self) -> MatchKey {
        MatchKey::new(self.event_id, self.plate_id, self.segment_id)
    }
}

/// A linked track, as provided by an external track source
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateTrack {
    /// Identifier of the track within its source
    pub id: i32,

    /// Momentum stored alongside the track, if it was measured
    pub momentum: Option<Float>,

    /// Segments, ordered by plate
    pub segments: Vec<Segment>,
}
//
impl CandidateTrack {
    /// First segment of the track
    pub fn first_segment(&self) -> Option<&Segment> {
        self.segments.first()
    }

    /// Last segment of the track
    pub fn last_segment(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Number of plates spanned by the track
    pub fn npl(&self) -> i32 {
        match (self.first_segment(), self.last_segment()) {
            (Some(first), Some(last)) => (last.plate_id - first.plate_id).abs() + 1,
            _ => 0,
        }
    }

    /// Largest slope change between two consecutive segments
    pub fn max_angle_diff(&self) -> Float {
        self.segments
            .windows(2)
            .map(|pair| (pair[1].slope - pair[0].slope).norm())
            .fold(0., Float::max)
    }
}

/// Filter applied while reading a track source
///
/// Keeps the tracks owning at least one segment of the requested event, where
/// event ids are compared modulo the sub-run wraparound.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventFilter {
    event: i64,
}
//
impl EventFilter {
    /// Select the tracks of an event
    pub fn new(event_id: i64) -> Self {
        Self {
            event: normalize_event(event_id),
        }
    }

    /// Decide whether a track passes the filter
    pub fn keep(&self, track: &CandidateTrack) -> bool {
        track
            .segments
            .iter()
            .any(|segment| normalize_event(segment.event_id) == self.event)
    }
}

/// Reasons why a track source file cannot be used
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file could not be opened or read
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        /// Offending file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A line of the file could not be decoded
    #[error("{}, line {line}: malformed record", .path.display())]
    Malformed {
        /// Offending file
        path: PathBuf,
        /// Line number, starting at 1
        line: usize,
    },

    /// The file holds no track at all
    #[error("{} contains no track", .path.display())]
    Empty {
        /// Offending file
        path: PathBuf,
    },
}
//
impl SourceError {
    /// File which caused the error
    pub fn path(&self) -> &Path {
        match self {
            Self::Unreadable { path, .. } | Self::Malformed { path, .. } | Self::Empty { path } => {
                path
            }
        }
    }
}

/// Something which can provide the linked tracks stored at some location
pub trait TrackSource {
    /// Read the tracks stored at `path`, keeping those which pass `filter`
    ///
    /// A source holding no track at all, before filtering, is an error.
    ///
    fn read(
        &self,
        path: &Path,
        filter: Option<&EventFilter>,
    ) -> Result<Vec<CandidateTrack>, SourceError>;
}

/// Extract the event id embedded in a source path as `evt_<digits>_`
pub fn event_id_from_path(path: &Path) -> crate::Result<i64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"evt_(\d+)_").expect("Event id pattern is valid"));
    let path_str = path.to_string_lossy();
    let digits = pattern
        .captures(&path_str)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| eyre!("Couldn't extract an event id from {}", path.display()))?;
    digits
        .as_str()
        .parse::<i64>()
        .wrap_err_with(|| format!("Event id of {} is out of range", path.display()))
}

/// Track source files, indexed by the event id embedded in their path
#[derive(Clone, Debug, Default)]
pub struct SourceIndex {
    by_event: BTreeMap<i64, Vec<PathBuf>>,
}
//
impl SourceIndex {
    /// Index a list of paths
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> crate::Result<Self> {
        let mut index = Self::default();
        for path in paths {
            let event_id = event_id_from_path(&path)?;
            index.by_event.entry(event_id).or_default().push(path);
        }
        Ok(index)
    }

    /// Read a list file holding one source path per line, or die trying
    pub fn from_list_file(list_path: impl AsRef<Path>) -> crate::Result<Self> {
        let list_path = list_path.as_ref();
        let file = File::open(list_path)
            .wrap_err_with(|| format!("Failed to open list file {}", list_path.display()))?;
        let mut paths = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line
                .wrap_err_with(|| format!("Failed to read list file {}", list_path.display()))?;
            let line = line.trim();
            if !line.is_empty() {
                paths.push(PathBuf::from(line));
            }
        }
        Self::new(paths)
    }

    /// Source files whose embedded event id is exactly `event_id`
    pub fn files_for_event(&self, event_id: i64) -> &[PathBuf] {
        self.by_event
            .get(&event_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of indexed files
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    /// Truth that no file is indexed
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(event_id: i64, plate_id: i32, segment_id: i32, tx: Float) -> Segment {
        Segment {
            event_id,
            plate_id,
            segment_id,
            mc_track_id: 1,
            slope: Vector2::new(tx, 0.),
        }
    }

    #[test]
    fn test_event_id_from_path() {
        let path = Path::new("/data/run_00010/evt_21581_pl107_527/linked_tracks.txt");
        assert_eq!(event_id_from_path(path).unwrap(), 21581);
        assert!(event_id_from_path(Path::new("/data/linked_tracks.txt")).is_err());
        assert!(event_id_from_path(Path::new("/data/evt_12/linked_tracks.txt")).is_err());
    }

    #[test]
    fn test_source_index() {
        let index = SourceIndex::new(vec![
            PathBuf::from("a/evt_200_pl1/lt.txt"),
            PathBuf::from("b/evt_1000200_pl1/lt.txt"),
            PathBuf::from("c/evt_200_pl2/lt.txt"),
        ])
        .unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.files_for_event(200).len(), 2);
        assert_eq!(index.files_for_event(1_000_200).len(), 1);
        assert!(index.files_for_event(300).is_empty());
    }

    #[test]
    fn test_source_index_rejects_unnamed_files() {
        assert!(SourceIndex::new(vec![PathBuf::from("a/lt.txt")]).is_err());
    }

    #[test]
    fn test_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        std::fs::write(&list, "x/evt_5_pl1/lt.txt\n\n  y/evt_6_pl1/lt.txt  \n").unwrap();
        let index = SourceIndex::from_list_file(&list).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.files_for_event(6)[0], PathBuf::from("y/evt_6_pl1/lt.txt"));
        assert!(SourceIndex::from_list_file(dir.path().join("nope.txt")).is_err());
    }

    #[test]
    fn test_track_geometry() {
        let track = CandidateTrack {
            id: 0,
            momentum: None,
            segments: vec![
                segment(1, 3, 1, 0.),
                segment(1, 4, 1, 0.1),
                segment(1, 7, 1, 0.5),
            ],
        };
        assert_eq!(track.npl(), 5);
        approx::assert_relative_eq!(track.max_angle_diff(), 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_event_filter() {
        let track = CandidateTrack {
            id: 0,
            momentum: None,
            segments: vec![segment(100_450, 3, 1, 0.)],
        };
        assert!(EventFilter::new(450).keep(&track));
        assert!(EventFilter::new(2_000_450).keep(&track));
        assert!(!EventFilter::new(451).keep(&track));
    }
}

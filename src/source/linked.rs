//! Text dumps of linked tracks
//!
//! Each track is a `trk <track_id> <momentum>` line followed by one
//! `seg <event_id> <plate_id> <segment_id> <mc_track_id> <tx> <ty>` line per
//! segment. Blank lines and `#` comments are ignored, and an unmeasured
//! momentum is written as -999.

use super::{CandidateTrack, EventFilter, Segment, SourceError, TrackSource};
use crate::{
    fields::Fields,
    numeric::{float_from_text, Vector2},
};

use tracing::debug;

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Tag of track header lines
const TRACK_TAG: &str = "trk";

/// Tag of segment lines
const SEGMENT_TAG: &str = "seg";

/// Track source reading linked-track text dumps
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkedTracksFile;
//
impl LinkedTracksFile {
    /// Decode the contents of a linked-track dump
    ///
    /// `path` is only used for error reporting.
    ///
    pub fn parse_str(path: &Path, contents: &str) -> Result<Vec<CandidateTrack>, SourceError> {
        let malformed = |line: usize| SourceError::Malformed {
            path: path.to_owned(),
            line,
        };
        let mut tracks: Vec<CandidateTrack> = Vec::new();
        for (line_idx, line) in contents.lines().enumerate() {
            let line_num = line_idx + 1;
            let mut fields = Fields::new(line);
            match fields.next_str() {
                None => continue,
                Some(tag) if tag.starts_with('#') => continue,
                Some(TRACK_TAG) => {
                    let track = parse_track(&mut fields).ok_or_else(|| malformed(line_num))?;
                    tracks.push(track);
                }
                Some(SEGMENT_TAG) => {
                    // Segments cannot precede the first track header
                    let track = tracks.last_mut().ok_or_else(|| malformed(line_num))?;
                    let segment = parse_segment(&mut fields).ok_or_else(|| malformed(line_num))?;
                    track.segments.push(segment);
                }
                Some(_) => return Err(malformed(line_num)),
            }
        }
        if tracks.is_empty() {
            return Err(SourceError::Empty {
                path: path.to_owned(),
            });
        }
        Ok(tracks)
    }
}

impl TrackSource for LinkedTracksFile {
    fn read(
        &self,
        path: &Path,
        filter: Option<&EventFilter>,
    ) -> Result<Vec<CandidateTrack>, SourceError> {
        let contents = fs::read_to_string(path).map_err(|source| SourceError::Unreadable {
            path: PathBuf::from(path),
            source,
        })?;
        let mut tracks = Self::parse_str(path, &contents)?;
        let num_entries = tracks.len();
        if let Some(filter) = filter {
            tracks.retain(|track| filter.keep(track));
        }
        debug!(
            "{}: {} entries, {} kept",
            path.display(),
            num_entries,
            tracks.len()
        );
        Ok(tracks)
    }
}

/// Decode the fields of a track header
fn parse_track(fields: &mut Fields) -> Option<CandidateTrack> {
    let id = fields.next()?;
    let momentum = fields.next()?;
    Some(CandidateTrack {
        id,
        momentum: float_from_text(momentum),
        segments: Vec::new(),
    })
}

/// Decode the fields of a segment line
fn parse_segment(fields: &mut Fields) -> Option<Segment> {
    let event_id = fields.next()?;
    let plate_id = fields.next()?;
    let segment_id = fields.next()?;
    let mc_track_id = fields.next()?;
    let tx = fields.next()?;
    let ty = fields.next()?;
    Some(Segment {
        event_id,
        plate_id,
        segment_id,
        mc_track_id,
        slope: Vector2::new(tx, ty),
    })
}

//! This module defines the vertex and track records of a vertex file, and the
//! store which holds them during a run

use crate::{
    fields::Fields,
    matchkey::MatchKey,
    numeric::{float_from_text, float_to_text, int_from_text, int_to_text, Float, Vector2},
};

use eyre::WrapErr;
use tracing::{debug, info};

use std::{
    fmt::{self, Display},
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read, Write},
    path::Path,
};

/// Tag of vertex lines in a vertex file
pub const VERTEX_TAG: &str = "1ry_vtx";

/// Tag of track lines in a vertex file
pub const TRACK_TAG: &str = "1ry_trk";

/// A reconstructed primary-track stub associated with a vertex
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// MC event identifier (may carry a sub-run offset)
    pub event_id: i64,

    /// Plate on which the track starts
    pub plate_id: i32,

    /// Segment identifier on the first plate
    pub seg_id: i32,

    /// Transverse position of the first segment
    pub first_position: Vector2,

    /// Plate on which the track ends
    pub plate_id_last: i32,

    /// Number of plates spanned by the track
    pub npl: i32,

    /// Truth particle species, if known
    pub pdg_id: Option<i32>,

    /// Truth momentum, if known
    pub p_true: Option<Float>,

    /// Reconstructed momentum, if measured
    pub p_reco: Option<Float>,

    /// Index of the owning vertex (None if the track preceded every vertex)
    pub ivertex: Option<usize>,

    /// Truth-matching result (never serialized into vertex files)
    pub signal: bool,
}
//
impl Track {
    /// Key used to look this track up in other datasets
    pub fn key(&self) -> MatchKey {
        MatchKey::new(self.event_id, self.plate_id, self.seg_id)
    }

    /// Truth particle species, ignoring the charge sign
    pub fn abs_pdg(&self) -> Option<i32> {
        self.pdg_id.map(i32::abs)
    }

    /// Decode the fields that follow a track tag
    fn parse(fields: &mut Fields, ivertex: Option<usize>) -> Option<Self> {
        let plate_id = fields.next()?;
        let seg_id = fields.next()?;
        let x_first = fields.next()?;
        let y_first = fields.next()?;
        let plate_id_last = fields.next()?;
        let npl = fields.next()?;
        let pdg_id = fields.next()?;
        let p_true = fields.next()?;
        let p_reco = fields.next()?;
        let event_id = fields.next()?;
        Some(Self {
            event_id,
            plate_id,
            seg_id,
            first_position: Vector2::new(x_first, y_first),
            plate_id_last,
            npl,
            pdg_id: int_from_text(pdg_id),
            p_true: float_from_text(p_true),
            p_reco: float_from_text(p_reco),
            ivertex,
            signal: false,
        })
    }
}

impl Display for Track {
    /// Write down the track the way vertex files store it
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "{TRACK_TAG}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.plate_id,
            self.seg_id,
            self.first_position.x,
            self.first_position.y,
            self.plate_id_last,
            self.npl,
            int_to_text(self.pdg_id),
            float_to_text(self.p_true),
            float_to_text(self.p_reco),
            self.event_id,
        )
    }
}

/// A reconstructed interaction vertex
#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    /// Scanning area
    pub area_id: i32,

    /// Transverse vertex position
    pub position: Vector2,

    /// Plate of the vertex
    pub plate: i32,

    /// Stated number of tracks (actual membership comes from ivertex)
    pub ntrk: i32,

    /// Sequence index, in file order, starting at 0
    pub ivertex: usize,
}
//
impl Vertex {
    /// Decode the fields that follow a vertex tag
    fn parse(fields: &mut Fields, ivertex: usize) -> Option<Self> {
        let area_id = fields.next()?;
        let vx = fields.next()?;
        let vy = fields.next()?;
        let plate = fields.next()?;
        let ntrk = fields.next()?;
        Some(Self {
            area_id,
            position: Vector2::new(vx, vy),
            plate,
            ntrk,
            ivertex,
        })
    }
}

impl Display for Vertex {
    /// Write down the vertex the way vertex files store it
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "{VERTEX_TAG}\t{}\t{}\t{}\t{}\t{}",
            self.area_id, self.position.x, self.position.y, self.plate, self.ntrk,
        )
    }
}

/// In-memory contents of a vertex file
#[derive(Clone, Debug, Default)]
pub struct VertexTrackStore {
    /// Tracks, grouped by vertex once sort_by_vertex() has been called
    tracks: Vec<Track>,

    /// Vertices, in file order
    vertices: Vec<Vertex>,

    /// Number of lines which could not be decoded
    skipped_lines: usize,
}
//
impl VertexTrackStore {
    // ### CONSTRUCTION ###

    /// Read a vertex file or die trying
    pub fn parse(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("Failed to open vertex file {}", path.display()))?;
        let store = Self::parse_reader(file)
            .wrap_err_with(|| format!("Failed to read vertex file {}", path.display()))?;
        info!(
            "{}: {} vertices and {} tracks read, {} lines skipped",
            path.display(),
            store.vertices.len(),
            store.tracks.len(),
            store.skipped_lines()
        );
        Ok(store)
    }

    /// Decode vertex file contents
    ///
    /// Every track line belongs to the most recent vertex line above it. Lines
    /// which do not decode, including lines which are not valid UTF-8, are
    /// skipped. Tracks below a skipped vertex line have no owner, so they are
    /// never attributed to another vertex.
    ///
    pub fn parse_reader(reader: impl Read) -> std::io::Result<Self> {
        let mut store = Self::default();
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();
        let mut owner = None;
        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                break;
            }
            let Ok(line) = std::str::from_utf8(&buffer) else {
                debug!(
                    "Skipping non-UTF-8 line {:?}",
                    String::from_utf8_lossy(&buffer)
                );
                store.skipped_lines += 1;
                continue;
            };
            let mut fields = Fields::new(line);
            let parsed = match fields.next_str() {
                Some(VERTEX_TAG) => {
                    let vertex = Vertex::parse(&mut fields, store.vertices.len());
                    owner = vertex.as_ref().map(|vertex| vertex.ivertex);
                    vertex.map(|vertex| store.vertices.push(vertex))
                }
                Some(TRACK_TAG) => {
                    Track::parse(&mut fields, owner).map(|track| store.tracks.push(track))
                }
                _ => None,
            };
            if parsed.is_none() {
                debug!("Skipping malformed line {:?}", line.trim_end());
                store.skipped_lines += 1;
            }
        }
        Ok(store)
    }

    // ### ACCESSORS ###

    /// Vertices, in file order
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices[..]
    }

    /// All tracks, in their current order
    pub fn tracks(&self) -> &[Track] {
        &self.tracks[..]
    }

    /// Mutable access to all tracks
    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks[..]
    }

    /// Number of lines which were skipped while parsing
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    // ### GROUP LOOKUP ###

    /// Group tracks by vertex, preserving file order within each group
    ///
    /// Tracks which preceded every vertex line come first.
    ///
    pub fn sort_by_vertex(&mut self) {
        self.tracks.sort_by_key(|track| track.ivertex);
    }

    /// Tracks owned by a vertex (requires sort_by_vertex)
    pub fn tracks_for_vertex(&self, ivertex: usize) -> &[Track] {
        &self.tracks[self.group_range(Some(ivertex))]
    }

    /// Mutable tracks owned by a vertex (requires sort_by_vertex)
    pub fn tracks_for_vertex_mut(&mut self, ivertex: usize) -> &mut [Track] {
        let range = self.group_range(Some(ivertex));
        &mut self.tracks[range]
    }

    /// Tracks which preceded every vertex line (requires sort_by_vertex)
    pub fn orphan_tracks(&self) -> &[Track] {
        &self.tracks[self.group_range(None)]
    }

    /// Binary search for the bounds of a track group
    fn group_range(&self, ivertex: Option<usize>) -> std::ops::Range<usize> {
        debug_assert!(
            self.tracks.windows(2).all(|w| w[0].ivertex <= w[1].ivertex),
            "Tracks must be sorted by vertex before group lookup"
        );
        let lower = self.tracks.partition_point(|track| track.ivertex < ivertex);
        let upper = self.tracks.partition_point(|track| track.ivertex <= ivertex);
        lower..upper
    }

    // ### MUTATION ###

    /// Forget any momentum measurement read from the input
    pub fn reset_measurements(&mut self) {
        for track in &mut self.tracks {
            track.p_reco = None;
        }
    }

    // ### SERIALIZATION ###

    /// Write the store back to a vertex file
    pub fn serialize(&mut self, path: impl AsRef<Path>) -> crate::Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .wrap_err_with(|| format!("Failed to create vertex file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)
            .and_then(|()| writer.flush())
            .wrap_err_with(|| format!("Failed to write vertex file {}", path.display()))?;
        info!("{}: {} vertices written", path.display(), self.vertices.len());
        Ok(())
    }

    /// Write the store in vertex file format
    ///
    /// Tracks which had no vertex are written first, so that re-reading the
    /// output yields the same records.
    ///
    pub fn write_to(&mut self, writer: &mut impl Write) -> std::io::Result<()> {
        self.sort_by_vertex();
        for track in self.orphan_tracks() {
            writeln!(writer, "{}", track)?;
        }
        for vertex in &self.vertices {
            writeln!(writer, "{}", vertex)?;
            for track in self.tracks_for_vertex(vertex.ivertex) {
                writeln!(writer, "{}", track)?;
            }
        }
        Ok(())
    }
}

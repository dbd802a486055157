//! Monte-Carlo truth index: which linked tracks were left by the products of a
//! muon-neutrino interaction

use crate::{
    fields::Fields,
    matchkey::{normalize_event, EVENT_WRAP},
    source::CandidateTrack,
    Result,
};

use eyre::{eyre, WrapErr};
use tracing::{debug, info};

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    fs,
    path::Path,
};

/// PDG code of the muon neutrino
const PDG_NUMU: i32 = 14;

/// Index of truth track ids per event
///
/// Event ids are stored shifted by one sub-run wraparound, which is the
/// convention of the linked-track data that this index is queried with.
///
#[derive(Clone, Debug, Default)]
pub struct TruthManager {
    unique_ids: BTreeMap<i64, Vec<i32>>,
}
//
impl TruthManager {
    /// Build the index from a list file holding one truth table path per line
    ///
    /// If `read_hadrons` is set, the products of secondary interactions of
    /// the neutrino's daughters are registered too.
    ///
    pub fn from_list_file(list_path: impl AsRef<Path>, read_hadrons: bool) -> Result<Self> {
        let list_path = list_path.as_ref();
        let list = fs::read_to_string(list_path)
            .wrap_err_with(|| format!("Failed to open truth list {}", list_path.display()))?;
        let mut builder = TruthBuilder::new(read_hadrons);
        for path in list.lines().map(str::trim).filter(|line| !line.is_empty()) {
            builder.read_truth_file(path)?;
        }
        Ok(builder.build())
    }

    /// Truth that the first segment of a candidate was left by a registered
    /// truth track of its event
    pub fn is_track(&self, candidate: &CandidateTrack) -> bool {
        let Some(first) = candidate.first_segment() else {
            return false;
        };
        let found = self
            .unique_ids
            .get(&first.event_id)
            .is_some_and(|track_ids| track_ids.contains(&first.mc_track_id));
        if found {
            debug!(
                "Matching event id, track id: {}, {}",
                first.event_id, first.mc_track_id
            );
        }
        found
    }

    /// Truth that an event holds a registered interaction
    pub fn is_numu(&self, event_id: i64) -> bool {
        self.unique_ids.contains_key(&event_id)
    }

    /// Truth that the event of a vertex-file track holds a registered
    /// interaction
    ///
    /// Vertex files carry raw event ids, which are mapped to the linked-track
    /// convention of the index before lookup.
    ///
    pub fn is_numu_event(&self, raw_event_id: i64) -> bool {
        self.is_numu(normalize_event(raw_event_id) + EVENT_WRAP)
    }

    /// Registered event ids, in increasing order
    pub fn events(&self) -> impl Iterator<Item = i64> + '_ {
        self.unique_ids.keys().copied()
    }

    /// Number of registered events
    pub fn len(&self) -> usize {
        self.unique_ids.len()
    }

    /// Truth that no event is registered
    pub fn is_empty(&self) -> bool {
        self.unique_ids.is_empty()
    }
}

impl Display for TruthManager {
    /// Dump the registered track ids of each event
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (event_id, track_ids) in &self.unique_ids {
            write!(fmt, "Event ID:{}\tTrack ID:", event_id)?;
            for track_id in track_ids {
                write!(fmt, " {}", track_id)?;
            }
            writeln!(fmt)?;
        }
        Ok(())
    }
}

/// Accumulates truth tables into a TruthManager
pub struct TruthBuilder {
    read_hadrons: bool,
    unique_ids: BTreeMap<i64, Vec<i32>>,
}
//
impl TruthBuilder {
    /// Start with an empty index
    pub fn new(read_hadrons: bool) -> Self {
        Self {
            read_hadrons,
            unique_ids: BTreeMap::new(),
        }
    }

    /// Register the entries of a truth table file
    pub fn read_truth_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Read {}", path.display());
        if self.read_hadrons {
            info!("2ry particles are also read.");
        }
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read truth table {}", path.display()))?;
        self.read_truth_str(&contents)
            .wrap_err_with(|| format!("Invalid truth table {}", path.display()))?;
        info!("{} events are read.", self.unique_ids.len());
        Ok(())
    }

    /// Register truth table rows
    ///
    /// Each row reads `<event_id> <pdg_id> <pdg_in_list> <track_id_out_list>`,
    /// where lists are comma-separated and `-` stands for an empty list.
    ///
    pub fn read_truth_str(&mut self, contents: &str) -> Result<()> {
        for (line_idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let row = TruthRow::parse(line)
                .ok_or_else(|| eyre!("Malformed truth row at line {}", line_idx + 1))?;

            // Select the neutrino interaction itself, and optionally the
            // interactions of its direct products
            let from_numu = row.pdg_in.iter().any(|pdg| pdg.abs() == PDG_NUMU);
            if row.pdg_id.abs() == PDG_NUMU || (self.read_hadrons && from_numu) {
                self.unique_ids
                    .entry(row.event_id + EVENT_WRAP)
                    .or_default()
                    .extend(row.track_ids_out);
            }
        }
        Ok(())
    }

    /// Freeze the index
    pub fn build(self) -> TruthManager {
        TruthManager {
            unique_ids: self.unique_ids,
        }
    }
}

/// One row of a truth table
struct TruthRow {
    event_id: i64,
    pdg_id: i32,
    pdg_in: Vec<i32>,
    track_ids_out: Vec<i32>,
}
//
impl TruthRow {
    /// Decode a row
    fn parse(line: &str) -> Option<Self> {
        let mut fields = Fields::new(line);
        let event_id = fields.next()?;
        let pdg_id = fields.next()?;
        let pdg_in = parse_list(fields.next_str()?)?;
        let track_ids_out = parse_list(fields.next_str()?)?;
        Some(Self {
            event_id,
            pdg_id,
            pdg_in,
            track_ids_out,
        })
    }
}

/// Decode a comma-separated list of integers, where `-` is the empty list
fn parse_list(field: &str) -> Option<Vec<i32>> {
    if field == "-" {
        return Some(Vec::new());
    }
    field.split(',').map(|item| item.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{numeric::Vector2, source::Segment};

    const TABLE: &str = "\
# event pdg pdg_in track_ids_out
12 14 - 1,2,3
12 211 14 7,8
13 -14 - 4
14 12 - 5
15 2212 14,-14 9
";

    fn candidate(event_id: i64, mc_track_id: i32) -> CandidateTrack {
        CandidateTrack {
            id: 0,
            momentum: None,
            segments: vec![Segment {
                event_id,
                plate_id: 1,
                segment_id: 1,
                mc_track_id,
                slope: Vector2::zeros(),
            }],
        }
    }

    fn manager(read_hadrons: bool) -> TruthManager {
        let mut builder = TruthBuilder::new(read_hadrons);
        builder.read_truth_str(TABLE).unwrap();
        builder.build()
    }

    #[test]
    fn test_primary_only() {
        let truth = manager(false);
        assert_eq!(truth.len(), 2);
        assert_eq!(truth.events().collect::<Vec<_>>(), vec![100_012, 100_013]);
        assert!(truth.is_numu(100_012));
        assert!(truth.is_numu(100_013));
        assert!(!truth.is_numu(100_014));
        assert!(!truth.is_numu(12));
        assert!(truth.is_track(&candidate(100_012, 2)));
        assert!(!truth.is_track(&candidate(100_012, 7)));
        assert!(!truth.is_track(&candidate(12, 2)));
    }

    #[test]
    fn test_vertex_event_lookup() {
        let truth = manager(false);
        assert!(truth.is_numu_event(12));
        assert!(truth.is_numu_event(100_013));
        assert!(truth.is_numu_event(2_000_012));
        assert!(!truth.is_numu_event(14));
    }

    #[test]
    fn test_with_hadrons() {
        let truth = manager(true);
        assert_eq!(truth.len(), 3);
        assert!(truth.is_track(&candidate(100_012, 7)));
        assert!(truth.is_track(&candidate(100_015, 9)));
        assert!(!truth.is_numu(100_014));
    }

    #[test]
    fn test_empty_candidate() {
        let truth = manager(false);
        let empty = CandidateTrack {
            id: 0,
            momentum: None,
            segments: Vec::new(),
        };
        assert!(!truth.is_track(&empty));
    }

    #[test]
    fn test_malformed_row() {
        let mut builder = TruthBuilder::new(false);
        assert!(builder.read_truth_str("12 14 - 1,x\n").is_err());
        assert!(builder.read_truth_str("12 14\n").is_err());
    }

    #[test]
    fn test_dump() {
        let dump = manager(false).to_string();
        assert_eq!(dump, "Event ID:100012\tTrack ID: 1 2 3\nEvent ID:100013\tTrack ID: 4\n");
    }

    #[test]
    fn test_from_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("truth.txt");
        fs::write(&table, TABLE).unwrap();
        let list = dir.path().join("list.txt");
        fs::write(&list, format!("{}\n", table.display())).unwrap();
        let truth = TruthManager::from_list_file(&list, false).unwrap();
        assert_eq!(truth.len(), 2);
        assert!(TruthManager::from_list_file(dir.path().join("nope"), false).is_err());
    }
}

//! fnu_vertex: vertex/track correlation for emulsion neutrino analyses
//!
//!
//! # Introduction (for the physicist)
//!
//! The emulsion detector records charged particles as segments on a stack of
//! plates. The vertex reconstruction writes out, for each neutrino
//! interaction candidate, a vertex and the stubs of its primary tracks. This
//! program enriches those stubs with information which lives elsewhere: the
//! momentum measured on the full linked track, or whether the track was left
//! by a product of the simulated muon-neutrino interaction.
//!
//!
//! # Introduction (for the numerical guy)
//!
//! There is very little arithmetic here. The work is a join between a vertex
//! file and a set of linked track files, keyed on (event, plate, segment),
//! where the event ids of the two sides disagree by known offsets.
//!
//!
//! # Introduction (for the computer guy)
//!
//! Every command follows the same batch pipeline:
//!
//! * read in the vertex file and the parameters
//! * index the external track files by the event id embedded in their name
//! * for each vertex,
//!     * look up the files which may hold its event,
//!     * find the linked track behind each of its primary tracks,
//!     * update the track record from it
//! * then write the enriched vertex file or a report.
//!
//! The external reconstruction and momentum measurement are hidden behind the
//! `TrackSource` and `MomentumEstimator` traits.

#![warn(missing_docs)]

mod config;
mod correlator;
mod fields;
mod investigate;
mod matcher;
mod matchkey;
mod numeric;
mod output;
mod ratio;
mod selection;
mod source;
mod truth;
mod vertex;

use crate::{
    config::MeasurementConfig,
    correlator::Correlator,
    matcher::StoredMomentum,
    matchkey::OffsetPolicy,
    numeric::Float,
    ratio::DEFAULT_THRESHOLD,
    selection::FakeHadronCut,
    source::{LinkedTracksFile, SourceIndex},
    truth::TruthManager,
    vertex::VertexTrackStore,
};

use clap::{Args, Parser, Subcommand};
use eyre::WrapErr;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

/// We'll use eyre's type-erased result type throughout the application
type Result<T> = eyre::Result<T>;

/// Command-line interface
#[derive(Parser, Debug)]
#[command(name = "fnu_vertex")]
#[command(about = "Vertex/track correlation for emulsion neutrino analyses", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Analysis programs
#[derive(Subcommand, Debug)]
enum Command {
    /// Measure the momentum of every vertex track
    Momentum {
        /// Input vertex file
        #[arg(short = 'V', long)]
        vertices: PathBuf,

        /// List of linked track files
        #[arg(short = 'I', long)]
        input_list: PathBuf,

        /// Output vertex file
        #[arg(short = 'O', long)]
        output: PathBuf,

        /// Measurement parameter file
        #[arg(short = 'P', long)]
        parameters: Option<PathBuf>,

        /// Also refresh the last plate and plate count of matched tracks
        #[arg(long)]
        update_extent: bool,

        #[command(flatten)]
        offsets: OffsetArgs,
    },

    /// Flag the vertex tracks left by the products of the neutrino interaction
    Truth {
        /// Input vertex file
        #[arg(short = 'V', long)]
        vertices: PathBuf,

        /// List of linked track files
        #[arg(short = 'I', long)]
        input_list: PathBuf,

        /// List of truth tables
        #[arg(short = 'T', long)]
        truth_list: PathBuf,

        /// Output report
        #[arg(short = 'O', long)]
        output: PathBuf,

        /// Also register the products of secondary interactions
        #[arg(long)]
        hadrons: bool,

        #[command(flatten)]
        offsets: OffsetArgs,
    },

    /// Compare truth and reconstructed momenta with respect to a threshold
    Ratio {
        /// Measured vertex file
        #[arg(short = 'V', long)]
        vertices: PathBuf,

        /// Output report
        #[arg(short = 'O', long)]
        output: PathBuf,

        /// Momentum threshold (GeV)
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: Float,
    },

    /// Select the tracks which could fake a high-momentum hadron
    FakeHadron {
        /// Measured vertex file
        #[arg(short = 'V', long)]
        vertices: PathBuf,

        /// Output track list
        #[arg(short = 'O', long)]
        output: PathBuf,

        /// Minimal reconstructed momentum (GeV)
        #[arg(long, default_value_t = FakeHadronCut::default().p_min)]
        p_min: Float,

        /// Minimal distance of the track start from the plate origin
        #[arg(long, default_value_t = FakeHadronCut::default().r_min)]
        r_min: Float,

        /// Minimal number of plates spanned
        #[arg(long, default_value_t = FakeHadronCut::default().min_npl)]
        min_npl: i32,
    },

    /// List the tracks which only pass the momentum selection when measured
    /// over a long plate range
    Investigate {
        /// Vertex file measured over a short plate range
        #[arg(short = 'S', long)]
        short: PathBuf,

        /// Vertex file measured over a long plate range
        #[arg(short = 'L', long)]
        long: PathBuf,
    },
}

/// Event id offsets to probe when looking for linked track files
#[derive(Args, Debug)]
struct OffsetArgs {
    /// Extra event id offset (repeatable)
    #[arg(long = "offset", allow_hyphen_values = true)]
    offsets: Vec<i64>,

    /// Probe the offsets of multi-file productions
    #[arg(long)]
    sub_runs: bool,
}
//
impl OffsetArgs {
    /// Build the offset policy
    fn policy(&self) -> OffsetPolicy {
        let base = if self.sub_runs {
            OffsetPolicy::sub_runs()
        } else {
            OffsetPolicy::default()
        };
        base.with_offsets(self.offsets.iter().copied())
    }
}

/// Index the linked track files of a list file
fn load_index(list_path: &Path) -> Result<SourceIndex> {
    let index = SourceIndex::from_list_file(list_path)?;
    if index.is_empty() {
        warn!("{} lists no linked track file", list_path.display());
    } else {
        info!("{} linked track files indexed", index.len());
    }
    Ok(index)
}

/// This will act as our main function, with suitable error handling
fn main() -> Result<()> {
    let cli = Cli::parse();

    // ### LOGGING SETUP ###

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("Failed to set up logging")?;

    // ### COMMAND EXECUTION ###

    // Timing starts after argument parsing, but includes all file I/O since
    // that is most of what these programs do
    let saved_time = Instant::now();
    match cli.command {
        Command::Momentum {
            vertices,
            input_list,
            output,
            parameters,
            update_extent,
            offsets,
        } => {
            let config = match parameters {
                Some(path) => MeasurementConfig::load(path)
                    .wrap_err("Failed to load the measurement parameters")?,
                None => MeasurementConfig::default(),
            };
            let mut store = VertexTrackStore::parse(&vertices)?;
            store.reset_measurements();
            let index = load_index(&input_list)?;

            let policy = offsets.policy();
            let correlator = Correlator::new(&LinkedTracksFile, &index, &policy);
            let estimator = StoredMomentum::new(config);
            let summary = correlator.measure_momenta(&mut store, &estimator, update_extent);

            store
                .serialize(&output)
                .wrap_err("Failed to output the measured vertices")?;
            summary.print();
        }

        Command::Truth {
            vertices,
            input_list,
            truth_list,
            output,
            hadrons,
            offsets,
        } => {
            let truth = TruthManager::from_list_file(&truth_list, hadrons)
                .wrap_err("Failed to load the truth tables")?;
            if truth.is_empty() {
                warn!("No neutrino event registered, no track will be flagged");
            } else {
                info!("{} neutrino events registered", truth.len());
                debug!("Registered events: {:?}", truth.events().collect::<Vec<_>>());
                debug!("Registered truth tracks:\n{}", truth);
            }
            let mut store = VertexTrackStore::parse(&vertices)?;
            let index = load_index(&input_list)?;

            let policy = offsets.policy();
            let correlator = Correlator::new(&LinkedTracksFile, &index, &policy);
            let summary = correlator.flag_signal(&mut store, &truth);

            let num_signal = output::dump_truth_report(&output, &mut store, &truth)
                .wrap_err("Failed to output the truth report")?;
            summary.print();
            println!("Signal tracks        : {}", num_signal);
        }

        Command::Ratio {
            vertices,
            output,
            threshold,
        } => {
            let mut store = VertexTrackStore::parse(&vertices)?;
            let acc = output::dump_ratio_report(&output, &mut store, threshold)
                .wrap_err("Failed to output the momentum report")?;
            println!("Number of events     : {}", store.vertices().len());
            println!("Events with tracks   : {}", acc.num_events);
            println!("Skipped events       : {}", acc.skipped_events);
        }

        Command::FakeHadron {
            vertices,
            output,
            p_min,
            r_min,
            min_npl,
        } => {
            let store = VertexTrackStore::parse(&vertices)?;
            let cut = FakeHadronCut::new(p_min, r_min, min_npl);
            let num_selected = output::dump_selected_tracks(&output, &store, &cut)
                .wrap_err("Failed to output the selected tracks")?;
            println!("Selected tracks      : {}", num_selected);
        }

        Command::Investigate { short, long } => {
            let short = VertexTrackStore::parse(&short)?;
            let long = VertexTrackStore::parse(&long)?;
            let result = investigate::investigate(&short, &long);
            for (short_track, long_track) in &result.pairs {
                println!("short: {}", short_track);
                println!("long:  {}", long_track);
            }
            println!("Number of all events: {}", result.num_events);
        }
    }

    // ...and we're done
    info!("Elapsed time: {:?}", saved_time.elapsed());
    Ok(())
}

//! This module is in charge of writing the reports of the analysis programs to
//! disk

use crate::{
    numeric::{float_to_text, int_to_text, Float},
    ratio::{Contingency, RatioAccumulator},
    selection::FakeHadronCut,
    truth::TruthManager,
    vertex::VertexTrackStore,
};

use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use std::{
    fs::File,
    io::{self, BufWriter, Result, Write},
    path::Path,
};

/// Number of significant digits of ratios in reports
const SIG_DIGITS: usize = 6;

/// Separator between the per-event blocks of reports
const EVENT_SEPARATOR: &str =
    "======================================================================";

/// Write the truth vs reconstructed momentum report of a vertex file
///
/// Each vertex's tracks are listed, then the contingency tables of events
/// with respect to the momentum threshold are written in Markdown form.
///
pub fn dump_ratio_report(
    path: &Path,
    store: &mut VertexTrackStore,
    threshold: Float,
) -> Result<RatioAccumulator> {
    let mut file = BufWriter::new(File::create(path)?);
    let file = &mut file;
    writeln!(file, "{}", timestamp()?)?;

    // Dump the tracks of each event, integrating them as we go
    let mut acc = RatioAccumulator::new(threshold);
    store.sort_by_vertex();
    for vertex in store.vertices() {
        let group = store.tracks_for_vertex(vertex.ivertex);
        let Some(first) = group.first() else {
            continue;
        };
        writeln!(file, "Event ID: {}", first.event_id)?;
        for track in group {
            writeln!(
                file,
                "PDG: {}\tNpl: {}\tP_true: {}\tP_rec: {}",
                int_to_text(track.pdg_id),
                track.npl,
                float_to_text(track.p_true),
                float_to_text(track.p_reco),
            )?;
        }
        if !acc.integrate(group) {
            writeln!(file, "(skipped: unmeasured track)")?;
        }
        writeln!(file, "{}", EVENT_SEPARATOR)?;
    }
    writeln!(file)?;
    writeln!(file)?;

    // Summarize the event counts
    writeln!(file, "Number of events: {}", store.vertices().len())?;
    writeln!(file, "Events with tracks: {}", acc.num_events)?;
    writeln!(file, "Skipped events: {}", acc.skipped_events)?;
    writeln!(
        file,
        "Events with at least one track with p_true > {} GeV: {}",
        threshold,
        acc.all.true_over()
    )?;
    writeln!(
        file,
        "Events whose tracks all have p_true < {} GeV: {}",
        threshold,
        acc.all.true_under()
    )?;
    writeln!(file)?;
    writeln!(file)?;

    write_contingency(file, &acc.all, threshold)?;
    writeln!(file)?;
    writeln!(file)?;
    writeln!(file, "Only muon tracks.")?;
    write_contingency(file, &acc.muons, threshold)?;

    file.flush()?;
    Ok(acc)
}

/// Write the truth-matching report of a vertex file
///
/// Each vertex is listed with its event id and whether that event holds a
/// registered neutrino interaction, followed by its tracks and their signal
/// flag. Returns the number of signal tracks.
///
pub fn dump_truth_report(
    path: &Path,
    store: &mut VertexTrackStore,
    truth: &TruthManager,
) -> Result<usize> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "# {}", timestamp()?)?;
    writeln!(file, "# vtx ivertex event_id numu")?;
    writeln!(file, "# trk plate_id seg_id pdg_id signal")?;

    let mut num_signal = 0;
    store.sort_by_vertex();
    for vertex in store.vertices() {
        let group = store.tracks_for_vertex(vertex.ivertex);
        let event_id = group.first().map(|track| track.event_id);
        let numu = event_id.is_some_and(|event_id| truth.is_numu_event(event_id));
        match event_id {
            Some(event_id) => writeln!(
                file,
                "vtx\t{}\t{}\t{}",
                vertex.ivertex,
                event_id,
                u8::from(numu)
            )?,
            None => writeln!(file, "vtx\t{}\t-\t0", vertex.ivertex)?,
        }
        for track in group {
            writeln!(
                file,
                "trk\t{}\t{}\t{}\t{}",
                track.plate_id,
                track.seg_id,
                int_to_text(track.pdg_id),
                u8::from(track.signal)
            )?;
            num_signal += usize::from(track.signal);
        }
    }
    writeln!(
        file,
        "# signal tracks: {} / {}",
        num_signal,
        store.tracks().len()
    )?;

    file.flush()?;
    Ok(num_signal)
}

/// Write the tracks passing the fake hadron cut, in vertex file format
///
/// Returns the number of selected tracks.
///
pub fn dump_selected_tracks(
    path: &Path,
    store: &VertexTrackStore,
    cut: &FakeHadronCut,
) -> Result<usize> {
    let mut file = BufWriter::new(File::create(path)?);
    let mut num_selected = 0;
    for track in store.tracks().iter().filter(|track| cut.keep(track)) {
        writeln!(file, "{}", track)?;
        num_selected += 1;
    }
    file.flush()?;
    Ok(num_selected)
}

/// Write a contingency table as Markdown
fn write_contingency(
    writer: &mut impl Write,
    table: &Contingency,
    threshold: Float,
) -> Result<()> {
    let true_over = table.true_over();
    let true_under = table.true_under();
    writeln!(writer, "| | P_rec > {0} | P_rec < {0} |", threshold)?;
    writeln!(writer, "| --- | --- | --- |")?;

    write!(writer, "| P_true > {} | ", threshold)?;
    write_fraction(writer, table.true_over_reco_over, true_over)?;
    write!(writer, " | ")?;
    write_fraction(writer, table.true_over_reco_under, true_over)?;
    writeln!(writer, " |")?;

    write!(writer, "| P_true < {} | ", threshold)?;
    write_fraction(writer, table.true_under_reco_over, true_under)?;
    write!(writer, " | ")?;
    write_fraction(writer, table.true_under_reco_under, true_under)?;
    writeln!(writer, " |")
}

/// Write a count ratio as "num/den=value"
fn write_fraction(writer: &mut impl Write, num: usize, den: usize) -> Result<()> {
    write!(writer, "{}/{}=", num, den)?;
    write_engineering(writer, num as Float / den as Float, SIG_DIGITS)
}

/// Timestamp of the current time
fn timestamp() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// Write a floating-point number using "engineering" notation
///
/// Analogous to the %g format of the C printf function, this method switches
/// between naive and scientific notation for floating-point numbers when the
/// number being printed becomes so small that printing leading zeroes could end
/// up larger than the scientific notation, or so large that we would be forced
/// to print more significant digits than requested.
///
fn write_engineering(writer: &mut impl Write, x: Float, sig_digits: usize) -> Result<()> {
    let mut precision = sig_digits - 1;
    if x.is_nan() {
        // 0/0 ratios are expected for empty tables
        write!(writer, "nan")
    } else if x == 0. {
        // Zero is special because you can't take its log
        write!(writer, "0")
    } else {
        // Otherwise, use log to evaluate order of magnitude
        let log_x = x.abs().log10();
        if log_x >= -3. && log_x < (sig_digits as Float) {
            // Print using naive notation
            //
            // Since Rust's precision controls number of digits after the
            // decimal point, we must adjust it depending on magnitude in order
            // to operate at a constant number of significant digits.
            precision = (precision as isize - log_x.trunc() as isize) as usize;

            // Numbers smaller than 1 must get one extra digit since the leading
            // zero does not count as a significant digit.
            if log_x < 0. {
                precision += 1
            }

            // People don't normally expect trailing zeros or decimal point in
            // naive notation, but be careful with integer numbers...
            let str_with_zeros = format!("{:.1$}", x, precision);
            if str_with_zeros.contains('.') {
                write!(
                    writer,
                    "{}",
                    str_with_zeros.trim_end_matches('0').trim_end_matches('.')
                )
            } else {
                write!(writer, "{}", str_with_zeros)
            }
        } else {
            // Print using scientific notation
            write!(writer, "{:.1$e}", x, precision)
        }
    }
}

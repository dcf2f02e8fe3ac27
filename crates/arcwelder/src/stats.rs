//! Run statistics, periodic progress records, and the weld result.

use std::fmt;

use serde::Serialize;

/// Upper bin edges for the segment length histograms, in millimeters.
/// Lengths above the last edge land in the overflow bucket.
pub const SEGMENT_BIN_EDGES: [f64; 9] = [0.002, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0];

/// Segment length histogram with an overflow bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentHistogram {
    /// One count per edge in [`SEGMENT_BIN_EDGES`] plus the overflow bucket.
    pub counts: [u64; 10],
}

impl SegmentHistogram {
    /// Records one segment length.
    pub fn record(&mut self, length_mm: f64) {
        let index = SEGMENT_BIN_EDGES
            .iter()
            .position(|edge| length_mm <= *edge)
            .unwrap_or(SEGMENT_BIN_EDGES.len());
        if let Some(count) = self.counts.get_mut(index) {
            *count += 1;
        }
    }

    /// Total recorded segments.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Travel and extrusion histograms for one side of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentStatistics {
    /// Lengths of extruding (or retracting) segments.
    pub extrusion: SegmentHistogram,
    /// Lengths of travel segments.
    pub travel: SegmentHistogram,
}

impl SegmentStatistics {
    /// Records one segment on this side.
    pub fn record(&mut self, length_mm: f64, is_extrusion: bool) {
        if is_extrusion {
            self.extrusion.record(length_mm);
        } else {
            self.travel.record(length_mm);
        }
    }
}

impl fmt::Display for SegmentStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>12}  {:>10}  {:>10}", "length (mm)", "extrusion", "travel")?;
        for (index, edge) in SEGMENT_BIN_EDGES.iter().enumerate() {
            let extrusion = self.extrusion.counts.get(index).copied().unwrap_or(0);
            let travel = self.travel.counts.get(index).copied().unwrap_or(0);
            if extrusion == 0 && travel == 0 {
                continue;
            }
            writeln!(f, "{:>12}  {extrusion:>10}  {travel:>10}", format!("<= {edge}"))?;
        }
        let last = SEGMENT_BIN_EDGES.len();
        let extrusion = self.extrusion.counts.get(last).copied().unwrap_or(0);
        let travel = self.travel.counts.get(last).copied().unwrap_or(0);
        if extrusion > 0 || travel > 0 {
            writeln!(f, "{:>12}  {extrusion:>10}  {travel:>10}", "above")?;
        }
        Ok(())
    }
}

/// A periodic progress snapshot passed to the progress callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Progress {
    /// Percent of source bytes consumed, 0 to 100.
    pub percent_complete: f64,
    /// Seconds since the run started.
    pub seconds_elapsed: f64,
    /// Linear estimate of seconds remaining.
    pub seconds_remaining: f64,
    /// Commands processed so far.
    pub gcodes_processed: u64,
    /// Source lines processed so far.
    pub lines_processed: u64,
    /// Linear moves subsumed into arcs so far.
    pub points_compressed: u64,
    /// Arcs emitted so far.
    pub arcs_created: u64,
    /// Source size in bytes, zero when unknown.
    pub source_file_size: u64,
    /// Bytes written so far.
    pub target_file_size: u64,
}

impl Progress {
    /// Source-to-target size ratio, zero until bytes have been written.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compression_ratio(&self) -> f64 {
        if self.target_file_size == 0 {
            0.0
        } else {
            let consumed = self.source_file_size as f64 * self.percent_complete / 100.0;
            consumed / self.target_file_size as f64
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}% complete, {:.2}s elapsed, {:.2}s remaining, lines: {}, gcodes: {}, \
             points compressed: {}, arcs created: {}, compression: {:.2}x",
            self.percent_complete,
            self.seconds_elapsed,
            self.seconds_remaining,
            self.lines_processed,
            self.gcodes_processed,
            self.points_compressed,
            self.arcs_created,
            self.compression_ratio(),
        )
    }
}

/// Counters accumulated over one welding run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Statistics {
    /// Source lines processed.
    pub lines_processed: u64,
    /// Commands processed.
    pub gcodes_processed: u64,
    /// Lines the tokenizer could not parse, forwarded verbatim.
    pub parse_warnings: u64,
    /// Linear moves subsumed into arcs.
    pub points_compressed: u64,
    /// Arcs emitted.
    pub arcs_created: u64,
    /// Source bytes consumed.
    pub bytes_read: u64,
    /// Target bytes written.
    pub bytes_written: u64,
    /// Source-side segment histograms.
    pub source_segments: SegmentStatistics,
    /// Target-side segment histograms.
    pub target_segments: SegmentStatistics,
}

impl Statistics {
    /// Snapshot of the counters as a [`Progress`] record.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(
        &self,
        source_size: u64,
        seconds_elapsed: f64,
    ) -> Progress {
        let percent_complete = if source_size == 0 {
            0.0
        } else {
            (self.bytes_read as f64 / source_size as f64 * 100.0).min(100.0)
        };
        let seconds_remaining = if percent_complete > 0.0 {
            seconds_elapsed * (100.0 - percent_complete) / percent_complete
        } else {
            0.0
        };
        Progress {
            percent_complete,
            seconds_elapsed,
            seconds_remaining,
            gcodes_processed: self.gcodes_processed,
            lines_processed: self.lines_processed,
            points_compressed: self.points_compressed,
            arcs_created: self.arcs_created,
            source_file_size: source_size,
            target_file_size: self.bytes_written,
        }
    }
}

/// Outcome of [`crate::welder::Welder::process`].
#[derive(Debug, Clone, Serialize)]
pub struct WeldResult {
    /// Whether the run completed normally.
    pub success: bool,
    /// Whether the progress callback requested cancellation.
    pub cancelled: bool,
    /// Human-readable completion or cancellation message.
    pub message: String,
    /// Final progress snapshot.
    pub progress: Progress,
    /// Final counters, histograms included.
    pub statistics: Statistics,
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn ut_sts_001_histogram_bins_by_upper_edge() {
        let mut histogram = SegmentHistogram::default();
        histogram.record(0.001);
        histogram.record(0.002);
        histogram.record(0.003);
        histogram.record(20.0);
        assert_eq!(histogram.counts[0], 2, "0.002 falls in the first bin");
        assert_eq!(histogram.counts[1], 1);
        assert_eq!(histogram.counts[9], 1, "overflow bucket");
        assert_eq!(histogram.total(), 4);
    }

    #[test]
    fn ut_sts_002_progress_estimates_remaining_linearly() {
        let stats = Statistics {
            bytes_read: 250,
            ..Statistics::default()
        };
        let progress = stats.progress(1000, 10.0);
        assert!((progress.percent_complete - 25.0).abs() < 1e-9);
        assert!((progress.seconds_remaining - 30.0).abs() < 1e-9);
    }

    #[test]
    fn ut_sts_003_progress_with_unknown_size_reports_zero_percent() {
        let stats = Statistics {
            bytes_read: 250,
            ..Statistics::default()
        };
        let progress = stats.progress(0, 10.0);
        assert!((progress.percent_complete).abs() < f64::EPSILON);
        assert!((progress.seconds_remaining).abs() < f64::EPSILON);
    }

    #[test]
    fn ut_sts_005_segment_table_skips_empty_bins() {
        let mut stats = SegmentStatistics::default();
        stats.record(0.5, true);
        stats.record(0.5, true);
        stats.record(50.0, false);
        let table = stats.to_string();
        assert!(table.contains("<= 0.5"));
        assert!(table.contains("above"));
        assert!(!table.contains("<= 0.002"), "empty bins are omitted");
    }

    #[test]
    fn ut_sts_004_display_is_one_line() {
        let progress = Progress {
            percent_complete: 50.0,
            seconds_elapsed: 1.0,
            seconds_remaining: 1.0,
            lines_processed: 10,
            ..Progress::default()
        };
        let text = progress.to_string();
        assert!(text.contains("50.00% complete"));
        assert!(!text.contains('\n'));
    }
}

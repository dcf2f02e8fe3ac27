//! The streaming welder: classifies each source line, extends the candidate
//! arc, and decides when to commit an arc versus flush the buffered moves.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::time::Instant;

use log::{debug, warn};

use crate::config::WelderConfig;
use crate::emitter::{Emitter, EmittedE};
use crate::error::{ConfigError, WeldError};
use crate::fitter::{AddResult, ArcFitter};
use crate::gcode::{fractional_digits, parse_line, GcodeCommand, PositionTracker};
use crate::geometry::{approx_equal, approx_zero, Point};
use crate::stats::{Progress, Statistics, WeldResult};

/// Progress callback: invoked periodically; return `false` to cancel.
pub type ProgressCallback<'a> = Box<dyn FnMut(&Progress) -> bool + 'a>;

/// Sign of a filament delta: -1 retracting, 0 travel, 1 extruding.
fn extrusion_sign(e_relative: f64) -> i8 {
    if approx_zero(e_relative) {
        0
    } else if e_relative > 0.0 {
        1
    } else {
        -1
    }
}

/// A buffered source line awaiting an arc commit or a flush.
///
/// One entry per non-anchor point in the fitter; `visible_e` is the
/// gcode-visible E after the move, used to keep the output-side extruder
/// bookkeeping exact when the window slides. `comment` is the line's own
/// trailing comment, carried onto the arc that absorbs it.
#[derive(Debug, Clone)]
struct UnwrittenCommand {
    text: String,
    xy_length: f64,
    is_extrusion: bool,
    visible_e: f64,
    comment: Option<String>,
}

/// Compresses runs of short linear moves into arc commands.
///
/// Reusable across runs; all per-run state lives in [`Welder::process`].
pub struct Welder<'cb> {
    config: WelderConfig,
    source_size: u64,
    on_progress: Option<ProgressCallback<'cb>>,
}

impl std::fmt::Debug for Welder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Welder")
            .field("config", &self.config)
            .field("source_size", &self.source_size)
            .finish_non_exhaustive()
    }
}

impl<'cb> Welder<'cb> {
    /// Creates a welder, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid option combination.
    pub fn new(config: WelderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            source_size: 0,
            on_progress: None,
        })
    }

    /// Sets the source size in bytes, enabling percent-complete reporting.
    #[must_use]
    pub fn with_source_size(mut self, bytes: u64) -> Self {
        self.source_size = bytes;
        self
    }

    /// Installs a progress callback. Returning `false` cancels the run.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback<'cb>) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Runs the welder over `source`, writing the transformed program to
    /// `target`.
    ///
    /// # Errors
    ///
    /// Returns [`WeldError::Io`] when the source is unreadable or the target
    /// unwritable. Geometry failures never surface; they only steer
    /// commit-versus-flush decisions.
    pub fn process<R: BufRead, W: Write>(
        &mut self,
        source: R,
        target: W,
    ) -> Result<WeldResult, WeldError> {
        let started = Instant::now();
        let period = self.config.notification_period_seconds;
        let mut next_tick = period;
        let mut run = WeldRun::new(&self.config, target);
        let mut cancelled = false;

        for line in source.lines() {
            let line = line?;
            run.stats.bytes_read += saturate_u64(line.len()) + 1;
            run.process_line(&line)?;

            if let Some(callback) = self.on_progress.as_mut() {
                let elapsed = started.elapsed().as_secs_f64();
                if elapsed >= next_tick {
                    next_tick = elapsed + period;
                    let progress = run
                        .stats
                        .progress(self.source_size.max(run.stats.bytes_read), elapsed);
                    if !callback(&progress) {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if cancelled {
            // Orderly shutdown: buffered lines go out verbatim, no partial
            // arc is committed.
            run.flush_unwritten()?;
        } else {
            run.finish()?;
        }
        run.target.flush()?;

        let elapsed = started.elapsed().as_secs_f64();
        let size = if self.source_size == 0 {
            run.stats.bytes_read
        } else {
            self.source_size
        };
        let progress = run.stats.progress(size, elapsed);
        let message = if cancelled {
            "cancelled by the progress callback".to_string()
        } else {
            format!(
                "finished: {} arcs from {} points across {} lines",
                run.stats.arcs_created, run.stats.points_compressed, run.stats.lines_processed
            )
        };
        Ok(WeldResult {
            success: !cancelled,
            cancelled,
            message,
            progress,
            statistics: run.stats,
        })
    }
}

/// All per-run mutable state.
struct WeldRun<'w, W: Write> {
    config: &'w WelderConfig,
    target: W,
    tracker: PositionTracker,
    fitter: ArcFitter,
    emitter: Emitter,
    unwritten: VecDeque<UnwrittenCommand>,
    stats: Statistics,
    /// Gcode-visible E as the output stream's consumer would compute it,
    /// unknown until the first E-bearing line goes out.
    written_e: Option<f64>,
}

impl<'w, W: Write> WeldRun<'w, W> {
    fn new(config: &'w WelderConfig, target: W) -> Self {
        Self {
            config,
            target,
            tracker: PositionTracker::new(config.g90_g91_influences_extruder),
            fitter: ArcFitter::new(config),
            emitter: Emitter::new(config),
            unwritten: VecDeque::new(),
            stats: Statistics::default(),
            written_e: None,
        }
    }

    fn process_line(&mut self, raw: &str) -> Result<(), WeldError> {
        self.stats.lines_processed += 1;

        let mut parsed = match parse_line(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    "line {} forwarded verbatim: {err}",
                    self.stats.lines_processed
                );
                self.stats.parse_warnings += 1;
                self.terminate_candidate()?;
                self.write_line(raw)?;
                // The line's effect is unknown; forget the extruder baseline.
                self.written_e = None;
                return Ok(());
            }
        };

        let Some(command) = parsed.command.clone() else {
            // Blank and comment-only lines end the candidate arc and pass
            // through.
            self.terminate_candidate()?;
            self.write_line(raw)?;
            self.written_e = Some(self.tracker.current().gcode_e());
            return Ok(());
        };

        self.stats.gcodes_processed += 1;
        if self.config.allow_dynamic_precision {
            // Observed before normalization so synthesized words never
            // promote the precision.
            self.observe_precision(&command);
        }
        self.tracker.normalize_arc_offsets(&mut parsed);
        self.tracker.update(&parsed);

        if command.is('G', 0) || command.is('G', 1) {
            let delta_xy = self.tracker.xy_travel();
            if !approx_zero(delta_xy) {
                return self.extend_or_restart(raw, delta_xy, parsed.comment.as_deref());
            }
        }

        // Z/E-only moves, arcs already in the input, mode changes, M-codes:
        // never part of a welded arc.
        self.flush_passthrough(raw, None)
    }

    /// Attempts to extend the candidate arc with the move in `raw`.
    fn extend_or_restart(
        &mut self,
        raw: &str,
        delta_xy: f64,
        comment: Option<&str>,
    ) -> Result<(), WeldError> {
        let state = *self.tracker.current();
        let e_relative = self.tracker.e_relative();
        let sign = extrusion_sign(e_relative);
        self.stats.source_segments.record(delta_xy, sign != 0);

        if let Some(reason) = self.extension_blocked(e_relative, delta_xy) {
            debug!(
                "line {} breaks the candidate arc: {reason}",
                self.stats.lines_processed
            );
            return self.flush_passthrough(raw, Some((delta_xy, sign != 0)));
        }

        // A fresh run anchors at the position before this move; the move's
        // endpoint is then the first extension.
        if self.fitter.point_count() == 0 {
            let previous = *self.tracker.previous();
            self.fitter.reset_to(Point {
                x: previous.x,
                y: previous.y,
                z: previous.z,
                e_relative: 0.0,
                is_extruder_relative: previous.is_extruder_relative,
            });
        }

        let point = Point {
            x: state.x,
            y: state.y,
            z: state.z,
            e_relative,
            is_extruder_relative: state.is_extruder_relative,
        };

        match self.fitter.try_add_point(point) {
            AddResult::Added => self.buffer_move(raw, delta_xy, sign != 0, comment),
            AddResult::Rejected | AddResult::BufferFull => {
                self.terminate_candidate()?;
                // Retry on the freshly anchored fitter.
                match self.fitter.try_add_point(point) {
                    AddResult::Added => self.buffer_move(raw, delta_xy, sign != 0, comment),
                    AddResult::Rejected | AddResult::BufferFull => {
                        self.flush_passthrough(raw, Some((delta_xy, sign != 0)))
                    }
                }
            }
        }
    }

    /// Pre-filters that force an immediate flush; returns the reason.
    fn extension_blocked(&self, e_relative: f64, delta_xy: f64) -> Option<&'static str> {
        let current = self.tracker.current();
        let previous = self.tracker.previous();

        // Feedrate is never emitted inside an arc, so a change ends it and
        // the move carrying the new F must pass through.
        if !approx_equal(current.f, previous.f) {
            return Some("feedrate changed");
        }

        let sign = extrusion_sign(e_relative);
        if sign == 0 && !self.config.allow_travel_arcs {
            return Some("travel move");
        }

        let Some(last) = self.fitter.last_point() else {
            return None;
        };
        if last.is_extruder_relative != current.is_extruder_relative {
            return Some("extruder mode changed");
        }
        if !self.config.allow_3d_arcs && !approx_equal(last.z, current.z) {
            return Some("z changed");
        }

        if self.fitter.point_count() >= 2 {
            let arc_sign = extrusion_sign(self.fitter.e_relative_total());
            if sign != arc_sign {
                return Some("extrusion sign changed");
            }

            let variance = self.config.extrusion_rate_variance_percent;
            if variance > 0.0 && sign != 0 {
                let mean = self.fitter.e_relative_total() / self.fitter.shape_length();
                let rate = e_relative / delta_xy;
                if !approx_zero(mean) && (rate - mean).abs() > variance * mean.abs() {
                    return Some("extrusion rate variance exceeded");
                }
            }
        }

        None
    }

    /// Queues the source line of a point the fitter accepted, then writes
    /// out whatever the window slide pushed past the anchor.
    fn buffer_move(
        &mut self,
        raw: &str,
        delta_xy: f64,
        is_extrusion: bool,
        comment: Option<&str>,
    ) -> Result<(), WeldError> {
        self.unwritten.push_back(UnwrittenCommand {
            text: raw.to_string(),
            xy_length: delta_xy,
            is_extrusion,
            visible_e: self.tracker.current().gcode_e(),
            comment: comment.map(str::to_string),
        });

        // Keep one buffered line per non-anchor point.
        while self.unwritten.len() + 1 > self.fitter.point_count() {
            let Some(command) = self.unwritten.pop_front() else {
                break;
            };
            self.write_unwritten(command)?;
        }
        Ok(())
    }

    /// Emits the fitted arc, with a `G92 E` resync first when the output's
    /// absolute E has drifted observably.
    fn commit_arc(&mut self) -> Result<(), WeldError> {
        let e_total = self.fitter.e_relative_total();
        let buffered = saturate_u64(self.fitter.point_count());
        let Some(arc) = self.fitter.commit() else {
            return self.flush_unwritten();
        };
        let is_relative = arc.end.is_extruder_relative;
        let extruding = extrusion_sign(e_total) != 0;
        // The tracker may already be past the arc (the commit was triggered
        // by a move that could not extend it); the last buffered command
        // knows the visible E at the arc's end.
        let visible_end = self
            .unwritten
            .back()
            .map_or_else(|| self.tracker.current().gcode_e(), |c| c.visible_e);
        let visible_start = visible_end - e_total;

        if !is_relative && extruding {
            if let Some(written_e) = self.written_e {
                if (written_e - visible_start).abs() > self.emitter.half_e_unit() {
                    let resync = self.emitter.format_g92_e(visible_start);
                    self.write_line(&resync)?;
                }
            }
        }

        let e_word = if !extruding {
            EmittedE::None
        } else if is_relative {
            EmittedE::Relative(e_total)
        } else {
            EmittedE::Absolute {
                start: visible_start,
                total: e_total,
            }
        };
        let comment = merged_comment(&self.unwritten);
        for line in self.emitter.format_arc(&arc, e_word, comment.as_deref()) {
            self.write_line(&line)?;
        }

        self.written_e = if is_relative {
            self.written_e.map(|written| written + e_total)
        } else if extruding {
            Some(round_to(visible_start + e_total, self.emitter.e_precision()))
        } else {
            self.written_e
        };

        debug!(
            "arc committed: {} points, sweep {:.4} rad, radius {:.3}",
            buffered,
            arc.sweep_radians,
            arc.circle.radius
        );
        self.stats.arcs_created += 1;
        self.stats.points_compressed += buffered.saturating_sub(1);
        self.stats.target_segments.record(arc.length, extruding);
        self.unwritten.clear();
        Ok(())
    }

    /// Writes every buffered line verbatim and abandons the candidate arc.
    fn flush_unwritten(&mut self) -> Result<(), WeldError> {
        while let Some(command) = self.unwritten.pop_front() {
            self.write_unwritten(command)?;
        }
        self.fitter.abort();
        Ok(())
    }

    /// Commit a valid candidate arc (or flush an invalid one), then end the
    /// candidate run. Cancellation bypasses this and only flushes.
    fn terminate_candidate(&mut self) -> Result<(), WeldError> {
        if self.fitter.is_shape() {
            self.commit_arc()
        } else {
            self.flush_unwritten()
        }
    }

    /// End the candidate arc, forward the current line verbatim, and
    /// re-anchor at the tracked position. `segment` carries length and
    /// extrusion metadata when the line itself was an XY move.
    fn flush_passthrough(
        &mut self,
        raw: &str,
        segment: Option<(f64, bool)>,
    ) -> Result<(), WeldError> {
        self.terminate_candidate()?;
        self.write_line(raw)?;
        if let Some((length, is_extrusion)) = segment {
            self.stats.target_segments.record(length, is_extrusion);
        }
        self.written_e = Some(self.tracker.current().gcode_e());

        let state = self.tracker.current();
        self.fitter.reset_to(Point {
            x: state.x,
            y: state.y,
            z: state.z,
            e_relative: 0.0,
            is_extruder_relative: state.is_extruder_relative,
        });
        Ok(())
    }

    /// End of input: commit a valid arc, otherwise flush.
    fn finish(&mut self) -> Result<(), WeldError> {
        self.terminate_candidate()
    }

    fn write_unwritten(&mut self, command: UnwrittenCommand) -> Result<(), WeldError> {
        self.stats
            .target_segments
            .record(command.xy_length, command.is_extrusion);
        self.written_e = Some(command.visible_e);
        self.write_line(&command.text)
    }

    fn write_line(&mut self, line: &str) -> Result<(), WeldError> {
        self.target.write_all(line.as_bytes())?;
        self.target.write_all(b"\n")?;
        self.stats.bytes_written += saturate_u64(line.len()) + 1;
        Ok(())
    }

    fn observe_precision(&mut self, command: &GcodeCommand) {
        for param in &command.params {
            let digits = fractional_digits(&param.raw);
            if digits == 0 {
                continue;
            }
            match param.letter {
                'X' | 'Y' | 'Z' | 'I' | 'J' => self.emitter.promote_xyz_precision(digits),
                'E' => self.emitter.promote_e_precision(digits),
                _ => {}
            }
        }
    }
}

/// Builds an arc's trailing comment from the comments of the lines it
/// absorbed: empties dropped, consecutive repeats collapsed, the rest
/// joined in source order.
fn merged_comment(commands: &VecDeque<UnwrittenCommand>) -> Option<String> {
    let mut merged = String::new();
    let mut last = "";
    for command in commands {
        let Some(comment) = command.comment.as_deref() else {
            continue;
        };
        let comment = comment.trim();
        if comment.is_empty() || comment == last {
            continue;
        }
        if !merged.is_empty() {
            merged.push_str(" - ");
        }
        merged.push_str(comment);
        last = comment;
    }
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

/// Rounds `value` to `digits` fractional digits.
fn round_to(value: f64, digits: u8) -> f64 {
    let scale = 10.0_f64.powi(i32::from(digits));
    (value * scale).round() / scale
}

fn saturate_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

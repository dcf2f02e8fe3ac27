//! Arc emission: `G2`/`G3` rendering, fixed precision, length-limited
//! splitting, and `G92 E` resynchronization lines.

use crate::config::{WelderConfig, MAX_PRECISION};
use crate::geometry::{approx_zero, Arc, ArcDirection};

/// Largest split count tried before giving up on the length limit.
const MAX_ARC_SPLITS: usize = 64;

/// How the `E` word of an emitted arc is expressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmittedE {
    /// No `E` word: a travel arc.
    None,
    /// Relative extrusion: the filament total across the arc.
    Relative(f64),
    /// Absolute extrusion: the gcode-visible E at the arc start plus the
    /// filament total across the arc.
    Absolute {
        /// Visible E where the arc begins.
        start: f64,
        /// Filament extruded across the whole arc.
        total: f64,
    },
}

/// Formats committed arcs as gcode output lines.
#[derive(Debug, Clone)]
pub struct Emitter {
    xyz_precision: u8,
    e_precision: u8,
    max_gcode_length: usize,
    allow_3d_arcs: bool,
}

impl Emitter {
    /// Creates an emitter from the run configuration.
    #[must_use]
    pub fn new(config: &WelderConfig) -> Self {
        Self {
            xyz_precision: config.default_xyz_precision,
            e_precision: config.default_e_precision,
            max_gcode_length: config.max_gcode_length,
            allow_3d_arcs: config.allow_3d_arcs,
        }
    }

    /// Current fractional digits for X, Y, Z, I and J.
    #[must_use]
    pub const fn xyz_precision(&self) -> u8 {
        self.xyz_precision
    }

    /// Current fractional digits for E.
    #[must_use]
    pub const fn e_precision(&self) -> u8 {
        self.e_precision
    }

    /// Raises the XYZ precision to `digits`, capped at six. Never lowers it.
    pub fn promote_xyz_precision(&mut self, digits: u8) {
        self.xyz_precision = self.xyz_precision.max(digits.min(MAX_PRECISION));
    }

    /// Raises the E precision to `digits`, capped at six. Never lowers it.
    pub fn promote_e_precision(&mut self, digits: u8) {
        self.e_precision = self.e_precision.max(digits.min(MAX_PRECISION));
    }

    /// Half of one unit in the last emitted E digit: the observability
    /// threshold for extruder drift.
    #[must_use]
    pub fn half_e_unit(&self) -> f64 {
        0.5 * 10.0_f64.powi(-i32::from(self.e_precision))
    }

    /// Renders one committed arc, splitting it into equal angular sub-arcs
    /// when a single line would exceed the configured length limit.
    ///
    /// The split count is the smallest one that makes every resulting line
    /// fit; sub-arc endpoints are computed from the true circle so the
    /// splits introduce no drift. The comment rides the first line and is
    /// exempt from the length limit.
    #[must_use]
    pub fn format_arc(&self, arc: &Arc, e: EmittedE, comment: Option<&str>) -> Vec<String> {
        // " ; " plus the comment text, never counted against the limit.
        let exempt = comment.map_or(0, |c| c.len() + 3);
        let single = self.render(arc, end_e_word(e, 1, 0), comment);
        if self.max_gcode_length == 0 || single.len() - exempt <= self.max_gcode_length {
            return vec![single];
        }

        let mut lines = vec![single];
        for splits in 2..=MAX_ARC_SPLITS {
            let subs = arc.subdivide(splits);
            lines = subs
                .iter()
                .enumerate()
                .map(|(index, sub)| {
                    let line_comment = if index == 0 { comment } else { None };
                    self.render(sub, end_e_word(e, splits, index), line_comment)
                })
                .collect();
            let all_fit = lines.iter().enumerate().all(|(index, line)| {
                let slack = if index == 0 { exempt } else { 0 };
                line.len() - slack <= self.max_gcode_length
            });
            if all_fit {
                return lines;
            }
        }
        lines
    }

    /// Renders a `G92 E` line resynchronizing the firmware's absolute E.
    #[must_use]
    pub fn format_g92_e(&self, e: f64) -> String {
        format!("G92 E{}", format_fixed(e, self.e_precision))
    }

    fn render(&self, arc: &Arc, e: Option<f64>, comment: Option<&str>) -> String {
        let word = match arc.direction() {
            ArcDirection::Clockwise => "G2",
            ArcDirection::CounterClockwise => "G3",
        };

        let mut line = String::with_capacity(48);
        line.push_str(word);
        push_word(&mut line, 'X', arc.end.x, self.xyz_precision);
        push_word(&mut line, 'Y', arc.end.y, self.xyz_precision);
        let dz = arc.end.z - arc.start.z;
        if self.allow_3d_arcs && !approx_zero(dz) {
            push_word(&mut line, 'Z', arc.end.z, self.xyz_precision);
        }
        push_word(&mut line, 'I', arc.i(), self.xyz_precision);
        push_word(&mut line, 'J', arc.j(), self.xyz_precision);
        if let Some(e) = e {
            push_word(&mut line, 'E', e, self.e_precision);
        }
        if let Some(comment) = comment {
            line.push_str(" ; ");
            line.push_str(comment);
        }
        line
    }
}

/// The `E` word value for sub-arc `index` out of `splits`, if any.
#[allow(clippy::cast_precision_loss)]
fn end_e_word(e: EmittedE, splits: usize, index: usize) -> Option<f64> {
    match e {
        EmittedE::None => None,
        EmittedE::Relative(total) => {
            let share = total / splits as f64;
            if index + 1 == splits {
                // The last sub-arc absorbs the division remainder.
                Some(total - share * (splits as f64 - 1.0))
            } else {
                Some(share)
            }
        }
        EmittedE::Absolute { start, total } => {
            if index + 1 == splits {
                Some(start + total)
            } else {
                Some(total.mul_add((index as f64 + 1.0) / splits as f64, start))
            }
        }
    }
}

fn push_word(line: &mut String, letter: char, value: f64, precision: u8) {
    line.push(' ');
    line.push(letter);
    line.push_str(&format_fixed(value, precision));
}

/// Formats `value` with fixed `precision`, trimming trailing zeros and a
/// dangling decimal point, and normalizing `-0` to `0`.
#[must_use]
pub fn format_fixed(value: f64, precision: u8) -> String {
    let mut text = format!("{value:.prec$}", prec = usize::from(precision));
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}

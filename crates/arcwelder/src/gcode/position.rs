//! Kinematic tracking: parsed commands to absolute machine state.

use crate::geometry::approx_zero;

use super::parser::{GcodeCommand, GcodeParam, ParsedLine};

const INCH_TO_MM: f64 = 25.4;

/// One snapshot of tracked machine state.
///
/// Axis positions are physical millimeters; the gcode-visible value of an
/// axis is the physical value minus its `G92` offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineState {
    /// Physical X in millimeters.
    pub x: f64,
    /// Physical Y in millimeters.
    pub y: f64,
    /// Physical Z in millimeters.
    pub z: f64,
    /// Physical extruder position in millimeters of filament.
    pub e: f64,
    /// Feedrate in millimeters per minute.
    pub f: f64,
    /// `G92` offset for X.
    pub x_offset: f64,
    /// `G92` offset for Y.
    pub y_offset: f64,
    /// `G92` offset for Z.
    pub z_offset: f64,
    /// `G92` offset for E.
    pub e_offset: f64,
    /// E-axis in relative mode (`M83`).
    pub is_extruder_relative: bool,
    /// XYZ axes in relative mode (`G91`).
    pub is_xyz_relative: bool,
    /// Metric units (`G21`); inch input is converted on arrival.
    pub is_metric: bool,
}

impl MachineState {
    const fn new() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            e: 0.0,
            f: 0.0,
            x_offset: 0.0,
            y_offset: 0.0,
            z_offset: 0.0,
            e_offset: 0.0,
            is_extruder_relative: false,
            is_xyz_relative: false,
            is_metric: true,
        }
    }

    /// The E value a `G1 E` command would name in absolute mode.
    #[must_use]
    pub fn gcode_e(&self) -> f64 {
        self.e - self.e_offset
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming position tracker: consumes parsed lines, exposes the machine
/// state before and after the most recent command.
#[derive(Debug)]
pub struct PositionTracker {
    previous: MachineState,
    current: MachineState,
    g90_g91_influences_extruder: bool,
}

impl PositionTracker {
    /// Creates a tracker at the origin, absolute modes, metric units.
    #[must_use]
    pub const fn new(g90_g91_influences_extruder: bool) -> Self {
        Self {
            previous: MachineState::new(),
            current: MachineState::new(),
            g90_g91_influences_extruder,
        }
    }

    /// State before the most recent command.
    #[must_use]
    pub const fn previous(&self) -> &MachineState {
        &self.previous
    }

    /// State after the most recent command.
    #[must_use]
    pub const fn current(&self) -> &MachineState {
        &self.current
    }

    /// Filament advanced by the most recent command.
    #[must_use]
    pub fn e_relative(&self) -> f64 {
        self.current.e - self.previous.e
    }

    /// XY distance traveled by the most recent command.
    #[must_use]
    pub fn xy_travel(&self) -> f64 {
        let dx = self.current.x - self.previous.x;
        let dy = self.current.y - self.previous.y;
        dx.mul_add(dx, dy * dy).sqrt()
    }

    /// Rewrites an arc move's `R` radius form into `I`/`J` center offsets
    /// against the position before the move, so every consumer sees the
    /// center-offset form. Call before [`Self::update`].
    ///
    /// Of the two circles of radius `R` through the current position and
    /// the target, positive `R` selects the minor arc and negative `R` the
    /// major arc. A zero chord, a zero radius, or a move already carrying
    /// `I`/`J` is left untouched; a chord longer than the diameter clamps
    /// to the semicircle.
    pub fn normalize_arc_offsets(&self, line: &mut ParsedLine) {
        let Some(command) = line.command.as_mut() else {
            return;
        };
        if !(command.is('G', 2) || command.is('G', 3)) {
            return;
        }
        if command.param('I').is_some() || command.param('J').is_some() {
            return;
        }
        let Some(radius) = command.param_value('R') else {
            return;
        };

        let scale = self.unit_scale();
        let radius_mm = radius * scale;
        if approx_zero(radius_mm) {
            return;
        }

        let current = &self.current;
        let relative = current.is_xyz_relative;
        let target_x = command.param_value('X').map_or(current.x, |value| {
            let value = value * scale;
            if relative {
                current.x + value
            } else {
                value + current.x_offset
            }
        });
        let target_y = command.param_value('Y').map_or(current.y, |value| {
            let value = value * scale;
            if relative {
                current.y + value
            } else {
                value + current.y_offset
            }
        });

        let dx = target_x - current.x;
        let dy = target_y - current.y;
        let chord = dx.hypot(dy);
        if approx_zero(chord) {
            return;
        }

        // Half-chord offset toward the center, doubled and divided by the
        // chord; the sign picks which of the two candidate centers applies.
        let det = radius_mm.mul_add(4.0 * radius_mm, -chord * chord).max(0.0);
        let mut h_x2_div_d = -det.sqrt() / chord;
        if command.is('G', 3) {
            h_x2_div_d = -h_x2_div_d;
        }
        if radius_mm < 0.0 {
            h_x2_div_d = -h_x2_div_d;
        }

        let i = 0.5 * dy.mul_add(-h_x2_div_d, dx) / scale;
        let j = 0.5 * dx.mul_add(h_x2_div_d, dy) / scale;

        command.params.retain(|p| p.letter != 'R');
        command.params.push(GcodeParam {
            letter: 'I',
            value: Some(i),
            raw: i.to_string(),
        });
        command.params.push(GcodeParam {
            letter: 'J',
            value: Some(j),
            raw: j.to_string(),
        });
    }

    /// Advances the tracked state with one parsed line.
    ///
    /// Commands that do not affect position, modes, or offsets leave the
    /// state untouched (but still roll `previous` forward).
    pub fn update(&mut self, line: &ParsedLine) {
        let Some(command) = &line.command else {
            return;
        };
        self.previous = self.current;

        match (command.letter, command.major, command.minor) {
            ('G', 0 | 1 | 2 | 3, None) => self.apply_move(command),
            ('G', 20, None) => self.current.is_metric = false,
            ('G', 21, None) => self.current.is_metric = true,
            ('G', 28, None) => self.apply_home(command),
            ('G', 90, None) => {
                self.current.is_xyz_relative = false;
                if self.g90_g91_influences_extruder {
                    self.current.is_extruder_relative = false;
                }
            }
            ('G', 91, None) => {
                self.current.is_xyz_relative = true;
                if self.g90_g91_influences_extruder {
                    self.current.is_extruder_relative = true;
                }
            }
            ('G', 92, None) => self.apply_offsets(command),
            ('G', 92, Some(1)) => {
                self.current.x_offset = 0.0;
                self.current.y_offset = 0.0;
                self.current.z_offset = 0.0;
                self.current.e_offset = 0.0;
            }
            ('M', 82, None) => self.current.is_extruder_relative = false,
            ('M', 83, None) => self.current.is_extruder_relative = true,
            _ => {}
        }
    }

    fn unit_scale(&self) -> f64 {
        if self.current.is_metric {
            1.0
        } else {
            INCH_TO_MM
        }
    }

    fn apply_move(&mut self, command: &GcodeCommand) {
        let scale = self.unit_scale();
        let relative = self.current.is_xyz_relative;

        if let Some(value) = command.param_value('X') {
            let value = value * scale;
            self.current.x = if relative {
                self.current.x + value
            } else {
                value + self.current.x_offset
            };
        }
        if let Some(value) = command.param_value('Y') {
            let value = value * scale;
            self.current.y = if relative {
                self.current.y + value
            } else {
                value + self.current.y_offset
            };
        }
        if let Some(value) = command.param_value('Z') {
            let value = value * scale;
            self.current.z = if relative {
                self.current.z + value
            } else {
                value + self.current.z_offset
            };
        }
        if let Some(value) = command.param_value('E') {
            let value = value * scale;
            self.current.e = if self.current.is_extruder_relative {
                self.current.e + value
            } else {
                value + self.current.e_offset
            };
        }
        if let Some(value) = command.param_value('F') {
            self.current.f = value * scale;
        }
    }

    fn apply_home(&mut self, command: &GcodeCommand) {
        let all = !command
            .params
            .iter()
            .any(|p| matches!(p.letter, 'X' | 'Y' | 'Z'));
        if all || command.param('X').is_some() {
            self.current.x = 0.0;
            self.current.x_offset = 0.0;
        }
        if all || command.param('Y').is_some() {
            self.current.y = 0.0;
            self.current.y_offset = 0.0;
        }
        if all || command.param('Z').is_some() {
            self.current.z = 0.0;
            self.current.z_offset = 0.0;
        }
    }

    fn apply_offsets(&mut self, command: &GcodeCommand) {
        let scale = self.unit_scale();
        let mut any = false;

        if let Some(value) = command.param_value('X') {
            self.current.x_offset = value.mul_add(-scale, self.current.x);
            any = true;
        }
        if let Some(value) = command.param_value('Y') {
            self.current.y_offset = value.mul_add(-scale, self.current.y);
            any = true;
        }
        if let Some(value) = command.param_value('Z') {
            self.current.z_offset = value.mul_add(-scale, self.current.z);
            any = true;
        }
        if let Some(value) = command.param_value('E') {
            self.current.e_offset = value.mul_add(-scale, self.current.e);
            any = true;
        }

        // A bare G92 zeroes every axis.
        if !any {
            self.current.x_offset = self.current.x;
            self.current.y_offset = self.current.y;
            self.current.z_offset = self.current.z;
            self.current.e_offset = self.current.e;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::parser::parse_line;
    use crate::geometry::approx_equal;

    fn feed(tracker: &mut PositionTracker, lines: &[&str]) {
        for line in lines {
            let parsed = parse_line(line);
            assert!(parsed.is_ok(), "fixture line `{line}` must parse");
            if let Ok(parsed) = parsed {
                tracker.update(&parsed);
            }
        }
    }

    #[test]
    fn ut_pos_001_absolute_moves_accumulate() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y20 Z0.2 E1.5 F1200"]);
        assert!(approx_equal(tracker.current().x, 10.0));
        assert!(approx_equal(tracker.current().y, 20.0));
        assert!(approx_equal(tracker.current().z, 0.2));
        assert!(approx_equal(tracker.current().e, 1.5));
        assert!(approx_equal(tracker.current().f, 1200.0));
    }

    #[test]
    fn ut_pos_002_relative_xyz_moves() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y10", "G91", "G1 X5 Y-2"]);
        assert!(approx_equal(tracker.current().x, 15.0));
        assert!(approx_equal(tracker.current().y, 8.0));
    }

    #[test]
    fn ut_pos_003_extruder_relative_mode() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["M83", "G1 X1 E0.5", "G1 X2 E0.5"]);
        assert!(approx_equal(tracker.current().e, 1.0));
        assert!(approx_equal(tracker.e_relative(), 0.5));
    }

    #[test]
    fn ut_pos_004_g92_offsets_extruder() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 E5", "G92 E0", "G1 E1"]);
        // Physical filament keeps accumulating across the reset.
        assert!(approx_equal(tracker.current().e, 6.0));
        assert!(approx_equal(tracker.current().gcode_e(), 1.0));
    }

    #[test]
    fn ut_pos_005_g92_dot_1_clears_offsets() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 E5", "G92 E0", "G92.1", "G1 E7"]);
        assert!(approx_equal(tracker.current().e, 7.0));
        assert!(approx_equal(tracker.current().gcode_e(), 7.0));
    }

    #[test]
    fn ut_pos_006_inch_units_are_converted() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G20", "G1 X1 Y2"]);
        assert!(approx_equal(tracker.current().x, 25.4));
        assert!(approx_equal(tracker.current().y, 50.8));
    }

    #[test]
    fn ut_pos_007_g90_influences_extruder_when_configured() {
        let mut tracker = PositionTracker::new(true);
        feed(&mut tracker, &["M83", "G90"]);
        assert!(!tracker.current().is_extruder_relative);

        let mut plain = PositionTracker::new(false);
        feed(&mut plain, &["M83", "G90"]);
        assert!(plain.current().is_extruder_relative);
    }

    #[test]
    fn ut_pos_008_xy_travel_and_e_relative() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X3 Y4 E2", "G1 X6 Y8 E2.5"]);
        assert!(approx_equal(tracker.xy_travel(), 5.0));
        assert!(approx_equal(tracker.e_relative(), 0.5));
    }

    #[test]
    fn bc_pos_001_unknown_commands_leave_position_alone() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X5 Y5", "M106 S255", "T0"]);
        assert!(approx_equal(tracker.current().x, 5.0));
        assert!(approx_equal(tracker.xy_travel(), 0.0));
    }

    #[test]
    fn bc_pos_002_arc_commands_advance_the_endpoint() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y0", "G2 X0 Y10 I-10 J0 E3"]);
        assert!(approx_equal(tracker.current().x, 0.0));
        assert!(approx_equal(tracker.current().y, 10.0));
        assert!(approx_equal(tracker.current().e, 3.0));
    }

    #[test]
    fn bc_pos_003_bare_g92_zeroes_all_axes() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y20 E5", "G92"]);
        assert!(approx_equal(tracker.current().gcode_e(), 0.0));
        assert!(approx_equal(tracker.current().x_offset, 10.0));
    }

    fn normalized(tracker: &PositionTracker, line: &str) -> GcodeCommand {
        let parsed = parse_line(line);
        assert!(parsed.is_ok(), "fixture line `{line}` must parse");
        let mut parsed = parsed.unwrap_or(ParsedLine {
            command: None,
            comment: None,
        });
        tracker.normalize_arc_offsets(&mut parsed);
        parsed.command.unwrap_or(GcodeCommand {
            letter: 'G',
            major: 0,
            minor: None,
            params: Vec::new(),
        })
    }

    #[test]
    fn ut_pos_009_r_form_ccw_arc_normalizes_to_center_offsets() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y0"]);
        let command = normalized(&tracker, "G3 X0 Y10 R10");
        assert!(command.param('R').is_none(), "R is replaced");
        let i = command.param_value('I').unwrap_or(f64::NAN);
        let j = command.param_value('J').unwrap_or(f64::NAN);
        // Minor CCW arc from (10,0) to (0,10) runs about the origin.
        assert!(approx_equal(i, -10.0), "got I{i}");
        assert!(approx_equal(j, 0.0), "got J{j}");
    }

    #[test]
    fn ut_pos_010_r_form_cw_arc_picks_the_other_center() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y0"]);
        let command = normalized(&tracker, "G2 X0 Y10 R10");
        let i = command.param_value('I').unwrap_or(f64::NAN);
        let j = command.param_value('J').unwrap_or(f64::NAN);
        // Minor CW arc from (10,0) to (0,10) runs about (10,10).
        assert!(approx_equal(i, 0.0), "got I{i}");
        assert!(approx_equal(j, 10.0), "got J{j}");
    }

    #[test]
    fn ut_pos_011_negative_r_selects_the_major_arc() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y0"]);
        let command = normalized(&tracker, "G3 X0 Y10 R-10");
        let i = command.param_value('I').unwrap_or(f64::NAN);
        let j = command.param_value('J').unwrap_or(f64::NAN);
        // The 270-degree CCW arc runs about the far center (10,10).
        assert!(approx_equal(i, 0.0), "got I{i}");
        assert!(approx_equal(j, 10.0), "got J{j}");
    }

    #[test]
    fn bc_pos_004_center_offset_arcs_are_left_untouched() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y0"]);
        let command = normalized(&tracker, "G2 X0 Y10 I-10 J0 R5");
        // An explicit I/J wins; the stray R survives untouched.
        assert_eq!(command.param_value('I'), Some(-10.0));
        assert_eq!(command.param_value('R'), Some(5.0));
    }

    #[test]
    fn bc_pos_005_zero_chord_r_form_is_left_untouched() {
        let mut tracker = PositionTracker::new(false);
        feed(&mut tracker, &["G1 X10 Y0"]);
        let command = normalized(&tracker, "G3 X10 Y0 R10");
        assert_eq!(command.param_value('R'), Some(10.0));
        assert!(command.param('I').is_none());
    }
}

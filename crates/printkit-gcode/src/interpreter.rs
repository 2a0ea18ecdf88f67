//! Modal G-code execution.
//!
//! The interpreter turns parsed lines into driver calls: coordinate
//! resolution against units/offsets/positioning mode, arc and drilling
//! cycle expansion into linear moves, and tool-state M codes. Word
//! order within a line does not matter; M codes run first, then the G
//! code, then a trailing tool select.

use crate::line::GCodeLine;
use crate::state::{InterpreterState, Plane};
use printkit_core::{Axis, AxisSet, GcodeError, Point5d, Result, UnitSystem};
use printkit_driver::{Driver, HomingDirection};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Executes parsed lines against a driver.
#[derive(Debug, Default)]
pub struct Interpreter {
    state: InterpreterState,
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            state: InterpreterState::new(),
        }
    }

    /// Resume with previously established modal state (rewind).
    pub fn with_state(state: InterpreterState) -> Self {
        Interpreter { state }
    }

    pub fn state(&self) -> &InterpreterState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut InterpreterState {
        &mut self.state
    }

    /// Execute one line. G-code errors are recoverable; the caller
    /// logs them and moves to the next line.
    pub fn execute(&mut self, line: &GCodeLine, driver: &mut dyn Driver) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        self.execute_m(line, driver)?;
        self.execute_g(line, driver)?;

        if line.has('T') {
            let tool = line.value_or_zero('T').max(0.0) as u8;
            if self.state.tool != Some(tool) {
                driver.select_tool(tool)?;
                self.state.tool = Some(tool);
            }
        }
        Ok(())
    }

    fn execute_m(&mut self, line: &GCodeLine, driver: &mut dyn Driver) -> Result<()> {
        let Some(m) = line.value('M') else {
            return Ok(());
        };
        match m as i64 {
            // Program stops are classified separately, before the line
            // executes.
            0 | 1 | 2 | 30 => {}

            // Spindle codes drive the tool motor on these machines.
            3 => {
                driver.set_motor_direction(true)?;
                driver.enable_motor()?;
            }
            4 => {
                driver.set_motor_direction(false)?;
                driver.enable_motor()?;
            }
            5 => driver.disable_motor()?,

            6 => {
                if !line.has('T') {
                    return Err(GcodeError::MissingParameter {
                        line_number: line.line_number(),
                        code: "M6".into(),
                        param: 'T',
                    }
                    .into());
                }
                let tool = line.value_or_zero('T').max(0.0) as u8;
                driver.request_tool_change(tool)?;
                self.state.tool = Some(tool);
            }

            // No coolant hardware on these machines. Accepted so
            // CNC-flavored files run.
            7 | 8 | 9 => debug!(code = m as i64, "coolant code ignored"),

            17 => driver.enable_drives()?,
            18 => driver.disable_drives()?,

            101 => {
                driver.set_motor_direction(true)?;
                driver.enable_motor()?;
            }
            102 => {
                driver.set_motor_direction(false)?;
                driver.enable_motor()?;
            }
            103 => driver.disable_motor()?,

            104 => {
                if line.has('S') {
                    driver.set_temperature(line.value_or_zero('S'))?;
                }
            }
            105 => {
                let celsius = driver.read_temperature()?;
                debug!(celsius, "tool temperature");
            }
            106 => driver.enable_fan()?,
            107 => driver.disable_fan()?,
            108 => {
                if line.has('S') {
                    driver.set_motor_pwm(line.value_or_zero('S').clamp(0.0, 255.0) as u8)?;
                } else if line.has('R') {
                    driver.set_motor_rpm(line.value_or_zero('R'))?;
                }
            }
            109 => {
                if line.has('S') {
                    driver.set_platform_temperature(line.value_or_zero('S'))?;
                }
            }
            // Chamber temperature: accepted, no hardware.
            110 => debug!("chamber temperature ignored"),

            126 => driver.open_valve()?,
            127 => driver.close_valve()?,

            other => {
                return Err(GcodeError::UnknownCode {
                    line_number: line.line_number(),
                    code: format!("M{}", other),
                }
                .into());
            }
        }
        Ok(())
    }

    fn execute_g(&mut self, line: &GCodeLine, driver: &mut dyn Driver) -> Result<()> {
        // F updates modal state even on a line with no G word and no
        // coordinates.
        if line.has('F') {
            self.state.feedrate = line.value_or_zero('F');
        }

        let has_coordinates =
            ['X', 'Y', 'Z', 'A', 'B'].iter().any(|&c| line.has(c));
        let g = if line.has('G') {
            line.value_or_zero('G') as i64
        } else if has_coordinates {
            // Coordinate-only line: the previous motion code carries
            // over.
            self.state.last_motion as i64
        } else {
            return Ok(());
        };

        let target = self.resolve_target(line, driver)?;

        match g {
            // Rapid positioning.
            0 => {
                driver.set_feedrate(rapid_feedrate(driver));
                self.set_target(driver, target)?;
            }
            // Linear interpolation.
            1 => {
                driver.set_feedrate(self.state.feedrate);
                self.set_target(driver, target)?;
            }

            2 | 3 => {
                let clockwise = g == 2;
                if line.has('I') || line.has('J') {
                    let current = driver.current_position()?;
                    let mut center = current;
                    center.x = current.x + self.state.units.to_mm(line.value_or_zero('I'));
                    center.y = current.y + self.state.units.to_mm(line.value_or_zero('J'));
                    driver.set_feedrate(self.state.feedrate);
                    self.draw_arc(driver, center, target, clockwise)?;
                } else if line.has('R') {
                    return Err(GcodeError::UnsupportedArcForm {
                        line_number: line.line_number(),
                    }
                    .into());
                } else {
                    return Err(GcodeError::MissingParameter {
                        line_number: line.line_number(),
                        code: if clockwise { "G2" } else { "G3" }.into(),
                        param: 'I',
                    }
                    .into());
                }
            }

            4 => driver.delay(line.value_or_zero('P').max(0.0) as u64)?,

            17 => self.state.plane = Plane::Xy,
            18 => {
                warn!("ZX plane selected; arcs and cycles are XY only");
                self.state.plane = Plane::Zx;
            }
            19 => {
                warn!("ZY plane selected; arcs and cycles are XY only");
                self.state.plane = Plane::Zy;
            }

            20 | 70 => self.state.set_units(UnitSystem::Inches),
            21 | 71 => self.state.set_units(UnitSystem::Millimeters),

            28 => {
                let mut axes = AxisSet::EMPTY;
                for (letter, axis) in [('X', Axis::X), ('Y', Axis::Y), ('Z', Axis::Z)] {
                    if line.has(letter) {
                        axes.insert(axis);
                    }
                }
                driver.home_axes(axes, HomingDirection::Maximum)?;
            }

            53..=59 => self.state.offset_index = (g - 53) as usize,

            80 => self.state.reset_drill(),

            81 | 82 | 83 | 183 => {
                if self.state.plane != Plane::Xy {
                    return Err(GcodeError::CycleOutsideXyPlane {
                        line_number: line.line_number(),
                    }
                    .into());
                }
                self.setup_drill(line, target, g);
                self.drilling_cycle(driver, g == 183)?;
            }

            90 => self.state.absolute = true,
            91 => self.state.absolute = false,

            92 => {
                let mut position = driver.current_position()?;
                let offset = self.state.active_offset();
                for (letter, axis) in [('X', Axis::X), ('Y', Axis::Y), ('Z', Axis::Z)] {
                    if line.has(letter) {
                        let value = self.state.units.to_mm(line.value_or_zero(letter))
                            + offset.axis(axis);
                        position.set_axis(axis, value);
                    }
                }
                driver.set_current_position(position)?;
            }

            // Units-per-minute feed mode, the only mode there is.
            94 => {}

            other => {
                return Err(GcodeError::UnknownCode {
                    line_number: line.line_number(),
                    code: format!("G{}", other),
                }
                .into());
            }
        }

        if matches!(g, 0..=3 | 81 | 82 | 83 | 183) {
            self.state.last_motion = g as u32;
        }
        Ok(())
    }

    /// Resolve the line's coordinates against units, the active
    /// offset, and the positioning mode.
    fn resolve_target(&self, line: &GCodeLine, driver: &mut dyn Driver) -> Result<Point5d> {
        let mut target = driver.current_position()?;
        let offset = self.state.active_offset();
        let unit = self.state.units;
        for (letter, axis) in [
            ('X', Axis::X),
            ('Y', Axis::Y),
            ('Z', Axis::Z),
            ('A', Axis::A),
            ('B', Axis::B),
        ] {
            if !line.has(letter) {
                continue;
            }
            let value = unit.to_mm(line.value_or_zero(letter)) + offset.axis(axis);
            if self.state.absolute {
                target.set_axis(axis, value);
            } else {
                target.set_axis(axis, target.axis(axis) + value);
            }
        }
        Ok(target)
    }

    /// Queue a move, Z alone ahead of the XY travel when it changes.
    fn set_target(&mut self, driver: &mut dyn Driver, target: Point5d) -> Result<()> {
        let current = driver.current_position()?;
        if target.z != current.z {
            let mut lift = current;
            lift.z = target.z;
            driver.queue_point(lift)?;
        }
        driver.queue_point(target)?;
        Ok(())
    }

    /// Expand a center-form arc into chained linear segments.
    fn draw_arc(
        &mut self,
        driver: &mut dyn Driver,
        center: Point5d,
        endpoint: Point5d,
        clockwise: bool,
    ) -> Result<()> {
        let current = driver.current_position()?;
        let ax = current.x - center.x;
        let ay = current.y - center.y;
        let bx = endpoint.x - center.x;
        let by = endpoint.y - center.y;

        // Normalize so the sweep runs counterclockwise from angle_a;
        // clockwise arcs walk it backwards.
        let (angle_a, mut angle_b) = if clockwise {
            (by.atan2(bx), ay.atan2(ax))
        } else {
            (ay.atan2(ax), by.atan2(bx))
        };
        // Equal angles mean a full circle, not an empty one.
        if angle_b <= angle_a {
            angle_b += 2.0 * PI;
        }
        let sweep = angle_b - angle_a;
        let radius = (ax * ax + ay * ay).sqrt();
        let length = radius * sweep;

        let section = self.state.units.to_mm(self.state.curve_section);
        let steps = ((sweep * 2.4).max(length / section).ceil() as i64).max(1);

        let start_z = current.z;
        for s in 1..=steps {
            let step = if clockwise { steps - s } else { s };
            let fraction = step as f64 / steps as f64;
            let mut point = current;
            point.x = center.x + radius * (angle_a + sweep * fraction).cos();
            point.y = center.y + radius * (angle_a + sweep * fraction).sin();
            point.z = start_z + (endpoint.z - start_z) * s as f64 / steps as f64;
            self.set_target(driver, point)?;
        }
        Ok(())
    }

    /// Record this line's cycle parameters; unmentioned ones are
    /// sticky from earlier lines until G80.
    fn setup_drill(&mut self, line: &GCodeLine, target: Point5d, g: i64) {
        let drill = &mut self.state.drill;
        if line.has('X') {
            drill.target.x = target.x;
        }
        if line.has('Y') {
            drill.target.y = target.y;
        }
        if line.has('Z') {
            drill.target.z = target.z;
        }
        if line.has('F') {
            drill.feedrate = line.value_or_zero('F');
        }
        if line.has('R') {
            drill.retract = self.state.units.to_mm(line.value_or_zero('R'));
        }
        match g {
            81 => {
                drill.dwell_ms = 0;
                drill.peck_mm = 0.0;
            }
            82 => {
                if line.has('P') {
                    drill.dwell_ms = line.value_or_zero('P').max(0.0) as u64;
                }
                drill.peck_mm = 0.0;
            }
            _ => {
                if line.has('P') {
                    drill.dwell_ms = line.value_or_zero('P').max(0.0) as u64;
                }
                if line.has('Q') {
                    drill.peck_mm = line.value_or_zero('Q').abs();
                }
            }
        }
    }

    /// Run one drilling cycle: position over the hole, plunge in one
    /// or more pecks at the drilling feed rate, retract.
    fn drilling_cycle(&mut self, driver: &mut dyn Driver, speed_peck: bool) -> Result<()> {
        let drill = self.state.drill;
        let rapid = rapid_feedrate(driver);

        let current = driver.current_position()?;
        if current.z < drill.retract {
            driver.set_feedrate(rapid);
            let mut up = current;
            up.z = drill.retract;
            self.set_target(driver, up)?;
        }

        // Over the hole.
        driver.set_feedrate(rapid);
        let mut over = driver.current_position()?;
        over.x = drill.target.x;
        over.y = drill.target.y;
        self.set_target(driver, over)?;

        if drill.target.z >= drill.retract {
            // Nothing below the retract plane to drill.
            return Ok(());
        }

        let delta_z = if drill.peck_mm > 0.0 {
            drill.peck_mm
        } else {
            drill.retract - drill.target.z
        };

        let at = |z: f64| {
            let mut p = over;
            p.z = z;
            p
        };
        let mut target_z = drill.retract;
        loop {
            // Rapid back down to the previous depth, except when
            // speed-pecking straight through.
            if target_z != drill.retract && !speed_peck {
                driver.set_feedrate(rapid);
                self.set_target(driver, at(target_z))?;
            }

            target_z = (target_z - delta_z).max(drill.target.z);

            driver.set_feedrate(drill.feedrate);
            self.set_target(driver, at(target_z))?;

            if drill.dwell_ms > 0 {
                driver.delay(drill.dwell_ms)?;
            }

            if !speed_peck {
                driver.set_feedrate(rapid);
                self.set_target(driver, at(drill.retract))?;
            }

            if target_z <= drill.target.z {
                break;
            }
        }

        // Speed peck ends at depth; bring the bit back up.
        let current = driver.current_position()?;
        if current.z < drill.retract {
            driver.set_feedrate(rapid);
            self.set_target(driver, at(drill.retract))?;
        }
        Ok(())
    }
}

/// Fastest configured axis rate, used for rapids and cycle
/// repositioning.
fn rapid_feedrate(driver: &dyn Driver) -> f64 {
    let model = driver.model();
    let mut best = 0.0f64;
    for axis in model.axes.iter() {
        best = best.max(model.max_feedrates.axis(axis));
    }
    if best > 0.0 {
        best
    } else {
        model.safe_feedrate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printkit_core::{AxisSet, BoardVariant, MachineModel, ToolModel};
    use printkit_driver::{SimulatedOp, SimulationDriver};

    fn sim() -> SimulationDriver {
        let model = MachineModel::new(
            "test".into(),
            BoardVariant::Gen4,
            AxisSet::of(&[Axis::X, Axis::Y, Axis::Z]),
            Point5d::new(10.0, 10.0, 100.0, 50.0, 50.0),
            Point5d::new(3000.0, 3000.0, 150.0, 1000.0, 1000.0),
            vec![
                ToolModel {
                    index: 0,
                    name: "left".into(),
                    motor_steps_per_rev: 200.0,
                    hijacked_axis: None,
                    has_platform: true,
                },
                ToolModel {
                    index: 1,
                    name: "right".into(),
                    motor_steps_per_rev: 200.0,
                    hijacked_axis: None,
                    has_platform: false,
                },
            ],
        );
        let mut d = SimulationDriver::new(model);
        d.initialize().unwrap();
        d.set_current_position(Point5d::ZERO).unwrap();
        d.clear_ops();
        d
    }

    fn run(interp: &mut Interpreter, driver: &mut SimulationDriver, lines: &[&str]) {
        for (i, text) in lines.iter().enumerate() {
            let line = GCodeLine::parse(text, i + 1).unwrap();
            interp.execute(&line, driver).unwrap();
        }
    }

    fn points(driver: &SimulationDriver) -> Vec<Point5d> {
        driver
            .ops()
            .iter()
            .filter_map(|op| match op {
                SimulatedOp::QueuePoint(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn absolute_and_incremental_moves() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["G90", "G1 X10 Y5 F600", "G91", "G1 X-2"]);
        assert_eq!(
            points(&d),
            vec![Point5d::xyz(10.0, 5.0, 0.0), Point5d::xyz(8.0, 5.0, 0.0)]
        );
        assert_eq!(interp.state().feedrate, 600.0);
    }

    #[test]
    fn motion_code_carries_over() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["G90", "G1 X1 F600", "X2 Y3"]);
        assert_eq!(
            points(&d),
            vec![Point5d::xyz(1.0, 0.0, 0.0), Point5d::xyz(2.0, 3.0, 0.0)]
        );
    }

    #[test]
    fn feedrate_only_line_updates_modal_state() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["G90", "F1200", "G1 X5"]);
        assert_eq!(interp.state().feedrate, 1200.0);
        assert_eq!(points(&d), vec![Point5d::xyz(5.0, 0.0, 0.0)]);
    }

    #[test]
    fn inch_mode_scales_coordinates() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["G90", "G20", "G1 X1 F600"]);
        assert_eq!(points(&d), vec![Point5d::xyz(25.4, 0.0, 0.0)]);
    }

    #[test]
    fn z_change_moves_z_first() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["G90", "G1 X5 Z2 F600"]);
        assert_eq!(
            points(&d),
            vec![Point5d::xyz(0.0, 0.0, 2.0), Point5d::xyz(5.0, 0.0, 2.0)]
        );
    }

    #[test]
    fn quarter_arc_expands_to_segments_ending_at_target() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        // CCW quarter circle around the origin from (1,0) to (0,1).
        run(
            &mut interp,
            &mut d,
            &["G90", "G1 X1 Y0 F600", "G3 X0 Y1 I-1 J0"],
        );
        let pts = points(&d);
        // ceil(max(pi/2 * 2.4, pi/2 / 1mm)) = 4 segments.
        assert_eq!(pts.len(), 1 + 4);
        let last = pts.last().unwrap();
        assert!((last.x - 0.0).abs() < 1e-9);
        assert!((last.y - 1.0).abs() < 1e-9);
        // Every waypoint stays on the circle.
        for p in &pts[1..] {
            assert!(((p.x * p.x + p.y * p.y).sqrt() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn coincident_endpoints_sweep_a_full_circle() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(
            &mut interp,
            &mut d,
            &["G90", "G1 X1 Y0 F600", "G2 X1 Y0 I-1 J0"],
        );
        // ceil(2pi * 2.4) = 16 segments.
        assert_eq!(points(&d).len(), 1 + 16);
    }

    #[test]
    fn radius_form_arc_rejected() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        let line = GCodeLine::parse("G2 X5 Y5 R5", 1).unwrap();
        let err = interp.execute(&line, &mut d).unwrap_err();
        assert!(matches!(
            err,
            printkit_core::Error::Gcode(GcodeError::UnsupportedArcForm { line_number: 1 })
        ));
    }

    #[test]
    fn plain_drill_cycle_plunges_and_retracts() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(
            &mut interp,
            &mut d,
            &["G90", "G1 Z5 F600", "G81 X10 Y0 Z-2 R1 F300"],
        );
        let pts = points(&d);
        // Over the hole at travel height, then plunge, then retract.
        assert!(pts.contains(&Point5d::xyz(10.0, 0.0, 5.0)));
        assert!(pts.contains(&Point5d::xyz(10.0, 0.0, -2.0)));
        assert_eq!(*pts.last().unwrap(), Point5d::xyz(10.0, 0.0, 1.0));
    }

    #[test]
    fn peck_cycle_retracts_between_pecks() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(
            &mut interp,
            &mut d,
            &["G90", "G1 Z2 F600", "G83 X0 Y0 Z-2 R1 Q1 F300"],
        );
        let pts = points(&d);
        // Three pecks of 1mm from the 1mm retract plane down to -2.
        let depths: Vec<f64> = pts.iter().map(|p| p.z).collect();
        assert!(depths.contains(&0.0));
        assert!(depths.contains(&-1.0));
        assert!(depths.contains(&-2.0));
        // Ends retracted.
        assert_eq!(pts.last().unwrap().z, 1.0);
        // Retracts to the plane between pecks.
        let retracts = depths.iter().filter(|&&z| z == 1.0).count();
        assert!(retracts >= 3);
    }

    #[test]
    fn g92_declares_position() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["G92 X5 Y5 Z1"]);
        assert_eq!(
            d.ops(),
            &[SimulatedOp::SetPosition(Point5d::xyz(5.0, 5.0, 1.0))]
        );
    }

    #[test]
    fn homing_collects_named_axes() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["G28 X Y"]);
        assert_eq!(
            d.ops(),
            &[SimulatedOp::HomeAxes(
                AxisSet::of(&[Axis::X, Axis::Y]),
                HomingDirection::Maximum
            )]
        );
    }

    #[test]
    fn tool_codes_reach_the_driver() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(
            &mut interp,
            &mut d,
            &["M104 S220", "M106", "M108 R5", "M101", "M103", "T1"],
        );
        let ops = d.ops();
        assert!(ops.contains(&SimulatedOp::SetTemperature(220.0)));
        assert!(ops.contains(&SimulatedOp::FanEnabled(true)));
        assert!(ops.contains(&SimulatedOp::SetMotorRpm(5.0)));
        assert!(ops.contains(&SimulatedOp::MotorEnabled(true)));
        assert!(ops.contains(&SimulatedOp::MotorEnabled(false)));
        assert!(ops.contains(&SimulatedOp::SelectTool(1)));
        assert_eq!(interp.state().tool, Some(1));
    }

    #[test]
    fn repeated_tool_select_sent_once() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["T1", "T1"]);
        let selects = d
            .ops()
            .iter()
            .filter(|op| matches!(op, SimulatedOp::SelectTool(_)))
            .count();
        assert_eq!(selects, 1);
    }

    #[test]
    fn unknown_codes_are_recoverable_errors() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        for text in ["G99", "M42"] {
            let line = GCodeLine::parse(text, 1).unwrap();
            let err = interp.execute(&line, &mut d).unwrap_err();
            assert!(err.is_gcode_error());
        }
        // The build continues afterwards.
        run(&mut interp, &mut d, &["G90", "G1 X1 F600"]);
        assert_eq!(points(&d), vec![Point5d::xyz(1.0, 0.0, 0.0)]);
    }

    #[test]
    fn fixture_offset_applies_to_moves() {
        let mut interp = Interpreter::new();
        interp.state_mut().offsets[1] = Point5d::xyz(100.0, 0.0, 0.0);
        let mut d = sim();
        run(&mut interp, &mut d, &["G90", "G54", "G1 X5 F600", "G53", "G1 X5"]);
        assert_eq!(
            points(&d),
            vec![Point5d::xyz(105.0, 0.0, 0.0), Point5d::xyz(5.0, 0.0, 0.0)]
        );
    }

    #[test]
    fn dwell_in_milliseconds() {
        let mut interp = Interpreter::new();
        let mut d = sim();
        run(&mut interp, &mut d, &["G4 P500"]);
        assert_eq!(d.ops(), &[SimulatedOp::Delay(500)]);
    }
}

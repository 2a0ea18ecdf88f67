//! Property tests for the interpreter's geometric expansion.

use printkit_core::{Axis, AxisSet, BoardVariant, MachineModel, Point5d, ToolModel};
use printkit_driver::{Driver, SimulatedOp, SimulationDriver};
use printkit_gcode::{GCodeLine, Interpreter};
use proptest::prelude::*;

fn sim() -> SimulationDriver {
    let model = MachineModel::new(
        "prop".into(),
        BoardVariant::Gen4,
        AxisSet::of(&[Axis::X, Axis::Y, Axis::Z]),
        Point5d::new(10.0, 10.0, 100.0, 50.0, 50.0),
        Point5d::new(3000.0, 3000.0, 150.0, 1000.0, 1000.0),
        vec![ToolModel {
            index: 0,
            name: "extruder".into(),
            motor_steps_per_rev: 200.0,
            hijacked_axis: None,
            has_platform: false,
        }],
    );
    let mut d = SimulationDriver::new(model);
    d.initialize().unwrap();
    d
}

fn queued(d: &SimulationDriver) -> Vec<Point5d> {
    d.ops()
        .iter()
        .filter_map(|op| match op {
            SimulatedOp::QueuePoint(p) => Some(*p),
            _ => None,
        })
        .collect()
}

proptest! {
    /// An arc of any geometry ends exactly on the commanded endpoint
    /// and every waypoint stays on the circle through the start point.
    #[test]
    fn arcs_end_on_target_and_stay_on_circle(
        cx in -40.0f64..40.0,
        cy in -40.0f64..40.0,
        radius in 0.5f64..30.0,
        start_angle in 0.0f64..std::f64::consts::TAU,
        end_angle in 0.0f64..std::f64::consts::TAU,
        clockwise in any::<bool>(),
    ) {
        let start = Point5d::xyz(
            cx + radius * start_angle.cos(),
            cy + radius * start_angle.sin(),
            0.0,
        );
        let end = Point5d::xyz(
            cx + radius * end_angle.cos(),
            cy + radius * end_angle.sin(),
            0.0,
        );

        let mut d = sim();
        d.set_current_position(start).unwrap();
        d.clear_ops();

        let mut interp = Interpreter::new();
        let g90 = GCodeLine::parse("G90", 1).unwrap();
        interp.execute(&g90, &mut d).unwrap();
        let text = format!(
            "G{} X{:.6} Y{:.6} I{:.6} J{:.6} F600",
            if clockwise { 2 } else { 3 },
            end.x,
            end.y,
            cx - start.x,
            cy - start.y,
        );
        let line = GCodeLine::parse(&text, 1).unwrap();
        interp.execute(&line, &mut d).unwrap();

        let pts = queued(&d);
        prop_assert!(!pts.is_empty());
        let last = pts.last().unwrap();
        // The written-out I/J center loses a little precision, so the
        // landing tolerance is loose.
        prop_assert!((last.x - end.x).abs() < 1e-3);
        prop_assert!((last.y - end.y).abs() < 1e-3);
        for p in &pts {
            let r = ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt();
            prop_assert!((r - radius).abs() < 1e-2);
        }
    }

    /// Incremental moves compose: the final position is the sum of the
    /// deltas regardless of how they are split across lines.
    #[test]
    fn incremental_moves_compose(
        deltas in proptest::collection::vec((-10.0f64..10.0, -10.0f64..10.0), 1..8),
    ) {
        let mut d = sim();
        d.set_current_position(Point5d::ZERO).unwrap();
        let mut interp = Interpreter::new();
        let g91 = GCodeLine::parse("G91", 1).unwrap();
        interp.execute(&g91, &mut d).unwrap();

        let mut expected = Point5d::ZERO;
        for (i, (dx, dy)) in deltas.iter().enumerate() {
            let text = format!("G1 X{:.4} Y{:.4} F600", dx, dy);
            let line = GCodeLine::parse(&text, i + 2).unwrap();
            interp.execute(&line, &mut d).unwrap();
            expected.x += text_round(*dx);
            expected.y += text_round(*dy);
        }
        let last = d.current_position().unwrap();
        prop_assert!((last.x - expected.x).abs() < 1e-9);
        prop_assert!((last.y - expected.y).abs() < 1e-9);
    }
}

/// The value the interpreter sees after formatting with four decimals.
fn text_round(v: f64) -> f64 {
    format!("{:.4}", v).parse().unwrap()
}

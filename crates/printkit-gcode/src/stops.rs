//! Program stop detection.
//!
//! M0/M1/M2/M30 are structured signals, not errors: the build worker
//! consumes them to cancel, confirm, finish, or rewind. A stop only
//! takes effect after the firmware's motion queue drains, so everything
//! queued before it completes first.

use crate::line::GCodeLine;
use printkit_core::Result;
use printkit_driver::Driver;
use std::time::Duration;
use tracing::debug;

/// How a program asks the build to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStop {
    /// M0: unconditional halt, the job is cancelled.
    Cancel,
    /// M1: optional halt, the operator decides whether to continue.
    OptionalHalt,
    /// M2: end of program, normal completion.
    End,
    /// M30: restart the source from the first line, modal state kept.
    Rewind,
}

/// Poll interval while waiting for the motion queue to drain.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Classify a line's stop code, if any. `optional_stops` controls
/// whether M1 halts or is ignored.
///
/// Blocks until prior motion completes before reporting a stop.
pub fn check_stops(
    line: &GCodeLine,
    driver: &mut dyn Driver,
    optional_stops: bool,
) -> Result<Option<ProgramStop>> {
    let stop = match line.value('M').map(|m| m as i64) {
        Some(0) => Some(ProgramStop::Cancel),
        Some(1) if optional_stops => Some(ProgramStop::OptionalHalt),
        Some(2) => Some(ProgramStop::End),
        Some(30) => Some(ProgramStop::Rewind),
        _ => None,
    };
    if let Some(stop) = stop {
        debug!(?stop, comment = line.comment(), "program stop");
        drain_motion_queue(driver)?;
    }
    Ok(stop)
}

/// Block until the firmware reports its motion queue empty.
pub fn drain_motion_queue(driver: &mut dyn Driver) -> Result<()> {
    while !driver.is_finished()? {
        std::thread::sleep(DRAIN_POLL);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use printkit_core::{Axis, AxisSet, BoardVariant, MachineModel, Point5d, ToolModel};
    use printkit_driver::SimulationDriver;

    fn sim() -> SimulationDriver {
        SimulationDriver::new(MachineModel::new(
            "test".into(),
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
        ))
    }

    fn classify(text: &str, optional: bool) -> Option<ProgramStop> {
        let line = GCodeLine::parse(text, 1).unwrap();
        check_stops(&line, &mut sim(), optional).unwrap()
    }

    #[test]
    fn stop_codes_classified() {
        assert_eq!(classify("M0", false), Some(ProgramStop::Cancel));
        assert_eq!(classify("M2 (all done)", false), Some(ProgramStop::End));
        assert_eq!(classify("M30", false), Some(ProgramStop::Rewind));
    }

    #[test]
    fn optional_halt_honors_preference() {
        assert_eq!(classify("M1", true), Some(ProgramStop::OptionalHalt));
        assert_eq!(classify("M1", false), None);
    }

    #[test]
    fn ordinary_lines_are_not_stops() {
        assert_eq!(classify("G1 X5", false), None);
        assert_eq!(classify("M104 S220", false), None);
        assert_eq!(classify("", false), None);
    }
}

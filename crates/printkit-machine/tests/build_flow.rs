//! End-to-end build flow against the simulation driver.

use parking_lot::Mutex;
use printkit_core::{
    Axis, BoardVariant, BuildProgress, Error, GCodeFileSource, MachineConfig, MachineError,
    MachineListener, MachineState, Point5d, SerialConfig, StringVecSource, ToolModel,
};
use printkit_driver::{OpLog, SimulatedOp, SimulationDriver};
use printkit_machine::Machine;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config(optional_stops: bool) -> MachineConfig {
    MachineConfig {
        name: "sim".into(),
        board: BoardVariant::Gen4,
        axes: vec![Axis::X, Axis::Y, Axis::Z],
        steps_per_mm: Point5d::new(10.0, 10.0, 100.0, 50.0, 50.0),
        max_feedrates: Point5d::new(3000.0, 3000.0, 150.0, 1000.0, 1000.0),
        tools: vec![ToolModel {
            index: 0,
            name: "extruder".into(),
            motor_steps_per_rev: 200.0,
            hijacked_axis: None,
            has_platform: false,
        }],
        serial: SerialConfig::default(),
        warmup_gcode: vec![],
        cooldown_gcode: vec![],
        optional_stops,
    }
}

#[derive(Default)]
struct Recorder {
    transitions: Mutex<Vec<(MachineState, MachineState)>>,
    progress: Mutex<Vec<BuildProgress>>,
    errors: Mutex<Vec<(usize, String)>>,
}

impl MachineListener for Recorder {
    fn state_changed(&self, previous: MachineState, new: MachineState) {
        self.transitions.lock().push((previous, new));
    }

    fn progress(&self, progress: &BuildProgress) {
        self.progress.lock().push(*progress);
    }

    fn build_error(&self, line_number: usize, message: &str) {
        self.errors.lock().push((line_number, message.to_string()));
    }
}

impl Recorder {
    fn saw(&self, previous: MachineState, new: MachineState) -> bool {
        self.transitions.lock().contains(&(previous, new))
    }
}

/// A machine attached to a fresh simulation driver, plus hooks into it.
fn rig(config: MachineConfig) -> (Machine, Arc<Recorder>, OpLog) {
    let sim = SimulationDriver::new(config.build_model());
    let ops = sim.op_log();
    let recorder = Arc::new(Recorder::default());
    let mut machine = Machine::new(config);
    machine.add_listener(recorder.clone());
    machine.attach_driver(Box::new(sim)).unwrap();
    (machine, recorder, ops)
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

fn queue_points(ops: &OpLog) -> Vec<Point5d> {
    ops.snapshot()
        .iter()
        .filter_map(|op| match op {
            SimulatedOp::QueuePoint(p) => Some(*p),
            _ => None,
        })
        .collect()
}

#[test]
fn build_runs_to_completion_with_brackets() {
    let mut cfg = config(false);
    cfg.warmup_gcode = vec!["M104 S220".into()];
    cfg.cooldown_gcode = vec!["M104 S0".into()];
    let (mut machine, recorder, ops) = rig(cfg);

    let source = StringVecSource::from_text(
        "G90\nG1 X10 Y0 F600\nG1 X10 Y10\nM2 (end)\nG1 X99",
    );
    machine.build(Box::new(source)).unwrap();
    machine.join_build();

    assert_eq!(machine.state(), MachineState::Ready);
    assert!(recorder.saw(MachineState::Ready, MachineState::Building));
    assert!(recorder.saw(MachineState::Building, MachineState::Ready));

    let ops = ops.snapshot();
    assert_eq!(ops.first(), Some(&SimulatedOp::SetTemperature(220.0)));
    assert_eq!(ops.last(), Some(&SimulatedOp::SetTemperature(0.0)));
    let points: Vec<_> = ops
        .iter()
        .filter(|op| matches!(op, SimulatedOp::QueuePoint(_)))
        .collect();
    // The line after M2 never runs.
    assert_eq!(points.len(), 2);

    let progress = machine.progress();
    assert_eq!(progress.lines_total, 5);
    assert_eq!(progress.lines_processed, 3);
}

#[test]
fn cancel_code_aborts_remaining_lines() {
    let (mut machine, _recorder, ops) = rig(config(false));
    let source = StringVecSource::from_text("G90\nG1 X5 F600\nM0\nG1 X9");
    machine.build(Box::new(source)).unwrap();
    machine.join_build();

    assert_eq!(machine.state(), MachineState::Ready);
    assert_eq!(queue_points(&ops).len(), 1);
    assert!(ops.snapshot().contains(&SimulatedOp::Stop));
}

#[test]
fn optional_halt_pauses_until_resumed() {
    let (mut machine, recorder, ops) = rig(config(true));
    let source = StringVecSource::from_text("G90\nM1\nG1 X5 F600\nM2");
    machine.build(Box::new(source)).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        machine.state() == MachineState::Paused
    }));
    machine.resume().unwrap();
    machine.join_build();

    assert_eq!(machine.state(), MachineState::Ready);
    assert!(recorder.saw(MachineState::Paused, MachineState::Building));
    assert_eq!(queue_points(&ops).len(), 1);
}

#[test]
fn optional_halt_ignored_without_preference() {
    let (mut machine, recorder, ops) = rig(config(false));
    let source = StringVecSource::from_text("G90\nM1\nG1 X5 F600\nM2");
    machine.build(Box::new(source)).unwrap();
    machine.join_build();

    assert_eq!(machine.state(), MachineState::Ready);
    assert!(!recorder.saw(MachineState::Building, MachineState::Paused));
    assert_eq!(queue_points(&ops).len(), 1);
}

#[test]
fn rewind_loops_until_stopped() {
    let (mut machine, recorder, ops) = rig(config(false));
    // M30 restarts the program, so this source runs until stopped.
    let source = StringVecSource::from_text("G91\nG1 X0.1 F600\nM30");
    machine.build(Box::new(source)).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        machine.progress().lines_processed > 7
    }));
    machine.stop_build().unwrap();
    machine.join_build();

    assert_eq!(machine.state(), MachineState::Ready);
    assert!(recorder.saw(MachineState::Building, MachineState::Stopping));
    assert!(recorder.saw(MachineState::Stopping, MachineState::Ready));
    // Incremental moves kept composing across the rewind.
    let points = queue_points(&ops);
    assert!(points.len() >= 2);
    assert!(points.last().unwrap().x > points.first().unwrap().x);
}

#[test]
fn build_requires_attachment() {
    let mut machine = Machine::new(config(false));
    let err = machine
        .build(Box::new(StringVecSource::from_text("G90")))
        .unwrap_err();
    assert!(matches!(err, Error::Machine(MachineError::NotAttached)));
}

#[test]
fn second_build_rejected_while_running() {
    let (mut machine, _recorder, _ops) = rig(config(false));
    let looping = StringVecSource::from_text("G91\nG1 X0.1 F600\nM30");
    machine.build(Box::new(looping)).unwrap();

    let err = machine
        .build(Box::new(StringVecSource::from_text("G90")))
        .unwrap_err();
    assert!(matches!(err, Error::Machine(MachineError::BuildInProgress)));

    machine.stop_build().unwrap();
    machine.join_build();
    assert_eq!(machine.state(), MachineState::Ready);
}

#[test]
fn pause_and_resume_outside_build_are_ignored() {
    let (machine, recorder, _ops) = rig(config(false));
    machine.pause().unwrap();
    machine.resume().unwrap();
    assert_eq!(machine.state(), MachineState::Ready);
    assert!(!recorder.saw(MachineState::Ready, MachineState::Paused));
}

#[test]
fn bad_lines_reported_and_skipped() {
    let (mut machine, recorder, ops) = rig(config(false));
    let source = StringVecSource::from_text("G90\nG1 X1.2.3 F600\nG1 X2 F600\nM2");
    machine.build(Box::new(source)).unwrap();
    machine.join_build();

    assert_eq!(machine.state(), MachineState::Ready);
    let errors = recorder.errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, 2);
    assert_eq!(queue_points(&ops).len(), 1);
}

#[test]
fn builds_from_a_file_source() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "G90").unwrap();
    writeln!(file, "G1 X3 Y4 F600").unwrap();
    writeln!(file, "M2").unwrap();

    let (mut machine, _recorder, ops) = rig(config(false));
    let source = GCodeFileSource::open(file.path()).unwrap();
    machine.build(Box::new(source)).unwrap();
    machine.join_build();

    assert_eq!(machine.state(), MachineState::Ready);
    assert_eq!(queue_points(&ops), vec![Point5d::xyz(3.0, 4.0, 0.0)]);
}

#[test]
fn detach_returns_to_not_attached() {
    let (mut machine, recorder, _ops) = rig(config(false));
    machine.detach();
    assert_eq!(machine.state(), MachineState::NotAttached);
    assert!(recorder.saw(MachineState::Ready, MachineState::NotAttached));
}

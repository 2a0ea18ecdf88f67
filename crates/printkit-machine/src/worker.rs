//! The build worker thread.
//!
//! One thread per build: it runs the warmup bracket, streams the source
//! through the interpreter, honors program stops and facade commands at
//! line boundaries, and unwinds to `Ready` when the job ends however it
//! ends. Driver access locks per line so the status poller can
//! interleave temperature queries.

use crate::machine::Shared;
use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use printkit_core::{BuildProgress, GCodeSource, MachineState, Result};
use printkit_driver::{Driver, EstimationDriver};
use printkit_gcode::{check_stops, drain_motion_queue, GCodeLine, Interpreter, ProgramStop};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Commands the facade sends to a running build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildCommand {
    Pause,
    Resume,
    Stop,
}

pub(crate) struct BuildJob {
    pub driver: Arc<Mutex<Box<dyn Driver>>>,
    pub shared: Arc<Shared>,
    pub source: Box<dyn GCodeSource>,
    pub commands: Receiver<BuildCommand>,
    pub name: String,
    pub warmup: Vec<String>,
    pub cooldown: Vec<String>,
    pub optional_stops: bool,
}

/// How a build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Ran off the end of the source or hit M2.
    Finished,
    /// M0, a facade stop, or a dropped control channel.
    Stopped,
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) fn run(job: BuildJob) {
    match run_build(&job) {
        Ok(Outcome::Finished) => info!(build = %job.name, "build finished"),
        Ok(Outcome::Stopped) => info!(build = %job.name, "build stopped"),
        Err(e) => {
            // A driver or protocol failure ends the build; the line
            // loop already swallowed recoverable G-code errors.
            error!(build = %job.name, error = %e, "build failed");
            job.shared.emit_build_error(0, &e.to_string());
            let _ = job.driver.lock().stop();
        }
    }
    job.shared.set_state(MachineState::Ready);
}

fn run_build(job: &BuildJob) -> Result<Outcome> {
    let started = Instant::now();
    let lines_total = job.source.line_count();
    let estimated_total = estimate(job);
    info!(
        build = %job.name,
        lines = lines_total,
        estimate_s = estimated_total.as_secs(),
        "build starting"
    );
    job.shared.emit_progress(BuildProgress {
        elapsed: Duration::ZERO,
        estimated_total,
        lines_processed: 0,
        lines_total,
    });

    {
        let mut driver = job.driver.lock();
        driver.build_start_notification(&job.name, lines_total as u32)?;
    }

    let mut interp = Interpreter::new();
    let mut lines_processed = 0usize;
    let mut last_percent = None;

    // Warmup shares the interpreter so modal state set here carries
    // into the job, matching how a front panel would run it.
    for (idx, text) in job.warmup.iter().enumerate() {
        execute_line(job, &mut interp, text, idx + 1)?;
    }

    let outcome = 'build: loop {
        let mut rewound = false;
        for (idx, text) in job.source.lines().enumerate() {
            match checkpoint(job)? {
                Flow::Continue => {}
                Flow::Stop => break 'build Outcome::Stopped,
            }

            let line_number = idx + 1;
            let line = match GCodeLine::parse(text, line_number) {
                Ok(line) => line,
                Err(e) => {
                    warn!(line = line_number, error = %e, "skipping unparsable line");
                    job.shared.emit_build_error(line_number, &e.to_string());
                    lines_processed += 1;
                    continue;
                }
            };

            let stop = {
                let mut driver = job.driver.lock();
                check_stops(&line, driver.as_mut(), job.optional_stops)?
            };
            match stop {
                Some(ProgramStop::End) => break 'build Outcome::Finished,
                Some(ProgramStop::Cancel) => {
                    info!(line = line_number, "program cancelled itself");
                    break 'build Outcome::Stopped;
                }
                Some(ProgramStop::Rewind) => {
                    info!(line = line_number, "program rewound to line one");
                    lines_processed += 1;
                    rewound = true;
                    break;
                }
                Some(ProgramStop::OptionalHalt) => {
                    if let Flow::Stop = pause_here(job)? {
                        break 'build Outcome::Stopped;
                    }
                }
                None => {
                    let mut driver = job.driver.lock();
                    if let Err(e) = interp.execute(&line, driver.as_mut()) {
                        if e.is_gcode_error() {
                            warn!(line = line_number, error = %e, "skipping line");
                            drop(driver);
                            job.shared.emit_build_error(line_number, &e.to_string());
                        } else {
                            return Err(e);
                        }
                    }
                }
            }

            lines_processed += 1;
            let progress = BuildProgress {
                elapsed: started.elapsed(),
                estimated_total,
                lines_processed,
                lines_total,
            };
            job.shared.emit_progress(progress);
            report_percent(job, &progress, &mut last_percent)?;
        }
        if !rewound {
            break Outcome::Finished;
        }
    };

    match outcome {
        Outcome::Finished => {
            {
                let mut driver = job.driver.lock();
                drain_motion_queue(driver.as_mut())?;
            }
            for (idx, text) in job.cooldown.iter().enumerate() {
                execute_line(job, &mut interp, text, idx + 1)?;
            }
        }
        Outcome::Stopped => {
            job.driver.lock().stop()?;
        }
    }
    {
        let mut driver = job.driver.lock();
        driver.build_end_notification()?;
    }
    job.shared.emit_progress(BuildProgress {
        elapsed: started.elapsed(),
        estimated_total,
        lines_processed,
        lines_total,
    });
    Ok(outcome)
}

/// Run one bracket line, reporting recoverable errors and moving on.
fn execute_line(
    job: &BuildJob,
    interp: &mut Interpreter,
    text: &str,
    line_number: usize,
) -> Result<()> {
    let line = match GCodeLine::parse(text, line_number) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, text, "skipping unparsable bracket line");
            return Ok(());
        }
    };
    let mut driver = job.driver.lock();
    match interp.execute(&line, driver.as_mut()) {
        Err(e) if e.is_gcode_error() => {
            warn!(error = %e, text, "skipping bracket line");
            Ok(())
        }
        other => other,
    }
}

/// Forward whole-percent changes to the machine's display.
fn report_percent(
    job: &BuildJob,
    progress: &BuildProgress,
    last: &mut Option<u8>,
) -> Result<()> {
    let percent = (progress.fraction() * 100.0).floor().min(100.0) as u8;
    if *last != Some(percent) {
        *last = Some(percent);
        job.driver.lock().set_build_percent(percent)?;
    }
    Ok(())
}

/// Drain pending facade commands at a line boundary.
fn checkpoint(job: &BuildJob) -> Result<Flow> {
    loop {
        match job.commands.try_recv() {
            Ok(BuildCommand::Stop) => return Ok(Flow::Stop),
            Ok(BuildCommand::Pause) => return pause_here(job),
            // A resume with no pause pending is stale; ignore it.
            Ok(BuildCommand::Resume) => {}
            Err(TryRecvError::Empty) => return Ok(Flow::Continue),
            // Facade gone; stop rather than stream unattended.
            Err(TryRecvError::Disconnected) => return Ok(Flow::Stop),
        }
    }
}

/// Park the worker until resumed or stopped. The motion queue drains
/// first so the head is still while paused.
fn pause_here(job: &BuildJob) -> Result<Flow> {
    {
        let mut driver = job.driver.lock();
        drain_motion_queue(driver.as_mut())?;
    }
    job.shared.set_state(MachineState::Paused);
    loop {
        match job.commands.recv() {
            Ok(BuildCommand::Resume) => {
                job.shared.set_state(MachineState::Building);
                return Ok(Flow::Continue);
            }
            Ok(BuildCommand::Stop) => return Ok(Flow::Stop),
            Ok(BuildCommand::Pause) => {}
            // Facade gone; treat as a stop so the thread exits.
            Err(_) => return Ok(Flow::Stop),
        }
    }
}

/// Dry-run the source against the estimation driver. One pass only:
/// the first M0/M2/M30 bounds the estimate.
fn estimate(job: &BuildJob) -> Duration {
    let model = job.driver.lock().model().clone();
    let mut est = EstimationDriver::new(model);
    let mut interp = Interpreter::new();
    for (idx, text) in job.source.lines().enumerate() {
        let Ok(line) = GCodeLine::parse(text, idx + 1) else {
            continue;
        };
        // M1 only pauses, so it does not bound the estimate.
        if matches!(line.value('M').map(|m| m as i64), Some(0 | 2 | 30)) {
            break;
        }
        // Estimation ignores per-line failures; the real pass reports
        // them.
        let _ = interp.execute(&line, &mut est);
    }
    est.estimate()
}

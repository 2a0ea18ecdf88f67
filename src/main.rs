//! Command-line build sender.
//!
//! `printkit build profile.json part.gcode` streams a file to the
//! printer described by the profile. `estimate` dry-runs the same file
//! against the estimation driver, and `ports` lists candidate links.

use anyhow::Context;
use printkit::{
    init_logging, list_ports, BuildProgress, EstimationDriver, GCodeFileSource, GCodeLine,
    GCodeSource, Interpreter, Machine, MachineConfig, MachineListener, MachineState, ToolStatus,
    BUILD_DATE, VERSION,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const USAGE: &str = "\
usage:
  printkit ports                             list candidate serial ports
  printkit estimate <profile.json> <gcode>   dry-run a file and report its duration
  printkit build <profile.json> <gcode>      stream a file to the printer
  printkit version";

fn main() -> anyhow::Result<()> {
    init_logging()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("ports") => ports(),
        Some("estimate") if args.len() == 3 => estimate(&args[1], &args[2]),
        Some("build") if args.len() == 3 => build(&args[1], &args[2]),
        Some("version") => {
            println!("printkit {} (built {})", VERSION, BUILD_DATE);
            Ok(())
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn ports() -> anyhow::Result<()> {
    let ports = list_ports().context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("no candidate ports found");
        return Ok(());
    }
    for port in ports {
        println!("{}  {}", port.port_name, port.description);
    }
    Ok(())
}

fn estimate(profile: &str, gcode: &str) -> anyhow::Result<()> {
    let config = MachineConfig::load(profile)
        .with_context(|| format!("loading profile {}", profile))?;
    let source = GCodeFileSource::open(gcode)
        .with_context(|| format!("reading {}", gcode))?;

    let mut driver = EstimationDriver::new(config.build_model());
    let mut interp = Interpreter::new();
    for (idx, text) in source.lines().enumerate() {
        let Ok(line) = GCodeLine::parse(text, idx + 1) else {
            continue;
        };
        if matches!(line.value('M').map(|m| m as i64), Some(0 | 2 | 30)) {
            break;
        }
        let _ = interp.execute(&line, &mut driver);
    }
    println!(
        "{}: {} lines, {} commands, about {}",
        gcode,
        source.line_count(),
        driver.command_count(),
        human_duration(driver.estimate()),
    );
    Ok(())
}

fn build(profile: &str, gcode: &str) -> anyhow::Result<()> {
    let config = MachineConfig::load(profile)
        .with_context(|| format!("loading profile {}", profile))?;
    let source = GCodeFileSource::open(gcode)
        .with_context(|| format!("reading {}", gcode))?;

    let console = Arc::new(Console::default());
    let mut machine = Machine::new(config);
    machine.add_listener(console.clone());
    machine.connect().context("attaching to the printer")?;
    machine
        .build(Box::new(source))
        .context("starting the build")?;
    machine.join_build();

    if console.failed() {
        anyhow::bail!("build did not complete cleanly");
    }
    let progress = machine.progress();
    println!(
        "done: {} lines in {}",
        progress.lines_processed,
        human_duration(progress.elapsed),
    );
    Ok(())
}

/// Progress reporting for a terminal: one line per whole percent.
#[derive(Default)]
struct Console {
    last_percent: Mutex<Option<u8>>,
    fatal: Mutex<bool>,
}

impl Console {
    fn failed(&self) -> bool {
        self.fatal.lock().map(|f| *f).unwrap_or(false)
    }
}

impl MachineListener for Console {
    fn state_changed(&self, previous: MachineState, new: MachineState) {
        println!("{} -> {}", previous, new);
    }

    fn progress(&self, progress: &BuildProgress) {
        let percent = (progress.fraction() * 100.0).floor().min(100.0) as u8;
        if let Ok(mut last) = self.last_percent.lock() {
            if *last == Some(percent) {
                return;
            }
            *last = Some(percent);
        }
        let remaining = progress
            .estimated_total
            .saturating_sub(progress.elapsed);
        println!(
            "{:3}%  line {}/{}  about {} left",
            percent,
            progress.lines_processed,
            progress.lines_total,
            human_duration(remaining),
        );
    }

    fn tool_status(&self, status: &ToolStatus) {
        match status.platform_temperature {
            Some(platform) => tracing::debug!(
                tool = status.tool,
                temperature = status.temperature,
                platform,
                "tool status"
            ),
            None => tracing::debug!(
                tool = status.tool,
                temperature = status.temperature,
                "tool status"
            ),
        }
    }

    // Line zero marks a whole-build failure rather than a skipped line.
    fn build_error(&self, line_number: usize, message: &str) {
        if line_number == 0 {
            if let Ok(mut fatal) = self.fatal.lock() {
                *fatal = true;
            }
            eprintln!("build failed: {}", message);
        } else {
            eprintln!("line {} skipped: {}", line_number, message);
        }
    }
}

fn human_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

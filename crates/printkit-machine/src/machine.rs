//! The machine facade.
//!
//! [`Machine`] ties a driver, the build worker, and the status poller
//! together behind one handle. Listeners registered here observe every
//! state transition, progress tick, and non-fatal build error.

use crate::poller::StatusPoller;
use crate::scan;
use crate::worker::{self, BuildCommand, BuildJob};
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use printkit_core::{
    BuildProgress, GCodeSource, ListenerHandle, MachineConfig, MachineError, MachineListener,
    MachineState, Result, ToolStatus,
};
use printkit_driver::{eeprom, Capability, Driver};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// State shared between the facade, the build worker, and the poller.
pub(crate) struct Shared {
    state: Mutex<MachineState>,
    progress: Mutex<BuildProgress>,
    listeners: RwLock<HashMap<ListenerHandle, Arc<dyn MachineListener>>>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            state: Mutex::new(MachineState::NotAttached),
            progress: Mutex::new(BuildProgress::default()),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn state(&self) -> MachineState {
        *self.state.lock()
    }

    /// Swap the state and report the transition. No event is emitted
    /// for a transition onto the same state.
    pub(crate) fn set_state(&self, new: MachineState) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, new)
        };
        if previous == new {
            return;
        }
        debug!(%previous, %new, "machine state");
        for listener in self.listeners.read().values() {
            listener.state_changed(previous, new);
        }
    }

    pub(crate) fn emit_progress(&self, progress: BuildProgress) {
        *self.progress.lock() = progress;
        for listener in self.listeners.read().values() {
            listener.progress(&progress);
        }
    }

    pub(crate) fn emit_tool_status(&self, status: &ToolStatus) {
        for listener in self.listeners.read().values() {
            listener.tool_status(status);
        }
    }

    pub(crate) fn emit_build_error(&self, line_number: usize, message: &str) {
        for listener in self.listeners.read().values() {
            listener.build_error(line_number, message);
        }
    }
}

/// A printer under host control.
///
/// Owns the driver behind a mutex so the build worker and the status
/// poller can interleave commands on the half-duplex link.
pub struct Machine {
    config: MachineConfig,
    shared: Arc<Shared>,
    driver: Option<Arc<Mutex<Box<dyn Driver>>>>,
    control: Option<Sender<BuildCommand>>,
    worker: Option<JoinHandle<()>>,
    poller: Option<StatusPoller>,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        Machine {
            config,
            shared: Arc::new(Shared::new()),
            driver: None,
            control: None,
            worker: None,
            poller: None,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn state(&self) -> MachineState {
        self.shared.state()
    }

    /// The most recent progress snapshot of the current (or last) build.
    pub fn progress(&self) -> BuildProgress {
        *self.shared.progress.lock()
    }

    pub fn add_listener(&self, listener: Arc<dyn MachineListener>) -> ListenerHandle {
        let handle = ListenerHandle::new();
        self.shared.listeners.write().insert(handle, listener);
        handle
    }

    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.shared.listeners.write().remove(&handle);
    }

    /// The attached driver, if any. Lock it only between build lines;
    /// holding it starves the worker and the poller.
    pub fn driver(&self) -> Option<Arc<Mutex<Box<dyn Driver>>>> {
        self.driver.clone()
    }

    /// Attach to the configured serial port, or auto-scan when no port
    /// is named. Ends in `Ready` on success, `NotAttached` on failure.
    pub fn connect(&mut self) -> Result<()> {
        if self.driver.is_some() {
            return Ok(());
        }
        let result = match self.config.serial.port.clone() {
            Some(port) => {
                self.shared.set_state(MachineState::Connecting);
                scan::open_port(&port, &self.config)
            }
            None => {
                self.shared.set_state(MachineState::AutoScan);
                scan::auto_scan(&self.config)
            }
        };
        match result {
            Ok(driver) => {
                self.attach_driver(Box::new(driver))?;
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(MachineState::NotAttached);
                Err(e)
            }
        }
    }

    /// Take control of an already-constructed driver. This is the
    /// attachment path for simulation drivers.
    pub fn attach_driver(&mut self, mut driver: Box<dyn Driver>) -> Result<()> {
        if !driver.is_initialized() {
            driver.initialize()?;
        }
        if driver.has_capability(Capability::OnboardParameters) {
            match eeprom::read_machine_name(driver.as_mut()) {
                // Fresh EEPROM reads back as erased bytes, not a name.
                Ok(name) if !name.is_empty() && name.is_ascii() => {
                    info!(%name, "machine reports its name");
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "machine name unavailable"),
            }
        }
        info!(
            machine = %self.config.name,
            firmware = ?driver.firmware_version(),
            "machine attached"
        );
        let driver = Arc::new(Mutex::new(driver));
        self.poller = Some(StatusPoller::spawn(driver.clone(), self.shared.clone()));
        self.driver = Some(driver);
        self.shared.set_state(MachineState::Ready);
        Ok(())
    }

    /// Drop the driver and return to `NotAttached`. Any running build
    /// is stopped first.
    pub fn detach(&mut self) {
        if self.shared.state().is_building() {
            let _ = self.stop_build();
        }
        self.join_build();
        if let Some(poller) = self.poller.take() {
            poller.shutdown();
        }
        self.driver = None;
        self.control = None;
        self.shared.set_state(MachineState::NotAttached);
    }

    /// Start streaming a build on a worker thread. Returns immediately;
    /// completion is reported through the state transitions.
    pub fn build(&mut self, source: Box<dyn GCodeSource>) -> Result<()> {
        self.reap_worker();
        let state = self.shared.state();
        if state.is_building() || state == MachineState::Stopping {
            return Err(MachineError::BuildInProgress.into());
        }
        let driver = self
            .driver
            .clone()
            .ok_or(MachineError::NotAttached)?;
        if !state.can_build() {
            return Err(MachineError::InvalidStateTransition {
                current: state.to_string(),
                requested: MachineState::Building.to_string(),
            }
            .into());
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let job = BuildJob {
            driver,
            shared: self.shared.clone(),
            source,
            commands: rx,
            name: self.config.name.clone(),
            warmup: self.config.warmup_gcode.clone(),
            cooldown: self.config.cooldown_gcode.clone(),
            optional_stops: self.config.optional_stops,
        };
        self.shared.set_state(MachineState::Building);
        let handle = std::thread::Builder::new()
            .name("printkit-build".into())
            .spawn(move || worker::run(job))
            .map_err(|e| {
                self.shared.set_state(MachineState::Ready);
                MachineError::WorkerUnavailable {
                    reason: e.to_string(),
                }
            })?;
        self.control = Some(tx);
        self.worker = Some(handle);
        Ok(())
    }

    /// Suspend the running build. Takes effect at the next line
    /// boundary, after the motion queue drains. A no-op unless a build
    /// is running.
    pub fn pause(&self) -> Result<()> {
        if self.shared.state() != MachineState::Building {
            debug!(state = %self.shared.state(), "pause ignored");
            return Ok(());
        }
        self.send(BuildCommand::Pause)
    }

    /// Resume a paused build. A no-op unless paused.
    pub fn resume(&self) -> Result<()> {
        if self.shared.state() != MachineState::Paused {
            debug!(state = %self.shared.state(), "resume ignored");
            return Ok(());
        }
        self.send(BuildCommand::Resume)
    }

    /// Abort the running build. A stop with no build in flight is a
    /// no-op. The worker unwinds through `Stopping` back to `Ready`.
    pub fn stop_build(&self) -> Result<()> {
        if !self.shared.state().is_building() {
            return Ok(());
        }
        self.shared.set_state(MachineState::Stopping);
        self.send(BuildCommand::Stop)
    }

    /// Block until the build worker exits. Used by shutdown paths and
    /// batch front-ends; interactive callers watch the listener instead.
    pub fn join_build(&mut self) {
        // The control sender stays alive until the worker exits; the
        // worker reads a dropped channel as a stop request.
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("build worker panicked");
                self.shared.set_state(MachineState::Ready);
            }
        }
        self.control = None;
    }

    fn send(&self, command: BuildCommand) -> Result<()> {
        match &self.control {
            Some(tx) => tx.send(command).map_err(|_| {
                MachineError::WorkerUnavailable {
                    reason: "build worker exited".into(),
                }
                .into()
            }),
            None => Err(MachineError::WorkerUnavailable {
                reason: "no build worker".into(),
            }
            .into()),
        }
    }

    /// Collect a worker that already ran to completion.
    fn reap_worker(&mut self) {
        if !self.shared.state().is_building() && self.shared.state() != MachineState::Stopping {
            self.join_build();
        }
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        self.detach();
    }
}

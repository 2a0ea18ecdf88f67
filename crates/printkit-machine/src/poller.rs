//! Background temperature polling.
//!
//! Runs beside the build worker and shares the driver mutex, so a poll
//! slots between build lines rather than interleaving packets on the
//! half-duplex link.

use crate::machine::Shared;
use parking_lot::Mutex;
use printkit_core::ToolStatus;
use printkit_driver::Driver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shutdown slice; bounds how long a stop waits on a sleeping poller.
const POLL_SLICE: Duration = Duration::from_millis(100);

pub(crate) struct StatusPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StatusPoller {
    pub(crate) fn spawn(driver: Arc<Mutex<Box<dyn Driver>>>, shared: Arc<Shared>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("printkit-status".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    poll_once(&driver, &shared);
                    let mut slept = Duration::ZERO;
                    while slept < POLL_INTERVAL && !flag.load(Ordering::Relaxed) {
                        std::thread::sleep(POLL_SLICE);
                        slept += POLL_SLICE;
                    }
                }
            });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "status poller thread failed to start");
                None
            }
        };
        StatusPoller { stop, handle }
    }

    pub(crate) fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn poll_once(driver: &Mutex<Box<dyn Driver>>, shared: &Shared) {
    let status = {
        let mut driver = driver.lock();
        if !driver.is_initialized() {
            return;
        }
        let tool = driver.model().current_tool_index() as u8;
        let has_platform = driver
            .model()
            .current_tool()
            .map(|t| t.has_platform)
            .unwrap_or(false);
        let temperature = match driver.read_temperature() {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "temperature poll failed");
                return;
            }
        };
        let platform_temperature = if has_platform {
            driver.read_platform_temperature().ok()
        } else {
            None
        };
        ToolStatus {
            tool,
            temperature,
            platform_temperature,
        }
    };
    shared.emit_tool_status(&status);
}

//! Machine lifecycle states, build progress, and listener plumbing.

use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// The machine lifecycle state.
///
/// Every transition is reported to listeners as a `(previous, new)`
/// pair, so observers can distinguish e.g. Paused→Building (resume)
/// from Ready→Building (fresh build).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// No printer attached.
    NotAttached,
    /// Opening a named port and probing firmware.
    Connecting,
    /// Probing candidate ports for a responding printer.
    AutoScan,
    /// Attached and idle.
    Ready,
    /// A build is streaming.
    Building,
    /// Build suspended; motion buffer drained, state preserved.
    Paused,
    /// Stop requested; unwinding to Ready.
    Stopping,
}

impl MachineState {
    /// Whether a build is in flight (running or suspended).
    pub fn is_building(self) -> bool {
        matches!(self, MachineState::Building | MachineState::Paused)
    }

    /// Whether the machine can accept a new build.
    pub fn can_build(self) -> bool {
        self == MachineState::Ready
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::NotAttached => "not attached",
            MachineState::Connecting => "connecting",
            MachineState::AutoScan => "auto-scan",
            MachineState::Ready => "ready",
            MachineState::Building => "building",
            MachineState::Paused => "paused",
            MachineState::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// A snapshot of build progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildProgress {
    pub elapsed: Duration,
    /// Pre-pass estimate of the whole build's duration.
    pub estimated_total: Duration,
    pub lines_processed: usize,
    pub lines_total: usize,
}

impl BuildProgress {
    /// Completion fraction by line count, 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        if self.lines_total == 0 {
            0.0
        } else {
            self.lines_processed as f64 / self.lines_total as f64
        }
    }
}

/// Tool temperature readings pushed by the status poller.
#[derive(Debug, Clone, Copy)]
pub struct ToolStatus {
    pub tool: u8,
    pub temperature: f64,
    pub platform_temperature: Option<f64>,
}

/// Observer of machine activity.
///
/// All methods default to no-ops so listeners implement only what they
/// care about. Implementations must not block; they are called from the
/// build worker thread.
pub trait MachineListener: Send + Sync {
    fn state_changed(&self, _previous: MachineState, _new: MachineState) {}

    fn progress(&self, _progress: &BuildProgress) {}

    fn tool_status(&self, _status: &ToolStatus) {}

    /// A non-fatal error was logged and skipped during a build.
    fn build_error(&self, _line_number: usize, _message: &str) {}
}

/// Opaque handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

impl ListenerHandle {
    pub fn new() -> Self {
        ListenerHandle(Uuid::new_v4())
    }
}

impl Default for ListenerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_states() {
        assert!(MachineState::Building.is_building());
        assert!(MachineState::Paused.is_building());
        assert!(!MachineState::Ready.is_building());
        assert!(MachineState::Ready.can_build());
        assert!(!MachineState::Stopping.can_build());
    }

    #[test]
    fn progress_fraction() {
        let p = BuildProgress {
            elapsed: Duration::from_secs(10),
            estimated_total: Duration::from_secs(100),
            lines_processed: 25,
            lines_total: 100,
        };
        assert_eq!(p.fraction(), 0.25);
        assert_eq!(BuildProgress::default().fraction(), 0.0);
    }

    #[test]
    fn listener_handles_are_unique() {
        assert_ne!(ListenerHandle::new(), ListenerHandle::new());
    }
}

//! The motion/tool driver contract.
//!
//! One trait covers everything the interpreter and the build worker ask
//! of a machine: motion, tool state, temperatures, EEPROM, lifecycle.
//! Hardware drivers translate these calls into wire packets; the
//! simulation and estimation drivers implement the same contract
//! without hardware.

use crate::version::{Capability, FirmwareVersion};
use printkit_core::{AxisSet, DriverError, MachineModel, Point5d, Result};

/// Homing direction: which limit switch to seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingDirection {
    Minimum,
    Maximum,
}

/// The hardware-facing machine contract.
///
/// Implementations track the last-known position (`None` until
/// reconciled after stop, reset, or homing) and the modally commanded
/// feed rate. All motion is absolute millimeters at this level.
pub trait Driver: Send {
    /// Establish the link: query firmware, check the version floor,
    /// send init. Must succeed before any other command.
    fn initialize(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Version reported at initialize time.
    fn firmware_version(&self) -> Option<FirmwareVersion>;

    fn has_capability(&self, cap: Capability) -> bool {
        match self.firmware_version() {
            Some(v) => v >= cap.minimum_version(),
            None => false,
        }
    }

    fn model(&self) -> &MachineModel;

    fn model_mut(&mut self) -> &mut MachineModel;

    /// Modal feed rate in mm/min, pushed by F words before moves.
    fn set_feedrate(&mut self, mm_per_min: f64);

    fn feedrate(&self) -> f64;

    /// Queue one absolute move. A move whose step delta rounds to zero
    /// on every axis is never sent.
    fn queue_point(&mut self, target: Point5d) -> Result<()>;

    /// Declare the hardware position without motion (homing reference,
    /// G92). Updates the cached position.
    fn set_current_position(&mut self, position: Point5d) -> Result<()>;

    /// Last-known position, reconciling with a firmware query if the
    /// cache is invalid.
    fn current_position(&mut self) -> Result<Point5d>;

    /// Forget the cached position; the next read reconciles.
    fn invalidate_position(&mut self);

    fn position_known(&self) -> bool;

    /// Drive the named axes toward a limit switch. Invalidates the
    /// cached position.
    fn home_axes(&mut self, axes: AxisSet, direction: HomingDirection) -> Result<()>;

    /// Queue a dwell for the given number of milliseconds.
    fn delay(&mut self, millis: u64) -> Result<()>;

    fn select_tool(&mut self, index: u8) -> Result<()>;

    /// Select a tool and block the firmware until it reports ready.
    fn request_tool_change(&mut self, index: u8) -> Result<()>;

    fn set_motor_rpm(&mut self, rpm: f64) -> Result<()>;

    fn set_motor_pwm(&mut self, pwm: u8) -> Result<()>;

    fn set_motor_direction(&mut self, clockwise: bool) -> Result<()>;

    fn enable_motor(&mut self) -> Result<()>;

    fn disable_motor(&mut self) -> Result<()>;

    fn set_temperature(&mut self, celsius: f64) -> Result<()>;

    /// Query the current tool's temperature and record it in the model.
    fn read_temperature(&mut self) -> Result<f64>;

    fn set_platform_temperature(&mut self, celsius: f64) -> Result<()>;

    fn read_platform_temperature(&mut self) -> Result<f64>;

    fn enable_fan(&mut self) -> Result<()>;

    fn disable_fan(&mut self) -> Result<()>;

    fn open_valve(&mut self) -> Result<()>;

    fn close_valve(&mut self) -> Result<()>;

    fn enable_drives(&mut self) -> Result<()>;

    fn disable_drives(&mut self) -> Result<()>;

    /// Whether the firmware's motion queue has drained.
    fn is_finished(&mut self) -> Result<bool>;

    /// Abort motion immediately and invalidate the position cache.
    fn stop(&mut self) -> Result<()>;

    /// Soft-reset the firmware. Capability gated.
    fn reset(&mut self) -> Result<()>;

    fn read_eeprom(&mut self, _offset: u16, _len: u8) -> Result<Vec<u8>> {
        Err(DriverError::UnsupportedCommand {
            command: "read EEPROM".into(),
        }
        .into())
    }

    fn write_eeprom(&mut self, _offset: u16, _data: &[u8]) -> Result<()> {
        Err(DriverError::UnsupportedCommand {
            command: "write EEPROM".into(),
        }
        .into())
    }

    /// Show a message on the machine's display. Capability gated.
    fn display_message(&mut self, _message: &str, _timeout_s: u8) -> Result<()> {
        Ok(())
    }

    fn build_start_notification(&mut self, _name: &str, _line_count: u32) -> Result<()> {
        Ok(())
    }

    fn build_end_notification(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_build_percent(&mut self, _percent: u8) -> Result<()> {
        Ok(())
    }
}

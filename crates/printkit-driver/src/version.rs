//! Firmware version handling and capability gates.

use printkit_core::{DriverError, Result};
use std::fmt;

/// A firmware version as reported by the version query.
///
/// The wire form packs major and minor into one u16 as
/// `major * 100 + minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
}

impl FirmwareVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        FirmwareVersion { major, minor }
    }

    pub fn from_wire(value: u16) -> Self {
        FirmwareVersion {
            major: value / 100,
            minor: value % 100,
        }
    }

    pub fn to_wire(self) -> u16 {
        self.major * 100 + self.minor
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Firmware features that appeared over time.
///
/// Every version-gated operation names its capability; attempting it on
/// older firmware fails loudly instead of no-opping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Watchdog soft reset command.
    SoftReset,
    /// EEPROM-backed onboard parameters (name, axis inversion).
    OnboardParameters,
    /// Five-axis extended point queue.
    ExtendedPointQueue,
    /// LCD messages and build start/end/percent notifications.
    BuildNotifications,
}

impl Capability {
    /// First firmware version carrying the capability.
    pub fn minimum_version(self) -> FirmwareVersion {
        match self {
            Capability::SoftReset => FirmwareVersion::new(1, 4),
            Capability::OnboardParameters => FirmwareVersion::new(1, 2),
            Capability::ExtendedPointQueue => FirmwareVersion::new(2, 0),
            Capability::BuildNotifications => FirmwareVersion::new(2, 4),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::SoftReset => "soft reset",
            Capability::OnboardParameters => "onboard parameters",
            Capability::ExtendedPointQueue => "extended point queue",
            Capability::BuildNotifications => "build notifications",
        }
    }
}

/// Check a capability gate, producing the distinct mismatch error on
/// too-old firmware.
pub fn require_capability(version: Option<FirmwareVersion>, cap: Capability) -> Result<()> {
    let actual = version.ok_or(DriverError::NotInitialized)?;
    let required = cap.minimum_version();
    if actual < required {
        return Err(DriverError::CapabilityMismatch {
            operation: cap.name().to_string(),
            required: required.to_string(),
            actual: actual.to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip() {
        let v = FirmwareVersion::from_wire(104);
        assert_eq!(v, FirmwareVersion::new(1, 4));
        assert_eq!(v.to_wire(), 104);
        assert_eq!(v.to_string(), "1.4");
    }

    #[test]
    fn ordering_is_major_then_minor() {
        assert!(FirmwareVersion::new(1, 4) > FirmwareVersion::new(1, 3));
        assert!(FirmwareVersion::new(2, 0) > FirmwareVersion::new(1, 99));
    }

    #[test]
    fn gate_fails_below_minimum() {
        let old = Some(FirmwareVersion::new(1, 3));
        let err = require_capability(old, Capability::SoftReset).unwrap_err();
        assert!(err.is_capability_mismatch());
        assert!(require_capability(Some(FirmwareVersion::new(1, 4)), Capability::SoftReset).is_ok());
    }

    #[test]
    fn gate_requires_initialization() {
        assert!(require_capability(None, Capability::SoftReset).is_err());
    }
}

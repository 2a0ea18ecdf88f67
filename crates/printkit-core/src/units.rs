//! Unit systems for G-code interpretation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Millimeters per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// The unit system a G-code stream is currently speaking.
///
/// Selected modally with G20/G70 (inches) and G21/G71 (millimeters).
/// All internal machine coordinates are millimeters; conversion happens
/// once, at interpretation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitSystem {
    #[default]
    Millimeters,
    Inches,
}

impl UnitSystem {
    /// Convert a coordinate in this system to millimeters.
    pub fn to_mm(self, value: f64) -> f64 {
        match self {
            UnitSystem::Millimeters => value,
            UnitSystem::Inches => value * MM_PER_INCH,
        }
    }

    /// Convert millimeters into this system.
    pub fn from_mm(self, mm: f64) -> f64 {
        match self {
            UnitSystem::Millimeters => mm,
            UnitSystem::Inches => mm / MM_PER_INCH,
        }
    }

    /// Default curve section length for arc flattening, in this
    /// system's units. One millimeter either way.
    pub fn default_curve_section(self) -> f64 {
        match self {
            UnitSystem::Millimeters => 1.0,
            UnitSystem::Inches => 1.0 / MM_PER_INCH,
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSystem::Millimeters => write!(f, "mm"),
            UnitSystem::Inches => write!(f, "in"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_is_identity() {
        assert_eq!(UnitSystem::Millimeters.to_mm(12.5), 12.5);
        assert_eq!(UnitSystem::Millimeters.from_mm(12.5), 12.5);
    }

    #[test]
    fn inch_conversion() {
        assert_eq!(UnitSystem::Inches.to_mm(1.0), 25.4);
        assert!((UnitSystem::Inches.from_mm(25.4) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn roundtrip() {
        for v in [0.0, 0.001, -3.25, 100.0] {
            let there = UnitSystem::Inches.to_mm(v);
            let back = UnitSystem::Inches.from_mm(there);
            assert!((back - v).abs() < 1e-9);
        }
    }

    #[test]
    fn curve_section_is_one_mm_either_way() {
        assert_eq!(UnitSystem::Millimeters.default_curve_section(), 1.0);
        let inch_section = UnitSystem::Inches.default_curve_section();
        assert!((UnitSystem::Inches.to_mm(inch_section) - 1.0).abs() < 1e-12);
    }
}

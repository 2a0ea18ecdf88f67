//! Modal interpreter state.

use printkit_core::{Point5d, UnitSystem};

/// Arc/cycle working plane (G17/G18/G19). Only XY motion is
/// implemented; the others are tracked so the error can name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Plane {
    #[default]
    Xy,
    Zx,
    Zy,
}

/// Canned drilling cycle parameters, sticky until G80.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrillState {
    pub target: Point5d,
    pub retract: f64,
    pub feedrate: f64,
    pub dwell_ms: u64,
    pub peck_mm: f64,
}

/// Everything that carries over from one line to the next.
///
/// Created at build start and mutated line by line. A rewind keeps the
/// state while the source restarts; units or offsets established in a
/// first pass deliberately survive into the next.
#[derive(Debug, Clone)]
pub struct InterpreterState {
    pub units: UnitSystem,
    /// Absolute (G90) versus incremental (G91) coordinates.
    pub absolute: bool,
    pub plane: Plane,
    /// Active work offset: 0 is the master offset, 1-6 are fixtures.
    pub offset_index: usize,
    pub offsets: [Point5d; 7],
    /// Modal feed rate from the last F word, mm/min.
    pub feedrate: f64,
    /// Last executed motion G code, applied to lines that carry
    /// coordinates but no G word.
    pub last_motion: u32,
    /// Tool selected by the last T word.
    pub tool: Option<u8>,
    /// Segment length for arc subdivision, in current-unit millimeters.
    pub curve_section: f64,
    pub drill: DrillState,
}

impl Default for InterpreterState {
    fn default() -> Self {
        let units = UnitSystem::Millimeters;
        InterpreterState {
            units,
            absolute: false,
            plane: Plane::Xy,
            offset_index: 0,
            offsets: [Point5d::ZERO; 7],
            feedrate: 0.0,
            // A coordinate-only first line moves linearly.
            last_motion: 1,
            tool: None,
            curve_section: units.default_curve_section(),
            drill: DrillState::default(),
        }
    }
}

impl InterpreterState {
    pub fn new() -> Self {
        InterpreterState::default()
    }

    /// The offset currently applied to resolved coordinates.
    pub fn active_offset(&self) -> Point5d {
        self.offsets[self.offset_index.min(self.offsets.len() - 1)]
    }

    pub fn set_units(&mut self, units: UnitSystem) {
        self.units = units;
        self.curve_section = units.default_curve_section();
    }

    /// G80: forget all canned cycle parameters.
    pub fn reset_drill(&mut self) {
        self.drill = DrillState::default();
    }
}

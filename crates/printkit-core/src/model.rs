//! Machine model: static geometry plus live tool state.
//!
//! The model is built once from a [`MachineConfig`](crate::config::MachineConfig)
//! profile and then mutated by the driver as commands execute. It is the
//! host's picture of the machine; firmware state is reconciled into it
//! through position and temperature queries.

use crate::geometry::{Axis, AxisSet, Point5d};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The motherboard family a machine is built on.
///
/// A closed set: dispatch differences between boards (extended point
/// queue, axis hijacking, EEPROM layout) are matched on this variant
/// rather than spread over a driver hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardVariant {
    /// Three-axis board, 16-byte point queue, version 1.x firmware.
    Gen3,
    /// Five-axis board with the extended point queue.
    Gen4,
    /// Gen4 hardware where extruders are driven by hijacked axes.
    Gen4Alternate,
}

impl fmt::Display for BoardVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardVariant::Gen3 => write!(f, "Gen3"),
            BoardVariant::Gen4 => write!(f, "Gen4"),
            BoardVariant::Gen4Alternate => write!(f, "Gen4 (alternate extrusion)"),
        }
    }
}

/// Static description of one tool head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolModel {
    /// Tool index as used by T words and slave packets.
    pub index: u8,
    pub name: String,
    /// Extruder motor steps per revolution, for hijacked-axis extrusion.
    #[serde(default = "default_motor_steps")]
    pub motor_steps_per_rev: f64,
    /// Stepper axis this tool's motor has seized, if any.
    #[serde(default)]
    pub hijacked_axis: Option<Axis>,
    /// Whether the tool has a heated build platform attached.
    #[serde(default)]
    pub has_platform: bool,
}

fn default_motor_steps() -> f64 {
    200.0
}

/// Live, host-side state of one tool head.
///
/// Mirrors what the host has commanded; temperatures are updated from
/// firmware query replies.
#[derive(Debug, Clone, Default)]
pub struct ToolState {
    pub motor_enabled: bool,
    pub motor_clockwise: bool,
    /// Commanded speed in revolutions per minute (M108 R).
    pub motor_rpm: f64,
    /// Commanded PWM duty 0-255 (M108 S).
    pub motor_pwm: u8,
    pub fan_enabled: bool,
    pub valve_open: bool,
    pub target_temperature: f64,
    pub current_temperature: f64,
    pub platform_target_temperature: f64,
    pub platform_current_temperature: f64,
}

/// The machine model.
#[derive(Debug, Clone)]
pub struct MachineModel {
    pub name: String,
    pub board: BoardVariant,
    /// Axes this machine actually drives.
    pub axes: AxisSet,
    /// Steps per millimeter, per axis.
    pub steps_per_mm: Point5d,
    /// Per-axis maximum feed rate in mm/min.
    pub max_feedrates: Point5d,
    pub tools: Vec<ToolModel>,
    tool_states: Vec<ToolState>,
    current_tool: usize,
}

impl MachineModel {
    pub fn new(
        name: String,
        board: BoardVariant,
        axes: AxisSet,
        steps_per_mm: Point5d,
        max_feedrates: Point5d,
        tools: Vec<ToolModel>,
    ) -> Self {
        let tool_states = tools.iter().map(|_| ToolState::default()).collect();
        MachineModel {
            name,
            board,
            axes,
            steps_per_mm,
            max_feedrates,
            tools,
            tool_states,
            current_tool: 0,
        }
    }

    /// Convert a position in millimeters to rounded machine steps.
    pub fn mm_to_steps(&self, mm: &Point5d) -> Point5d {
        mm.scale(&self.steps_per_mm).round()
    }

    /// Clamp a requested feed rate to the slowest per-axis maximum among
    /// the axes that actually move.
    pub fn clamp_feedrate(&self, delta: &Point5d, feedrate: f64) -> f64 {
        let mut limit = f64::INFINITY;
        let d = delta.abs();
        for axis in Axis::ALL {
            if d.axis(axis) > 0.0 {
                let max = self.max_feedrates.axis(axis);
                if max > 0.0 {
                    limit = limit.min(max);
                }
            }
        }
        if limit.is_finite() {
            feedrate.min(limit)
        } else {
            feedrate
        }
    }

    /// Slowest configured per-axis maximum, used as a safe default when
    /// no feed rate has been commanded yet.
    pub fn safe_feedrate(&self) -> f64 {
        let mut slowest = f64::INFINITY;
        for axis in self.axes.iter() {
            let max = self.max_feedrates.axis(axis);
            if max > 0.0 {
                slowest = slowest.min(max);
            }
        }
        if slowest.is_finite() {
            slowest
        } else {
            // Unconfigured profile. Crawl.
            60.0
        }
    }

    pub fn current_tool_index(&self) -> usize {
        self.current_tool
    }

    /// Select a tool by index. Out-of-range indices are ignored so a
    /// stray T word cannot poison later tool lookups.
    pub fn select_tool(&mut self, index: usize) {
        if index < self.tools.len() {
            self.current_tool = index;
        }
    }

    pub fn tool(&self, index: usize) -> Option<&ToolModel> {
        self.tools.get(index)
    }

    pub fn current_tool(&self) -> Option<&ToolModel> {
        self.tools.get(self.current_tool)
    }

    pub fn tool_state(&self, index: usize) -> Option<&ToolState> {
        self.tool_states.get(index)
    }

    pub fn tool_state_mut(&mut self, index: usize) -> Option<&mut ToolState> {
        self.tool_states.get_mut(index)
    }

    pub fn current_tool_state(&self) -> &ToolState {
        &self.tool_states[self.current_tool]
    }

    pub fn current_tool_state_mut(&mut self) -> &mut ToolState {
        &mut self.tool_states[self.current_tool]
    }

    /// Axes currently hijacked by tools with running state.
    pub fn hijacked_axes(&self) -> AxisSet {
        let mut set = AxisSet::EMPTY;
        for tool in &self.tools {
            if let Some(axis) = tool.hijacked_axis {
                set.insert(axis);
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> MachineModel {
        MachineModel::new(
            "test".into(),
            BoardVariant::Gen4,
            AxisSet::of(&[Axis::X, Axis::Y, Axis::Z]),
            Point5d::new(47.06, 47.06, 200.0, 50.0, 50.0),
            Point5d::new(5000.0, 5000.0, 150.0, 0.0, 0.0),
            vec![ToolModel {
                index: 0,
                name: "extruder".into(),
                motor_steps_per_rev: 200.0,
                hijacked_axis: None,
                has_platform: true,
            }],
        )
    }

    #[test]
    fn feedrate_clamped_by_slowest_moving_axis() {
        let m = model();
        let xy_only = Point5d::xyz(10.0, 10.0, 0.0);
        assert_eq!(m.clamp_feedrate(&xy_only, 9000.0), 5000.0);
        let with_z = Point5d::xyz(10.0, 0.0, 1.0);
        assert_eq!(m.clamp_feedrate(&with_z, 9000.0), 150.0);
        assert_eq!(m.clamp_feedrate(&with_z, 100.0), 100.0);
    }

    #[test]
    fn out_of_range_tool_select_ignored() {
        let mut m = model();
        m.select_tool(7);
        assert_eq!(m.current_tool_index(), 0);
    }

    #[test]
    fn steps_round_to_nearest() {
        let m = model();
        let steps = m.mm_to_steps(&Point5d::xyz(1.0, -1.0, 0.1));
        assert_eq!(steps.x, 47.0);
        assert_eq!(steps.y, -47.0);
        assert_eq!(steps.z, 20.0);
    }
}

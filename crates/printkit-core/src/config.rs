//! Machine profiles.
//!
//! A profile is a JSON document describing one printer: board variant,
//! axis geometry, tools, serial parameters, and the G-code brackets run
//! around every build.

use crate::error::Result;
use crate::geometry::{Axis, AxisSet, Point5d};
use crate::model::{BoardVariant, MachineModel, ToolModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serial link parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name, e.g. `/dev/ttyUSB0`. `None` means auto-scan.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Per-exchange response timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baud() -> u32 {
    38400
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: None,
            baud: default_baud(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// A machine profile as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    pub name: String,
    pub board: BoardVariant,
    /// Axes the machine drives, e.g. `["X", "Y", "Z"]`.
    pub axes: Vec<Axis>,
    pub steps_per_mm: Point5d,
    /// Per-axis maximum feed rates, mm/min. Zero means unconstrained.
    pub max_feedrates: Point5d,
    #[serde(default)]
    pub tools: Vec<ToolModel>,
    #[serde(default)]
    pub serial: SerialConfig,
    /// G-code run before the first build line.
    #[serde(default)]
    pub warmup_gcode: Vec<String>,
    /// G-code run after the last build line has drained.
    #[serde(default)]
    pub cooldown_gcode: Vec<String>,
    /// Whether M1 optional stops pause the build.
    #[serde(default)]
    pub optional_stops: bool,
}

impl MachineConfig {
    /// Load a profile from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: MachineConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Save this profile as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Build the runtime machine model for this profile.
    pub fn build_model(&self) -> MachineModel {
        let tools = if self.tools.is_empty() {
            // A machine with no tool section still has one extruder.
            vec![ToolModel {
                index: 0,
                name: "default".into(),
                motor_steps_per_rev: 200.0,
                hijacked_axis: None,
                has_platform: false,
            }]
        } else {
            self.tools.clone()
        };
        MachineModel::new(
            self.name.clone(),
            self.board,
            AxisSet::of(&self.axes),
            self.steps_per_mm,
            self.max_feedrates,
            tools,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MachineConfig {
        MachineConfig {
            name: "cupcake".into(),
            board: BoardVariant::Gen3,
            axes: vec![Axis::X, Axis::Y, Axis::Z],
            steps_per_mm: Point5d::new(11.77, 11.77, 320.0, 50.0, 50.0),
            max_feedrates: Point5d::new(5000.0, 5000.0, 150.0, 0.0, 0.0),
            tools: vec![],
            serial: SerialConfig::default(),
            warmup_gcode: vec!["M104 S220".into()],
            cooldown_gcode: vec!["M104 S0".into()],
            optional_stops: false,
        }
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cupcake.json");
        let config = sample();
        config.save(&path).unwrap();
        let loaded = MachineConfig::load(&path).unwrap();
        assert_eq!(loaded.name, "cupcake");
        assert_eq!(loaded.board, BoardVariant::Gen3);
        assert_eq!(loaded.warmup_gcode, vec!["M104 S220".to_string()]);
        assert_eq!(loaded.serial.baud, 38400);
    }

    #[test]
    fn missing_sections_default() {
        let json = r#"{
            "name": "minimal",
            "board": "Gen4",
            "axes": ["X", "Y", "Z"],
            "steps_per_mm": {"x": 47.06, "y": 47.06, "z": 200.0, "a": 50.0, "b": 50.0},
            "max_feedrates": {"x": 5000.0, "y": 5000.0, "z": 150.0, "a": 0.0, "b": 0.0}
        }"#;
        let config: MachineConfig = serde_json::from_str(json).unwrap();
        assert!(config.tools.is_empty());
        assert!(config.serial.port.is_none());
        assert!(!config.optional_stops);
        let model = config.build_model();
        assert_eq!(model.tools.len(), 1);
    }
}

//! Hardware-free drivers.
//!
//! [`SimulationDriver`] mirrors a build without a machine: it applies
//! every command to the model, records the operation stream, and backs
//! EEPROM with a map. [`EstimationDriver`] only accounts time, for the
//! pre-build duration estimate.

use crate::driver::{Driver, HomingDirection};
use crate::version::FirmwareVersion;
use parking_lot::Mutex;
use printkit_core::{AxisSet, MachineModel, Point5d, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One recorded driver operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedOp {
    QueuePoint(Point5d),
    SetPosition(Point5d),
    HomeAxes(AxisSet, HomingDirection),
    Delay(u64),
    SelectTool(u8),
    WaitForTool(u8),
    SetMotorRpm(f64),
    SetMotorPwm(u8),
    MotorEnabled(bool),
    SetTemperature(f64),
    SetPlatformTemperature(f64),
    FanEnabled(bool),
    ValveOpen(bool),
    DrivesEnabled(bool),
    Stop,
    Reset,
    DisplayMessage(String),
}

/// Shared handle onto a simulation's operation stream.
///
/// Clones observe the same log, so a test can keep a handle after the
/// driver itself has been boxed behind the machine facade.
#[derive(Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<SimulatedOp>>>);

impl OpLog {
    pub fn snapshot(&self) -> Vec<SimulatedOp> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn push(&self, op: SimulatedOp) {
        self.0.lock().push(op);
    }
}

/// A driver that executes against the model alone.
pub struct SimulationDriver {
    model: MachineModel,
    position: Option<Point5d>,
    feedrate: f64,
    initialized: bool,
    ops: OpLog,
    eeprom: HashMap<u16, u8>,
}

impl SimulationDriver {
    pub fn new(model: MachineModel) -> Self {
        SimulationDriver {
            model,
            position: None,
            feedrate: 0.0,
            initialized: false,
            ops: OpLog::default(),
            eeprom: HashMap::new(),
        }
    }

    /// Everything executed so far, in order.
    pub fn ops(&self) -> Vec<SimulatedOp> {
        self.ops.snapshot()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// A handle that keeps reading the log after the driver moves away.
    pub fn op_log(&self) -> OpLog {
        self.ops.clone()
    }
}

impl Driver for SimulationDriver {
    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        self.position = None;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn firmware_version(&self) -> Option<FirmwareVersion> {
        // Simulated firmware carries every capability.
        Some(FirmwareVersion::new(9, 9))
    }

    fn model(&self) -> &MachineModel {
        &self.model
    }

    fn model_mut(&mut self) -> &mut MachineModel {
        &mut self.model
    }

    fn set_feedrate(&mut self, mm_per_min: f64) {
        self.feedrate = mm_per_min;
    }

    fn feedrate(&self) -> f64 {
        self.feedrate
    }

    fn queue_point(&mut self, target: Point5d) -> Result<()> {
        self.ops.push(SimulatedOp::QueuePoint(target));
        self.position = Some(target);
        Ok(())
    }

    fn set_current_position(&mut self, position: Point5d) -> Result<()> {
        self.ops.push(SimulatedOp::SetPosition(position));
        self.position = Some(position);
        Ok(())
    }

    fn current_position(&mut self) -> Result<Point5d> {
        Ok(self.position.unwrap_or(Point5d::ZERO))
    }

    fn invalidate_position(&mut self) {
        self.position = None;
    }

    fn position_known(&self) -> bool {
        self.position.is_some()
    }

    fn home_axes(&mut self, axes: AxisSet, direction: HomingDirection) -> Result<()> {
        self.ops.push(SimulatedOp::HomeAxes(axes, direction));
        // Homing lands on the limit switches; call that zero.
        let mut p = self.position.unwrap_or(Point5d::ZERO);
        for axis in axes.iter() {
            p.set_axis(axis, 0.0);
        }
        self.position = Some(p);
        Ok(())
    }

    fn delay(&mut self, millis: u64) -> Result<()> {
        self.ops.push(SimulatedOp::Delay(millis));
        Ok(())
    }

    fn select_tool(&mut self, index: u8) -> Result<()> {
        self.ops.push(SimulatedOp::SelectTool(index));
        self.model.select_tool(index as usize);
        Ok(())
    }

    fn request_tool_change(&mut self, index: u8) -> Result<()> {
        self.select_tool(index)?;
        self.ops.push(SimulatedOp::WaitForTool(index));
        Ok(())
    }

    fn set_motor_rpm(&mut self, rpm: f64) -> Result<()> {
        self.ops.push(SimulatedOp::SetMotorRpm(rpm));
        self.model.current_tool_state_mut().motor_rpm = rpm;
        Ok(())
    }

    fn set_motor_pwm(&mut self, pwm: u8) -> Result<()> {
        self.ops.push(SimulatedOp::SetMotorPwm(pwm));
        self.model.current_tool_state_mut().motor_pwm = pwm;
        Ok(())
    }

    fn set_motor_direction(&mut self, clockwise: bool) -> Result<()> {
        self.model.current_tool_state_mut().motor_clockwise = clockwise;
        Ok(())
    }

    fn enable_motor(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::MotorEnabled(true));
        self.model.current_tool_state_mut().motor_enabled = true;
        Ok(())
    }

    fn disable_motor(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::MotorEnabled(false));
        self.model.current_tool_state_mut().motor_enabled = false;
        Ok(())
    }

    fn set_temperature(&mut self, celsius: f64) -> Result<()> {
        self.ops.push(SimulatedOp::SetTemperature(celsius));
        let state = self.model.current_tool_state_mut();
        state.target_temperature = celsius;
        // The simulated heater is instant.
        state.current_temperature = celsius;
        Ok(())
    }

    fn read_temperature(&mut self) -> Result<f64> {
        Ok(self.model.current_tool_state().current_temperature)
    }

    fn set_platform_temperature(&mut self, celsius: f64) -> Result<()> {
        self.ops.push(SimulatedOp::SetPlatformTemperature(celsius));
        let state = self.model.current_tool_state_mut();
        state.platform_target_temperature = celsius;
        state.platform_current_temperature = celsius;
        Ok(())
    }

    fn read_platform_temperature(&mut self) -> Result<f64> {
        Ok(self.model.current_tool_state().platform_current_temperature)
    }

    fn enable_fan(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::FanEnabled(true));
        self.model.current_tool_state_mut().fan_enabled = true;
        Ok(())
    }

    fn disable_fan(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::FanEnabled(false));
        self.model.current_tool_state_mut().fan_enabled = false;
        Ok(())
    }

    fn open_valve(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::ValveOpen(true));
        self.model.current_tool_state_mut().valve_open = true;
        Ok(())
    }

    fn close_valve(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::ValveOpen(false));
        self.model.current_tool_state_mut().valve_open = false;
        Ok(())
    }

    fn enable_drives(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::DrivesEnabled(true));
        Ok(())
    }

    fn disable_drives(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::DrivesEnabled(false));
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn stop(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::Stop);
        self.position = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.ops.push(SimulatedOp::Reset);
        self.position = None;
        Ok(())
    }

    fn read_eeprom(&mut self, offset: u16, len: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len as usize);
        for i in 0..len as u16 {
            out.push(self.eeprom.get(&(offset + i)).copied().unwrap_or(0xff));
        }
        Ok(out)
    }

    fn write_eeprom(&mut self, offset: u16, data: &[u8]) -> Result<()> {
        for (i, &b) in data.iter().enumerate() {
            self.eeprom.insert(offset + i as u16, b);
        }
        Ok(())
    }

    fn display_message(&mut self, message: &str, _timeout_s: u8) -> Result<()> {
        self.ops.push(SimulatedOp::DisplayMessage(message.to_string()));
        Ok(())
    }
}

/// Accumulates how long a command stream would take on the machine.
pub struct EstimationDriver {
    model: MachineModel,
    position: Option<Point5d>,
    feedrate: f64,
    total: Duration,
    commands: usize,
}

impl EstimationDriver {
    pub fn new(model: MachineModel) -> Self {
        EstimationDriver {
            model,
            position: None,
            feedrate: 0.0,
            total: Duration::ZERO,
            commands: 0,
        }
    }

    /// Accumulated build time.
    pub fn estimate(&self) -> Duration {
        self.total
    }

    pub fn command_count(&self) -> usize {
        self.commands
    }

    fn account(&mut self, seconds: f64) {
        self.commands += 1;
        if seconds.is_finite() && seconds > 0.0 {
            self.total += Duration::from_secs_f64(seconds);
        }
    }
}

impl Driver for EstimationDriver {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn firmware_version(&self) -> Option<FirmwareVersion> {
        Some(FirmwareVersion::new(9, 9))
    }

    fn model(&self) -> &MachineModel {
        &self.model
    }

    fn model_mut(&mut self) -> &mut MachineModel {
        &mut self.model
    }

    fn set_feedrate(&mut self, mm_per_min: f64) {
        self.feedrate = mm_per_min;
    }

    fn feedrate(&self) -> f64 {
        self.feedrate
    }

    fn queue_point(&mut self, target: Point5d) -> Result<()> {
        let current = self.position.unwrap_or(Point5d::ZERO);
        let delta = target - current;
        let distance = {
            let d = delta.xyz_length();
            if d > 0.0 {
                d
            } else {
                delta.longest()
            }
        };
        let feedrate = if self.feedrate > 0.0 {
            self.model.clamp_feedrate(&delta, self.feedrate)
        } else {
            self.model.safe_feedrate()
        };
        self.account(distance / feedrate * 60.0);
        self.position = Some(target);
        Ok(())
    }

    fn set_current_position(&mut self, position: Point5d) -> Result<()> {
        self.commands += 1;
        self.position = Some(position);
        Ok(())
    }

    fn current_position(&mut self) -> Result<Point5d> {
        Ok(self.position.unwrap_or(Point5d::ZERO))
    }

    fn invalidate_position(&mut self) {
        self.position = None;
    }

    fn position_known(&self) -> bool {
        self.position.is_some()
    }

    fn home_axes(&mut self, axes: AxisSet, _direction: HomingDirection) -> Result<()> {
        // No way to know how far the carriage is from the switch;
        // charge a flat guess.
        self.account(5.0);
        let mut p = self.position.unwrap_or(Point5d::ZERO);
        for axis in axes.iter() {
            p.set_axis(axis, 0.0);
        }
        self.position = Some(p);
        Ok(())
    }

    fn delay(&mut self, millis: u64) -> Result<()> {
        self.account(millis as f64 / 1000.0);
        Ok(())
    }

    fn select_tool(&mut self, index: u8) -> Result<()> {
        self.commands += 1;
        self.model.select_tool(index as usize);
        Ok(())
    }

    fn request_tool_change(&mut self, index: u8) -> Result<()> {
        self.model.select_tool(index as usize);
        // Nominal settle time for the head swap.
        self.account(1.0);
        Ok(())
    }

    fn set_motor_rpm(&mut self, rpm: f64) -> Result<()> {
        self.commands += 1;
        self.model.current_tool_state_mut().motor_rpm = rpm;
        Ok(())
    }

    fn set_motor_pwm(&mut self, pwm: u8) -> Result<()> {
        self.commands += 1;
        self.model.current_tool_state_mut().motor_pwm = pwm;
        Ok(())
    }

    fn set_motor_direction(&mut self, clockwise: bool) -> Result<()> {
        self.model.current_tool_state_mut().motor_clockwise = clockwise;
        Ok(())
    }

    fn enable_motor(&mut self) -> Result<()> {
        self.commands += 1;
        self.model.current_tool_state_mut().motor_enabled = true;
        Ok(())
    }

    fn disable_motor(&mut self) -> Result<()> {
        self.commands += 1;
        self.model.current_tool_state_mut().motor_enabled = false;
        Ok(())
    }

    fn set_temperature(&mut self, celsius: f64) -> Result<()> {
        self.commands += 1;
        self.model.current_tool_state_mut().target_temperature = celsius;
        Ok(())
    }

    fn read_temperature(&mut self) -> Result<f64> {
        Ok(self.model.current_tool_state().current_temperature)
    }

    fn set_platform_temperature(&mut self, celsius: f64) -> Result<()> {
        self.commands += 1;
        self.model.current_tool_state_mut().platform_target_temperature = celsius;
        Ok(())
    }

    fn read_platform_temperature(&mut self) -> Result<f64> {
        Ok(self
            .model
            .current_tool_state()
            .platform_current_temperature)
    }

    fn enable_fan(&mut self) -> Result<()> {
        self.commands += 1;
        Ok(())
    }

    fn disable_fan(&mut self) -> Result<()> {
        self.commands += 1;
        Ok(())
    }

    fn open_valve(&mut self) -> Result<()> {
        self.commands += 1;
        Ok(())
    }

    fn close_valve(&mut self) -> Result<()> {
        self.commands += 1;
        Ok(())
    }

    fn enable_drives(&mut self) -> Result<()> {
        self.commands += 1;
        Ok(())
    }

    fn disable_drives(&mut self) -> Result<()> {
        self.commands += 1;
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn stop(&mut self) -> Result<()> {
        self.position = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.position = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printkit_core::{Axis, BoardVariant, ToolModel};

    fn model() -> MachineModel {
        MachineModel::new(
            "sim".into(),
            BoardVariant::Gen4,
            AxisSet::of(&[Axis::X, Axis::Y, Axis::Z]),
            Point5d::new(10.0, 10.0, 100.0, 50.0, 50.0),
            Point5d::new(3000.0, 3000.0, 150.0, 1000.0, 1000.0),
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
    fn simulation_records_and_tracks_position() {
        let mut d = SimulationDriver::new(model());
        d.initialize().unwrap();
        d.queue_point(Point5d::xyz(5.0, 0.0, 0.0)).unwrap();
        d.delay(250).unwrap();
        d.set_temperature(220.0).unwrap();
        assert_eq!(d.current_position().unwrap(), Point5d::xyz(5.0, 0.0, 0.0));
        assert_eq!(
            d.ops(),
            &[
                SimulatedOp::QueuePoint(Point5d::xyz(5.0, 0.0, 0.0)),
                SimulatedOp::Delay(250),
                SimulatedOp::SetTemperature(220.0),
            ]
        );
        assert_eq!(d.read_temperature().unwrap(), 220.0);
    }

    #[test]
    fn simulated_eeprom_roundtrips() {
        let mut d = SimulationDriver::new(model());
        d.write_eeprom(0x20, b"frosty").unwrap();
        assert_eq!(d.read_eeprom(0x20, 6).unwrap(), b"frosty");
        // Unwritten cells read as erased flash.
        assert_eq!(d.read_eeprom(0x100, 2).unwrap(), vec![0xff, 0xff]);
    }

    #[test]
    fn estimation_sums_moves_and_dwells() {
        let mut d = EstimationDriver::new(model());
        d.set_current_position(Point5d::ZERO).unwrap();
        d.set_feedrate(600.0);
        // 10mm at 600mm/min is one second.
        d.queue_point(Point5d::xyz(10.0, 0.0, 0.0)).unwrap();
        d.delay(500).unwrap();
        assert_eq!(d.estimate(), Duration::from_millis(1500));
        assert_eq!(d.command_count(), 3);
    }

    #[test]
    fn estimation_clamps_to_axis_maximum() {
        let mut d = EstimationDriver::new(model());
        d.set_current_position(Point5d::ZERO).unwrap();
        d.set_feedrate(99_000.0);
        // Z maximum is 150mm/min, so 15mm takes 6 seconds.
        d.queue_point(Point5d::xyz(0.0, 0.0, 15.0)).unwrap();
        assert_eq!(d.estimate(), Duration::from_secs(6));
    }
}

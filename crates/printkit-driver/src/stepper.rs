//! Hardware driver for Gen3/Gen4 motion boards.
//!
//! Translates the [`Driver`] contract into wire frames run through a
//! [`CommandExecutor`]. Board differences are matched on the model's
//! [`BoardVariant`]:
//!
//! - `Gen3` queues three-axis points with a per-step interval.
//! - `Gen4` queues five-axis points, capability gated.
//! - `Gen4Alternate` has no DC extruder motor; each extruder has seized
//!   a stepper axis, and its travel is derived from the commanded RPM
//!   over the move's duration.

use crate::commands::{MotherboardCommand, ToolCommand};
use crate::driver::{Driver, HomingDirection};
use crate::version::{require_capability, Capability, FirmwareVersion};
use printkit_core::{
    Axis, AxisSet, BoardVariant, DriverError, MachineModel, Point5d, Result,
};
use printkit_protocol::{CommandExecutor, PacketBuilder, PacketResponse, ResponseCode};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Host protocol version sent in the handshake.
const HOST_VERSION: u16 = 200;

/// Oldest firmware this driver talks to at all.
const MINIMUM_VERSION: FirmwareVersion = FirmwareVersion::new(1, 1);

/// Homing timeout handed to the firmware, in seconds.
const HOMING_TIMEOUT_S: u16 = 300;

/// Tool-change readiness poll interval and give-up timeout.
const TOOL_PING_MS: u16 = 100;
const TOOL_TIMEOUT_S: u16 = 120;

/// Largest tool EEPROM span per slave-bus transaction.
const TOOL_EEPROM_CHUNK: usize = 11;

/// Driver for the Gen3/Gen4 motherboard families.
pub struct StepperDriver {
    executor: Arc<CommandExecutor>,
    model: MachineModel,
    version: Option<FirmwareVersion>,
    position: Option<Point5d>,
    feedrate: f64,
    initialized: bool,
    extruder_pwm_primed: bool,
    finished_unsupported_noticed: bool,
}

impl StepperDriver {
    pub fn new(executor: Arc<CommandExecutor>, model: MachineModel) -> Self {
        StepperDriver {
            executor,
            model,
            version: None,
            position: None,
            feedrate: 0.0,
            initialized: false,
            extruder_pwm_primed: false,
            finished_unsupported_noticed: false,
        }
    }

    /// One silent version query, for port scanning. `Ok(None)` means
    /// nothing answered; hard serial errors still propagate.
    pub fn probe(executor: &CommandExecutor) -> Result<Option<FirmwareVersion>> {
        let mut pb = PacketBuilder::new(MotherboardCommand::Version.code());
        pb.add_u16(HOST_VERSION);
        let mut response = executor.run_with_retries(&pb.finish()?, -1)?;
        if !response.is_ok() {
            return Ok(None);
        }
        let wire = response.read_u16();
        if wire == 0 {
            return Ok(None);
        }
        Ok(Some(FirmwareVersion::from_wire(wire)))
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(DriverError::NotInitialized.into())
        }
    }

    /// Run a frame and require an accepting response code.
    fn run_checked(&self, frame: &[u8], what: &str) -> Result<PacketResponse> {
        let response = self.executor.run(frame)?;
        match response.code() {
            code if code.is_ok() => Ok(response),
            ResponseCode::Unsupported => Err(DriverError::UnsupportedCommand {
                command: what.to_string(),
            }
            .into()),
            code => Err(DriverError::CommandFailed {
                command: what.to_string(),
                code: code.to_string(),
            }
            .into()),
        }
    }

    fn tool_command_frame(&self, tool: u8, command: ToolCommand, payload: &[u8]) -> Result<Vec<u8>> {
        let mut pb = PacketBuilder::new(MotherboardCommand::ToolCommand.code());
        pb.add_u8(tool)
            .add_u8(command.code())
            .add_u8(payload.len() as u8)
            .add_bytes(payload);
        pb.finish()
    }

    fn tool_query_frame(&self, tool: u8, command: ToolCommand, args: &[u8]) -> Result<Vec<u8>> {
        let mut pb = PacketBuilder::new(MotherboardCommand::ToolQuery.code());
        pb.add_u8(tool).add_u8(command.code()).add_bytes(args);
        pb.finish()
    }

    fn current_tool_index(&self) -> u8 {
        self.model.current_tool_index() as u8
    }

    fn steps_to_mm(&self, steps: Point5d) -> Point5d {
        let mut mm = Point5d::ZERO;
        for axis in Axis::ALL {
            let spm = self.model.steps_per_mm.axis(axis);
            if spm > 0.0 {
                mm.set_axis(axis, steps.axis(axis) / spm);
            }
        }
        mm
    }

    /// Feed rate to use for a move: the commanded rate, or the safe
    /// default before any F word, clamped per moving axis.
    fn effective_feedrate(&self, delta: &Point5d) -> f64 {
        let requested = if self.feedrate > 0.0 {
            self.feedrate
        } else {
            self.model.safe_feedrate()
        };
        self.model.clamp_feedrate(delta, requested)
    }

    /// Step interval in microseconds of the most-stepping axis.
    fn dda_interval_micros(delta_mm: &Point5d, delta_steps: &Point5d, feedrate: f64) -> u32 {
        // Feed rates describe carriage motion; an aux-only move falls
        // back to its longest component.
        let distance = {
            let d = delta_mm.xyz_length();
            if d > 0.0 {
                d
            } else {
                delta_mm.longest()
            }
        };
        let master_steps = delta_steps.longest();
        let micros = distance / feedrate * 60.0 * 1_000_000.0;
        (micros / master_steps).round().max(1.0) as u32
    }

    /// Slowest per-step interval the machine profile allows, used when
    /// moving from an unknown position.
    fn slowest_dda(&self) -> u32 {
        let mut slowest = 0.0f64;
        for axis in self.model.axes.iter() {
            let max = self.model.max_feedrates.axis(axis);
            let spm = self.model.steps_per_mm.axis(axis);
            if max > 0.0 && spm > 0.0 {
                slowest = slowest.max(60.0 * 1_000_000.0 / (max * spm));
            }
        }
        if slowest > 0.0 {
            slowest.round() as u32
        } else {
            2000
        }
    }

    /// Queue a move when the current position is unknown: no delta is
    /// computable, so the whole move runs at the slowest interval.
    fn queue_point_slow(&mut self, target: Point5d) -> Result<()> {
        let steps = self.model.mm_to_steps(&target);
        let dda = self.slowest_dda();
        debug!(%target, dda, "position unknown, queueing at slowest interval");
        let frame = match self.model.board {
            BoardVariant::Gen3 => {
                let mut pb = PacketBuilder::new(MotherboardCommand::QueuePointAbs.code());
                pb.add_i32(steps.x as i32)
                    .add_i32(steps.y as i32)
                    .add_i32(steps.z as i32)
                    .add_u32(dda);
                pb.finish()?
            }
            BoardVariant::Gen4 | BoardVariant::Gen4Alternate => {
                require_capability(self.version, Capability::ExtendedPointQueue)?;
                let mut pb = PacketBuilder::new(MotherboardCommand::QueuePointExt.code());
                pb.add_i32(steps.x as i32)
                    .add_i32(steps.y as i32)
                    .add_i32(steps.z as i32)
                    .add_i32(steps.a as i32)
                    .add_i32(steps.b as i32)
                    .add_u32(dda);
                pb.finish()?
            }
        };
        self.run_checked(&frame, "queue point")?;
        self.position = Some(target);
        Ok(())
    }

    fn queue_point_classic(&mut self, current: Point5d, target: Point5d, feedrate: f64) -> Result<()> {
        let steps = self.model.mm_to_steps(&target);
        let delta_steps = steps - self.model.mm_to_steps(&current);
        if delta_steps.longest() == 0.0 {
            // Sub-step move. Track it but send nothing.
            self.position = Some(target);
            return Ok(());
        }
        let dda = Self::dda_interval_micros(&(target - current), &delta_steps, feedrate);
        let mut pb = PacketBuilder::new(MotherboardCommand::QueuePointAbs.code());
        pb.add_i32(steps.x as i32)
            .add_i32(steps.y as i32)
            .add_i32(steps.z as i32)
            .add_u32(dda);
        self.run_checked(&pb.finish()?, "queue point")?;
        self.position = Some(target);
        Ok(())
    }

    fn queue_point_extended(&mut self, current: Point5d, target: Point5d, feedrate: f64) -> Result<()> {
        require_capability(self.version, Capability::ExtendedPointQueue)?;
        let steps = self.model.mm_to_steps(&target);
        let delta_steps = steps - self.model.mm_to_steps(&current);
        if delta_steps.longest() == 0.0 {
            self.position = Some(target);
            return Ok(());
        }
        let dda = Self::dda_interval_micros(&(target - current), &delta_steps, feedrate);
        let mut pb = PacketBuilder::new(MotherboardCommand::QueuePointExt.code());
        pb.add_i32(steps.x as i32)
            .add_i32(steps.y as i32)
            .add_i32(steps.z as i32)
            .add_i32(steps.a as i32)
            .add_i32(steps.b as i32)
            .add_u32(dda);
        self.run_checked(&pb.finish()?, "queue point")?;
        self.position = Some(target);
        Ok(())
    }

    /// Alternate-extrusion queueing: hijacked axes ignore geometry and
    /// travel by however much filament their motor feeds during the
    /// move. Their fields carry this move's steps only, flagged
    /// relative in the trailing bitmask, so the extruder coordinate
    /// never accumulates on the wire.
    fn queue_point_hijacked(&mut self, current: Point5d, target: Point5d, feedrate: f64) -> Result<()> {
        require_capability(self.version, Capability::ExtendedPointQueue)?;
        let mut goal = target;
        let mut relative = 0u8;
        for tool in &self.model.tools {
            if let Some(axis) = tool.hijacked_axis {
                goal.set_axis(axis, current.axis(axis));
                relative |= axis.bit();
            }
        }
        let distance = (goal - current).xyz_length();
        let minutes = distance / feedrate;
        let mut feed_mm = Point5d::ZERO;
        let mut feed_steps = Point5d::ZERO;
        for tool in &self.model.tools {
            let Some(axis) = tool.hijacked_axis else {
                continue;
            };
            let Some(state) = self.model.tool_state(tool.index as usize) else {
                continue;
            };
            if state.motor_enabled && state.motor_rpm > 0.0 {
                let spm = self.model.steps_per_mm.axis(axis);
                if spm > 0.0 {
                    let direction = if state.motor_clockwise { -1.0 } else { 1.0 };
                    let mm = state.motor_rpm * tool.motor_steps_per_rev * minutes / spm * direction;
                    feed_mm.set_axis(axis, mm);
                    feed_steps.set_axis(axis, (mm * spm).round());
                }
            }
        }
        let mut steps = self.model.mm_to_steps(&goal);
        let delta_steps = steps - self.model.mm_to_steps(&current);
        for tool in &self.model.tools {
            if let Some(axis) = tool.hijacked_axis {
                steps.set_axis(axis, feed_steps.axis(axis));
            }
        }
        if delta_steps.longest() == 0.0 && feed_steps.longest() == 0.0 {
            self.position = Some(goal);
            return Ok(());
        }
        let duration = (minutes * 60.0 * 1_000_000.0).round().max(1.0) as u32;
        let mut pb = PacketBuilder::new(MotherboardCommand::QueuePointNew.code());
        pb.add_i32(steps.x as i32)
            .add_i32(steps.y as i32)
            .add_i32(steps.z as i32)
            .add_i32(steps.a as i32)
            .add_i32(steps.b as i32)
            .add_u32(duration)
            .add_u8(relative);
        self.run_checked(&pb.finish()?, "queue point")?;
        self.position = Some(goal + feed_mm);
        Ok(())
    }

    /// A dwell with a running hijacked extruder becomes a relative move
    /// of the hijacked axes alone, so filament keeps flowing. Returns
    /// `None` when no hijacked motor is running.
    fn hijacked_dwell_frame(&mut self, millis: u64) -> Result<Option<Vec<u8>>> {
        let minutes = millis as f64 / 60_000.0;
        let mut steps = Point5d::ZERO;
        let mut travel_mm = Point5d::ZERO;
        for tool in &self.model.tools {
            let Some(axis) = tool.hijacked_axis else {
                continue;
            };
            let Some(state) = self.model.tool_state(tool.index as usize) else {
                continue;
            };
            if state.motor_enabled && state.motor_rpm > 0.0 {
                let spm = self.model.steps_per_mm.axis(axis);
                if spm > 0.0 {
                    let direction = if state.motor_clockwise { -1.0 } else { 1.0 };
                    let mm = state.motor_rpm * tool.motor_steps_per_rev * minutes / spm * direction;
                    travel_mm.set_axis(axis, mm);
                    steps.set_axis(axis, (mm * spm).round());
                }
            }
        }
        if steps.longest() == 0.0 {
            return Ok(None);
        }
        let mut pb = PacketBuilder::new(MotherboardCommand::QueuePointNew.code());
        pb.add_i32(steps.x as i32)
            .add_i32(steps.y as i32)
            .add_i32(steps.z as i32)
            .add_i32(steps.a as i32)
            .add_i32(steps.b as i32)
            .add_u32((millis.saturating_mul(1000)).min(u32::MAX as u64) as u32)
            .add_u8(0x1f); // all axes relative
        if let Some(p) = self.position {
            self.position = Some(p + travel_mm);
        }
        Ok(Some(pb.finish()?))
    }

    /// Enable or disable the current extruder motor on the wire.
    /// Direction rides in bit 1 of the toggle flags.
    fn toggle_motor(&mut self, enabled: bool) -> Result<()> {
        self.ensure_initialized()?;
        let tool = self.current_tool_index();
        // Gen4 extruder steppers run at full current; prime the PWM
        // channel once before the first enable.
        if enabled
            && !self.extruder_pwm_primed
            && self.model.board != BoardVariant::Gen3
        {
            let frame = self.tool_command_frame(tool, ToolCommand::SetMotorPwm, &[255])?;
            self.run_checked(&frame, "set motor pwm")?;
            self.extruder_pwm_primed = true;
        }
        let clockwise = self.model.current_tool_state().motor_clockwise;
        let flags = (enabled as u8) | if clockwise { 2 } else { 0 };
        let frame = self.tool_command_frame(tool, ToolCommand::ToggleMotor, &[flags])?;
        self.run_checked(&frame, "toggle motor")?;
        self.model.current_tool_state_mut().motor_enabled = enabled;
        Ok(())
    }

    fn toggle(&mut self, command: ToolCommand, on: bool, what: &str) -> Result<()> {
        self.ensure_initialized()?;
        let tool = self.current_tool_index();
        let frame = self.tool_command_frame(tool, command, &[on as u8])?;
        self.run_checked(&frame, what)?;
        Ok(())
    }

    /// Read a span of a tool head's EEPROM, chunked to the slave bus
    /// transaction limit.
    pub fn read_tool_eeprom(&mut self, tool: u8, offset: u16, len: u8) -> Result<Vec<u8>> {
        self.ensure_initialized()?;
        let mut out = Vec::with_capacity(len as usize);
        let mut cursor = offset;
        let mut left = len as usize;
        while left > 0 {
            let chunk = left.min(TOOL_EEPROM_CHUNK) as u8;
            let mut args = cursor.to_le_bytes().to_vec();
            args.push(chunk);
            let frame = self.tool_query_frame(tool, ToolCommand::ReadEeprom, &args)?;
            let response = self.run_checked(&frame, "read tool EEPROM")?;
            let data = response.remaining();
            if data.len() < chunk as usize {
                return Err(DriverError::ShortReply {
                    command: "read tool EEPROM".into(),
                    expected: chunk as usize,
                    actual: data.len(),
                }
                .into());
            }
            out.extend_from_slice(&data[..chunk as usize]);
            cursor += chunk as u16;
            left -= chunk as usize;
        }
        Ok(out)
    }

    /// Write a span of a tool head's EEPROM, chunked like reads.
    pub fn write_tool_eeprom(&mut self, tool: u8, offset: u16, data: &[u8]) -> Result<()> {
        self.ensure_initialized()?;
        let mut cursor = offset;
        for chunk in data.chunks(TOOL_EEPROM_CHUNK) {
            let mut payload = cursor.to_le_bytes().to_vec();
            payload.push(chunk.len() as u8);
            payload.extend_from_slice(chunk);
            let frame = self.tool_command_frame(tool, ToolCommand::WriteEeprom, &payload)?;
            self.run_checked(&frame, "write tool EEPROM")?;
            cursor += chunk.len() as u16;
        }
        Ok(())
    }
}

impl Driver for StepperDriver {
    fn initialize(&mut self) -> Result<()> {
        let mut pb = PacketBuilder::new(MotherboardCommand::Version.code());
        pb.add_u16(HOST_VERSION);
        let mut response = self.run_checked(&pb.finish()?, "version query")?;
        let wire = response.read_u16();
        if wire == 0 {
            return Err(DriverError::Other {
                message: "firmware reported version 0".into(),
            }
            .into());
        }
        let version = FirmwareVersion::from_wire(wire);
        if version < MINIMUM_VERSION {
            return Err(DriverError::BadFirmwareVersion {
                actual: version.to_string(),
                required: MINIMUM_VERSION.to_string(),
            }
            .into());
        }
        info!(%version, board = %self.model.board, link = %self.executor.link_name(), "firmware online");
        self.version = Some(version);

        let init = PacketBuilder::new(MotherboardCommand::Init.code()).finish()?;
        self.run_checked(&init, "init")?;
        self.initialized = true;
        self.position = None;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn firmware_version(&self) -> Option<FirmwareVersion> {
        self.version
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
        self.ensure_initialized()?;
        let Some(current) = self.position else {
            return self.queue_point_slow(target);
        };
        let feedrate = self.effective_feedrate(&(target - current));
        match self.model.board {
            BoardVariant::Gen3 => self.queue_point_classic(current, target, feedrate),
            BoardVariant::Gen4 => self.queue_point_extended(current, target, feedrate),
            BoardVariant::Gen4Alternate => self.queue_point_hijacked(current, target, feedrate),
        }
    }

    fn set_current_position(&mut self, position: Point5d) -> Result<()> {
        self.ensure_initialized()?;
        let steps = self.model.mm_to_steps(&position);
        let frame = match self.model.board {
            BoardVariant::Gen3 => {
                let mut pb = PacketBuilder::new(MotherboardCommand::SetPosition.code());
                pb.add_i32(steps.x as i32)
                    .add_i32(steps.y as i32)
                    .add_i32(steps.z as i32);
                pb.finish()?
            }
            BoardVariant::Gen4 | BoardVariant::Gen4Alternate => {
                require_capability(self.version, Capability::ExtendedPointQueue)?;
                let mut pb = PacketBuilder::new(MotherboardCommand::SetPositionExt.code());
                pb.add_i32(steps.x as i32)
                    .add_i32(steps.y as i32)
                    .add_i32(steps.z as i32)
                    .add_i32(steps.a as i32)
                    .add_i32(steps.b as i32);
                pb.finish()?
            }
        };
        self.run_checked(&frame, "set position")?;
        self.position = Some(position);
        Ok(())
    }

    fn current_position(&mut self) -> Result<Point5d> {
        self.ensure_initialized()?;
        if let Some(p) = self.position {
            return Ok(p);
        }
        let mut steps = Point5d::ZERO;
        match self.model.board {
            BoardVariant::Gen3 => {
                let frame = PacketBuilder::new(MotherboardCommand::GetPosition.code()).finish()?;
                let mut r = self.run_checked(&frame, "get position")?;
                steps.x = r.read_i32() as f64;
                steps.y = r.read_i32() as f64;
                steps.z = r.read_i32() as f64;
                let _endstops = r.read_u8();
            }
            BoardVariant::Gen4 | BoardVariant::Gen4Alternate => {
                let frame =
                    PacketBuilder::new(MotherboardCommand::GetPositionExt.code()).finish()?;
                let mut r = self.run_checked(&frame, "get extended position")?;
                steps.x = r.read_i32() as f64;
                steps.y = r.read_i32() as f64;
                steps.z = r.read_i32() as f64;
                steps.a = r.read_i32() as f64;
                steps.b = r.read_i32() as f64;
                let _endstops = r.read_u16();
            }
        }
        let position = self.steps_to_mm(steps);
        debug!(%position, "reconciled position from firmware");
        self.position = Some(position);
        Ok(position)
    }

    fn invalidate_position(&mut self) {
        self.position = None;
    }

    fn position_known(&self) -> bool {
        self.position.is_some()
    }

    fn home_axes(&mut self, axes: AxisSet, direction: HomingDirection) -> Result<()> {
        self.ensure_initialized()?;
        if axes.is_empty() {
            return Ok(());
        }
        // Home at the slowest maximum among the homed axes; the step
        // interval is the slowest any of them needs at that rate.
        let mut feedrate = f64::INFINITY;
        for axis in axes.iter() {
            let max = self.model.max_feedrates.axis(axis);
            if max > 0.0 {
                feedrate = feedrate.min(max);
            }
        }
        if !feedrate.is_finite() {
            feedrate = self.model.safe_feedrate();
        }
        let mut dda = 0.0f64;
        for axis in axes.iter() {
            let spm = self.model.steps_per_mm.axis(axis);
            if spm > 0.0 {
                dda = dda.max(60.0 * 1_000_000.0 / (feedrate * spm));
            }
        }
        let command = match direction {
            HomingDirection::Minimum => MotherboardCommand::FindAxesMinimum,
            HomingDirection::Maximum => MotherboardCommand::FindAxesMaximum,
        };
        let mut pb = PacketBuilder::new(command.code());
        pb.add_u8(axes.bits())
            .add_u32(dda.round().max(1.0) as u32)
            .add_u16(HOMING_TIMEOUT_S);
        self.run_checked(&pb.finish()?, "home axes")?;
        // Wherever the carriage lands is firmware knowledge now.
        self.position = None;
        Ok(())
    }

    fn delay(&mut self, millis: u64) -> Result<()> {
        self.ensure_initialized()?;
        if self.model.board == BoardVariant::Gen4Alternate {
            if let Some(frame) = self.hijacked_dwell_frame(millis)? {
                self.run_checked(&frame, "extruding dwell")?;
                return Ok(());
            }
        }
        let mut pb = PacketBuilder::new(MotherboardCommand::Delay.code());
        pb.add_u32(millis.min(u32::MAX as u64) as u32);
        self.run_checked(&pb.finish()?, "delay")?;
        Ok(())
    }

    fn select_tool(&mut self, index: u8) -> Result<()> {
        self.ensure_initialized()?;
        if self.model.tool(index as usize).is_none() {
            return Err(DriverError::ToolNotFound { tool: index }.into());
        }
        let mut pb = PacketBuilder::new(MotherboardCommand::ChangeTool.code());
        pb.add_u8(index);
        self.run_checked(&pb.finish()?, "change tool")?;
        self.model.select_tool(index as usize);
        Ok(())
    }

    fn request_tool_change(&mut self, index: u8) -> Result<()> {
        self.select_tool(index)?;
        let mut pb = PacketBuilder::new(MotherboardCommand::WaitForTool.code());
        pb.add_u8(index).add_u16(TOOL_PING_MS).add_u16(TOOL_TIMEOUT_S);
        self.run_checked(&pb.finish()?, "wait for tool")?;
        Ok(())
    }

    fn set_motor_rpm(&mut self, rpm: f64) -> Result<()> {
        self.ensure_initialized()?;
        if self.model.board == BoardVariant::Gen3 {
            // Gen3 wants the period, microseconds per revolution.
            let micros = if rpm > 0.0 {
                (60.0 * 1_000_000.0 / rpm).round() as u32
            } else {
                0
            };
            let tool = self.current_tool_index();
            let frame =
                self.tool_command_frame(tool, ToolCommand::SetMotorRpm, &micros.to_le_bytes())?;
            self.run_checked(&frame, "set motor rpm")?;
        }
        // Gen4 boards extrude via hijacked axes; RPM only feeds the
        // travel computation in the model.
        self.model.current_tool_state_mut().motor_rpm = rpm;
        Ok(())
    }

    fn set_motor_pwm(&mut self, pwm: u8) -> Result<()> {
        self.ensure_initialized()?;
        if self.model.board == BoardVariant::Gen3 {
            let tool = self.current_tool_index();
            let frame = self.tool_command_frame(tool, ToolCommand::SetMotorPwm, &[pwm])?;
            self.run_checked(&frame, "set motor pwm")?;
        }
        self.model.current_tool_state_mut().motor_pwm = pwm;
        Ok(())
    }

    fn set_motor_direction(&mut self, clockwise: bool) -> Result<()> {
        // Direction travels with the next toggle.
        self.model.current_tool_state_mut().motor_clockwise = clockwise;
        Ok(())
    }

    fn enable_motor(&mut self) -> Result<()> {
        self.toggle_motor(true)
    }

    fn disable_motor(&mut self) -> Result<()> {
        self.toggle_motor(false)
    }

    fn set_temperature(&mut self, celsius: f64) -> Result<()> {
        self.ensure_initialized()?;
        let value = celsius.max(0.0).min(65535.0).round() as u16;
        let tool = self.current_tool_index();
        let frame =
            self.tool_command_frame(tool, ToolCommand::SetTemperature, &value.to_le_bytes())?;
        self.run_checked(&frame, "set temperature")?;
        self.model.current_tool_state_mut().target_temperature = celsius;
        Ok(())
    }

    fn read_temperature(&mut self) -> Result<f64> {
        self.ensure_initialized()?;
        let tool = self.current_tool_index();
        let frame = self.tool_query_frame(tool, ToolCommand::GetTemperature, &[])?;
        let mut response = self.run_checked(&frame, "get temperature")?;
        if response.len() < 2 {
            return Err(DriverError::ShortReply {
                command: "get temperature".into(),
                expected: 2,
                actual: response.len(),
            }
            .into());
        }
        let celsius = response.read_i16() as f64;
        self.model.current_tool_state_mut().current_temperature = celsius;
        Ok(celsius)
    }

    fn set_platform_temperature(&mut self, celsius: f64) -> Result<()> {
        self.ensure_initialized()?;
        let value = celsius.max(0.0).min(65535.0).round() as u16;
        let tool = self.current_tool_index();
        let frame = self.tool_command_frame(
            tool,
            ToolCommand::SetPlatformTemperature,
            &value.to_le_bytes(),
        )?;
        self.run_checked(&frame, "set platform temperature")?;
        self.model.current_tool_state_mut().platform_target_temperature = celsius;
        Ok(())
    }

    fn read_platform_temperature(&mut self) -> Result<f64> {
        self.ensure_initialized()?;
        let tool = self.current_tool_index();
        let frame = self.tool_query_frame(tool, ToolCommand::GetPlatformTemperature, &[])?;
        let mut response = self.run_checked(&frame, "get platform temperature")?;
        if response.len() < 2 {
            return Err(DriverError::ShortReply {
                command: "get platform temperature".into(),
                expected: 2,
                actual: response.len(),
            }
            .into());
        }
        let celsius = response.read_i16() as f64;
        self.model
            .current_tool_state_mut()
            .platform_current_temperature = celsius;
        Ok(celsius)
    }

    fn enable_fan(&mut self) -> Result<()> {
        self.toggle(ToolCommand::ToggleFan, true, "enable fan")?;
        self.model.current_tool_state_mut().fan_enabled = true;
        Ok(())
    }

    fn disable_fan(&mut self) -> Result<()> {
        self.toggle(ToolCommand::ToggleFan, false, "disable fan")?;
        self.model.current_tool_state_mut().fan_enabled = false;
        Ok(())
    }

    fn open_valve(&mut self) -> Result<()> {
        self.toggle(ToolCommand::ToggleValve, true, "open valve")?;
        self.model.current_tool_state_mut().valve_open = true;
        Ok(())
    }

    fn close_valve(&mut self) -> Result<()> {
        self.toggle(ToolCommand::ToggleValve, false, "close valve")?;
        self.model.current_tool_state_mut().valve_open = false;
        Ok(())
    }

    fn enable_drives(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let mut pb = PacketBuilder::new(MotherboardCommand::EnableAxes.code());
        pb.add_u8(0x87);
        self.run_checked(&pb.finish()?, "enable drives")?;
        Ok(())
    }

    fn disable_drives(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let mut pb = PacketBuilder::new(MotherboardCommand::EnableAxes.code());
        pb.add_u8(0x07);
        self.run_checked(&pb.finish()?, "disable drives")?;
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool> {
        self.ensure_initialized()?;
        let frame = PacketBuilder::new(MotherboardCommand::IsFinished.code()).finish()?;
        let mut response = self.executor.run(&frame)?;
        match response.code() {
            ResponseCode::Unsupported => {
                if !self.finished_unsupported_noticed {
                    warn!("firmware cannot report queue drain, assuming finished");
                    self.finished_unsupported_noticed = true;
                }
                Ok(true)
            }
            code if code.is_ok() => Ok(response.read_u8() != 0),
            code => Err(DriverError::CommandFailed {
                command: "is finished".into(),
                code: code.to_string(),
            }
            .into()),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let frame = PacketBuilder::new(MotherboardCommand::Abort.code()).finish()?;
        self.run_checked(&frame, "abort")?;
        // The firmware flushed its queue mid-move; the carriage is
        // wherever it was.
        self.position = None;
        for index in 0..self.model.tools.len() {
            if let Some(state) = self.model.tool_state_mut(index) {
                state.motor_enabled = false;
            }
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        require_capability(self.version, Capability::SoftReset)?;
        let frame = PacketBuilder::new(MotherboardCommand::Reset.code()).finish()?;
        self.run_checked(&frame, "soft reset")?;
        self.position = None;
        // The watchdog restart wipes firmware state; bring it back up.
        let init = PacketBuilder::new(MotherboardCommand::Init.code()).finish()?;
        self.run_checked(&init, "init")?;
        Ok(())
    }

    fn read_eeprom(&mut self, offset: u16, len: u8) -> Result<Vec<u8>> {
        require_capability(self.version, Capability::OnboardParameters)?;
        let mut pb = PacketBuilder::new(MotherboardCommand::ReadEeprom.code());
        pb.add_u16(offset).add_u8(len);
        let response = self.run_checked(&pb.finish()?, "read EEPROM")?;
        let data = response.remaining().to_vec();
        if data.len() < len as usize {
            return Err(DriverError::ShortReply {
                command: "read EEPROM".into(),
                expected: len as usize,
                actual: data.len(),
            }
            .into());
        }
        Ok(data)
    }

    fn write_eeprom(&mut self, offset: u16, data: &[u8]) -> Result<()> {
        require_capability(self.version, Capability::OnboardParameters)?;
        let mut pb = PacketBuilder::new(MotherboardCommand::WriteEeprom.code());
        pb.add_u16(offset).add_u8(data.len() as u8).add_bytes(data);
        let mut response = self.run_checked(&pb.finish()?, "write EEPROM")?;
        let written = response.read_u8() as usize;
        if written != data.len() {
            return Err(DriverError::Other {
                message: format!("EEPROM wrote {} of {} bytes", written, data.len()),
            }
            .into());
        }
        Ok(())
    }

    fn display_message(&mut self, message: &str, timeout_s: u8) -> Result<()> {
        if !self.has_capability(Capability::BuildNotifications) {
            return Ok(());
        }
        let mut pb = PacketBuilder::new(MotherboardCommand::DisplayMessage.code());
        let bytes = message.as_bytes();
        let bytes = &bytes[..bytes.len().min(240)];
        pb.add_u8(0) // options
            .add_u8(0) // x
            .add_u8(0) // y
            .add_u8(timeout_s)
            .add_bytes(bytes)
            .add_u8(0);
        self.run_checked(&pb.finish()?, "display message")?;
        Ok(())
    }

    fn build_start_notification(&mut self, name: &str, line_count: u32) -> Result<()> {
        if !self.has_capability(Capability::BuildNotifications) {
            return Ok(());
        }
        let mut pb = PacketBuilder::new(MotherboardCommand::BuildStartNotification.code());
        let bytes = name.as_bytes();
        let bytes = &bytes[..bytes.len().min(240)];
        pb.add_u32(line_count).add_bytes(bytes).add_u8(0);
        self.run_checked(&pb.finish()?, "build start notification")?;
        Ok(())
    }

    fn build_end_notification(&mut self) -> Result<()> {
        if !self.has_capability(Capability::BuildNotifications) {
            return Ok(());
        }
        let mut pb = PacketBuilder::new(MotherboardCommand::BuildEndNotification.code());
        pb.add_u8(0);
        self.run_checked(&pb.finish()?, "build end notification")?;
        Ok(())
    }

    fn set_build_percent(&mut self, percent: u8) -> Result<()> {
        if !self.has_capability(Capability::BuildNotifications) {
            return Ok(());
        }
        let mut pb = PacketBuilder::new(MotherboardCommand::SetBuildPercent.code());
        pb.add_u8(percent.min(100)).add_u8(0);
        self.run_checked(&pb.finish()?, "set build percent")?;
        Ok(())
    }
}

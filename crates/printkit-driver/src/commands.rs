//! Wire command codes.
//!
//! Two command spaces: motherboard commands addressed to the motion
//! controller, and tool commands relayed to a tool head. Tool commands
//! travel inside a `ToolQuery`/`ToolCommand` motherboard frame with the
//! tool index prepended.
//!
//! Codes below 128 are queries answered immediately; codes at 128 and
//! above enter the motion queue and may answer with buffer overflow.

/// Commands addressed to the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotherboardCommand {
    Version,
    Init,
    GetBufferSize,
    ClearBuffer,
    GetPosition,
    Abort,
    Pause,
    ToolQuery,
    IsFinished,
    ReadEeprom,
    WriteEeprom,
    Reset,
    GetPositionExt,
    QueuePointAbs,
    SetPosition,
    FindAxesMinimum,
    FindAxesMaximum,
    Delay,
    ChangeTool,
    WaitForTool,
    ToolCommand,
    EnableAxes,
    QueuePointExt,
    SetPositionExt,
    WaitForPlatform,
    QueuePointNew,
    DisplayMessage,
    SetBuildPercent,
    BuildStartNotification,
    BuildEndNotification,
}

impl MotherboardCommand {
    pub fn code(self) -> u8 {
        match self {
            MotherboardCommand::Version => 0,
            MotherboardCommand::Init => 1,
            MotherboardCommand::GetBufferSize => 2,
            MotherboardCommand::ClearBuffer => 3,
            MotherboardCommand::GetPosition => 4,
            MotherboardCommand::Abort => 7,
            MotherboardCommand::Pause => 8,
            MotherboardCommand::ToolQuery => 10,
            MotherboardCommand::IsFinished => 11,
            MotherboardCommand::ReadEeprom => 12,
            MotherboardCommand::WriteEeprom => 13,
            MotherboardCommand::Reset => 17,
            MotherboardCommand::GetPositionExt => 21,
            MotherboardCommand::QueuePointAbs => 129,
            MotherboardCommand::SetPosition => 130,
            MotherboardCommand::FindAxesMinimum => 131,
            MotherboardCommand::FindAxesMaximum => 132,
            MotherboardCommand::Delay => 133,
            MotherboardCommand::ChangeTool => 134,
            MotherboardCommand::WaitForTool => 135,
            MotherboardCommand::ToolCommand => 136,
            MotherboardCommand::EnableAxes => 137,
            MotherboardCommand::QueuePointExt => 139,
            MotherboardCommand::SetPositionExt => 140,
            MotherboardCommand::WaitForPlatform => 141,
            MotherboardCommand::QueuePointNew => 142,
            MotherboardCommand::DisplayMessage => 149,
            MotherboardCommand::SetBuildPercent => 150,
            MotherboardCommand::BuildStartNotification => 153,
            MotherboardCommand::BuildEndNotification => 154,
        }
    }
}

/// Commands relayed to a tool head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCommand {
    Version,
    Init,
    GetTemperature,
    SetTemperature,
    SetMotorPwm,
    SetMotorRpm,
    SetMotorDirection,
    ToggleMotor,
    ToggleFan,
    ToggleValve,
    IsToolReady,
    ReadEeprom,
    WriteEeprom,
    GetPlatformTemperature,
    SetPlatformTemperature,
}

impl ToolCommand {
    pub fn code(self) -> u8 {
        match self {
            ToolCommand::Version => 0,
            ToolCommand::Init => 1,
            ToolCommand::GetTemperature => 2,
            ToolCommand::SetTemperature => 3,
            ToolCommand::SetMotorPwm => 4,
            ToolCommand::SetMotorRpm => 6,
            ToolCommand::SetMotorDirection => 8,
            ToolCommand::ToggleMotor => 10,
            ToolCommand::ToggleFan => 12,
            ToolCommand::ToggleValve => 13,
            ToolCommand::IsToolReady => 22,
            ToolCommand::ReadEeprom => 25,
            ToolCommand::WriteEeprom => 26,
            ToolCommand::GetPlatformTemperature => 30,
            ToolCommand::SetPlatformTemperature => 31,
        }
    }
}

//! Serial port transport.
//!
//! Provides low-level serial port operations for direct hardware
//! connection to printer motherboards over USB or RS-232, plus port
//! enumeration for auto-scan.

use crate::transport::Transport;
use printkit_core::{ProtocolError, Result, SerialConfig};
use std::io::{Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that could plausibly be a printer link.
///
/// Filters to the device patterns printer boards enumerate as:
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => {
            let infos = ports
                .iter()
                .filter(|port| is_candidate_port(&port.port_name))
                .map(|port| {
                    let info = SerialPortInfo::new(&port.port_name, port_description(port));
                    match &port.port_type {
                        serialport::SerialPortType::UsbPort(usb) => {
                            let mut info = info.with_usb_ids(usb.vid, usb.pid);
                            if let Some(ref mfg) = usb.manufacturer {
                                info = info.with_manufacturer(mfg);
                            }
                            info
                        }
                        _ => info,
                    }
                })
                .collect();
            Ok(infos)
        }
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(ProtocolError::SerialError {
                reason: format!("failed to enumerate ports: {}", e),
            }
            .into())
        }
    }
}

fn is_candidate_port(port_name: &str) -> bool {
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }
    if port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem") {
        return true;
    }
    false
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            format!(
                "USB {} {}",
                usb.manufacturer.as_deref().unwrap_or("Device"),
                usb.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Real serial transport over the `serialport` crate.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Open a port with 8N1 framing and the configured baud rate.
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<Self> {
        let builder = serialport::new(port_name, config.baud)
            .timeout(Duration::from_millis(config.timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None);

        match builder.open() {
            Ok(port) => Ok(SerialTransport {
                port,
                name: port_name.to_string(),
            }),
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", port_name, e);
                Err(ProtocolError::FailedToOpen {
                    port: port_name.to_string(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame).map_err(|e| ProtocolError::SerialError {
            reason: e.to_string(),
        })?;
        self.port.flush().map_err(|e| ProtocolError::SerialError {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn recv_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(ProtocolError::SerialError {
                reason: e.to_string(),
            }
            .into()),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| ProtocolError::SerialError {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_port_patterns() {
        assert!(is_candidate_port("COM3"));
        assert!(is_candidate_port("/dev/ttyUSB0"));
        assert!(is_candidate_port("/dev/ttyACM1"));
        assert!(is_candidate_port("/dev/cu.usbmodem14101"));
        assert!(!is_candidate_port("/dev/ttyS0"));
        assert!(!is_candidate_port("COMX"));
        assert!(!is_candidate_port("/dev/random"));
    }
}

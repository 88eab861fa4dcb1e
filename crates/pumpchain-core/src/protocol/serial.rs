//! Serial port handling
//!
//! Low-level port discovery and setup for a pump chain. Pumps on a chain
//! talk 8 data bits, no parity, two stop bits, without flow control.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use super::{PumpError, Result};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM5")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb) => (Some(usb.vid), Some(usb.pid), usb.product),
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// USB-serial adapters first, then everything else, numerically within a group
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyUSB"), (0, "COM"), (1, "ttyACM"), (1, "ttyS")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (2, 0, basename.to_string())
}

/// List the serial ports a chain could be attached to
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports.dedup_by(|a, b| a.name == b.name);
    ports
}

/// Open a serial port with the chain's framing and per-read timeout
pub fn open_port(name: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| PumpError::Serial(format!("{}: {}", name, e)))?;
    configure_port(port.as_mut())?;
    Ok(port)
}

/// Configure 8N2 framing without flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<()> {
    port.set_data_bits(serialport::DataBits::Eight)?;
    port.set_parity(serialport::Parity::None)?;
    port.set_stop_bits(serialport::StopBits::Two)?;
    port.set_flow_control(serialport::FlowControl::None)?;
    Ok(())
}

/// Discard anything sitting in the input or output buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<()> {
    port.clear(serialport::ClearBuffer::All)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // Only checks that enumeration doesn't panic on this host
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    #[test]
    fn test_port_sorting() {
        let mut names = vec![
            "/dev/ttyS0",
            "/dev/ttyUSB1",
            "/dev/ttyACM0",
            "/dev/ttyUSB0",
            "/dev/something",
            "/dev/ttyUSB10",
        ];
        names.sort_by_key(|n| port_sort_key(n));

        assert_eq!(
            names,
            vec![
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/ttyUSB10",
                "/dev/ttyACM0",
                "/dev/ttyS0",
                "/dev/something",
            ]
        );
    }
}

use std::time::Duration;

use serde::Deserialize;
use serialport::{SerialPort, SerialPortType};

use crate::transport::{Connector, Transport, TransportError};

pub const DEFAULT_PORT: &str = "COM3";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl SerialSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct SerialDevice {
    pub name: String,
    pub port: String,
}

impl SerialDevice {
    pub fn new(name: String, port: String) -> Self {
        Self { name, port }
    }
}

/// Get all serial ports the OS reports, with the USB product name where known
pub fn available_ports() -> Result<Vec<SerialDevice>, TransportError> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|info| {
            let name = match info.port_type {
                SerialPortType::UsbPort(usb) => usb
                    .product
                    .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
                SerialPortType::PciPort => "PCI serial".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
                SerialPortType::Unknown => "Serial port".to_string(),
            };
            SerialDevice::new(name, info.port_name)
        })
        .collect())
}

/// Opens the configured serial port and hands it to a protocol driver.
///
/// The driver closure turns a raw port into a [`Transport`]; this is where a vendor
/// protocol implementation plugs in.
pub struct SerialConnector<F> {
    settings: SerialSettings,
    driver: F,
}

impl<F> SerialConnector<F> {
    pub fn new(settings: SerialSettings, driver: F) -> Self {
        Self { settings, driver }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

impl<T, F> Connector for SerialConnector<F>
where
    T: Transport + 'static,
    F: FnMut(Box<dyn SerialPort>) -> Result<T, TransportError>,
{
    type Transport = T;

    fn open(&mut self) -> Result<T, TransportError> {
        log::debug!(
            "Opening {} at {} baud",
            self.settings.port,
            self.settings.baud_rate
        );
        let port = serialport::new(self.settings.port.as_str(), self.settings.baud_rate)
            .timeout(self.settings.timeout())
            .open()?;

        // Drop whatever a previous session left in the buffers
        port.clear(serialport::ClearBuffer::All)?;

        (self.driver)(port)
    }

    fn describe(&self) -> String {
        self.settings.port.clone()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedTransport;

    #[test]
    fn test_default_settings() {
        let settings = SerialSettings::default();
        assert_eq!(settings.port, "COM3");
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let settings = SerialSettings {
            port: "/dev/does-not-exist-sfc".to_string(),
            ..SerialSettings::default()
        };
        let mut connector = SerialConnector::new(settings, |_port: Box<dyn SerialPort>| {
            Err::<SimulatedTransport, _>(TransportError::Closed)
        });

        assert_eq!(connector.describe(), "/dev/does-not-exist-sfc");
        assert!(matches!(
            connector.open(),
            Err(TransportError::SerialPort(_))
        ));
    }

    #[test]
    fn test_available_ports() {
        // Depends on the host; enumeration may be unsupported in containers
        match available_ports() {
            Ok(devices) => {
                for device in devices {
                    assert!(!device.port.is_empty());
                }
            }
            Err(TransportError::SerialPort(_)) => {}
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}

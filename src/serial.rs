use std::io::{ErrorKind, Read};
use std::time::Duration;

use log::{debug, info};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use crate::config::Settings;
use crate::drivers::{MonitorError, Transport};

/// Reads give up quickly so a poll never stalls the loop.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// One discovered endpoint, as shown in the port picker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub device: String,
    pub description: String,
    pub is_bluetooth: bool,
}

/// Serial/Bluetooth-SPP link to the headset.
pub struct SerialTransport {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, MonitorError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        info!("opened {port_name} at {baud_rate} baud");
        Ok(Self {
            port_name: port_name.to_owned(),
            port: Some(port),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, MonitorError> {
        self.port
            .as_mut()
            .ok_or_else(|| MonitorError::Transport(format!("{} is closed", self.port_name)))
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> Result<usize, MonitorError> {
        Ok(self.port()?.bytes_to_read()? as usize)
    }

    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, MonitorError> {
        let port = self.port()?;
        let mut buf = vec![0u8; max_bytes];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(MonitorError::Transport(e.to_string())),
        }
    }

    fn close(&mut self) -> Result<(), MonitorError> {
        if self.port.take().is_some() {
            debug!("closed {}", self.port_name);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.port_name.clone()
    }
}

/// Lists serial endpoints; the configured headset (matched by name) comes first.
pub fn list_ports(settings: &Settings) -> Result<Vec<PortInfo>, MonitorError> {
    let ports = serialport::available_ports()?;
    Ok(rank_ports(ports.iter().map(describe_port).collect(), settings))
}

/// Preferred device when Bluetooth preference is on, else the configured port.
pub fn find_device(settings: &Settings) -> String {
    if settings.use_bluetooth {
        if let Ok(ports) = list_ports(settings) {
            if let Some(port) = ports
                .into_iter()
                .find(|p| p.device.contains(&settings.bluetooth_device_name))
            {
                return port.device;
            }
        }
    }
    settings.serial_port.clone()
}

fn describe_port(info: &SerialPortInfo) -> PortInfo {
    let description = match &info.port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
        SerialPortType::BluetoothPort => "Bluetooth".to_owned(),
        SerialPortType::PciPort => "PCI".to_owned(),
        SerialPortType::Unknown => "n/a".to_owned(),
    };
    PortInfo {
        device: info.port_name.clone(),
        is_bluetooth: matches!(info.port_type, SerialPortType::BluetoothPort)
            || description.contains("Bluetooth"),
        description,
    }
}

fn rank_ports(ports: Vec<PortInfo>, settings: &Settings) -> Vec<PortInfo> {
    let name = settings.bluetooth_device_name.as_str();
    let (mut preferred, others): (Vec<_>, Vec<_>) = ports
        .into_iter()
        .map(|mut p| {
            p.is_bluetooth |= p.device.contains(name);
            p
        })
        .partition(|p| p.device.contains(name));
    preferred.extend(others);
    preferred
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(device: &str, description: &str) -> PortInfo {
        PortInfo {
            device: device.to_owned(),
            description: description.to_owned(),
            is_bluetooth: false,
        }
    }

    #[test]
    fn configured_headset_is_ranked_first() {
        let settings = Settings::default();
        let ranked = rank_ports(
            vec![
                port("/dev/ttyUSB0", "CP2102"),
                port("/dev/cu.404-BrainNotFound", "n/a"),
                port("/dev/ttyS0", "n/a"),
            ],
            &settings,
        );
        assert_eq!(ranked[0].device, "/dev/cu.404-BrainNotFound");
        assert!(ranked[0].is_bluetooth);
        assert_eq!(ranked[1].device, "/dev/ttyUSB0");
        assert!(!ranked[1].is_bluetooth);
    }

    #[test]
    fn bluetooth_ports_are_flagged() {
        let info = SerialPortInfo {
            port_name: "COM7".into(),
            port_type: SerialPortType::BluetoothPort,
        };
        let described = describe_port(&info);
        assert!(described.is_bluetooth);
        assert_eq!(described.description, "Bluetooth");
    }

    #[test]
    fn opening_a_missing_port_is_a_transport_error() {
        let result = SerialTransport::open("/dev/definitely-not-a-port", 115_200);
        assert!(matches!(result, Err(MonitorError::Transport(_))));
    }
}

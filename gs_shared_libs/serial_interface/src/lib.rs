use std::io::{Error as IoError, ErrorKind, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

/// Interface trait implemented by every byte source the monitor can poll
pub trait Interface {
    /// Send byte data to the interface. Return number of bytes sent
    fn send(&mut self, data: &[u8]) -> Result<usize, IoError>;
    /// Read byte data from the interface into a byte slice buffer. Return
    /// number of bytes read; 0 means nothing arrived within the timeout
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, IoError>;
}

/// Default read timeout; bounds monitor shutdown latency
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A physical serial port opened at a fixed baud rate.
pub struct SerialPortInterface {
    port: Box<dyn SerialPort>,
    port_name: String,
    baud_rate: u32,
}

impl Interface for SerialPortInterface {
    fn send(&mut self, data: &[u8]) -> Result<usize, IoError> {
        self.port.write(data)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, IoError> {
        match self.port.read(buffer) {
            Ok(count) => Ok(count),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl SerialPortInterface {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<SerialPortInterface, IoError> {
        Self::with_timeout(port_name, baud_rate, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_timeout(
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<SerialPortInterface, IoError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()?;
        Ok(SerialPortInterface {
            port,
            port_name: port_name.to_string(),
            baud_rate,
        })
    }

    // getter for port name
    pub fn get_port_name(&self) -> String {
        self.port_name.clone()
    }

    // getter for baud_rate
    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

/// List the serial ports visible on this machine
pub fn available_ports() -> Result<Vec<String>, IoError> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

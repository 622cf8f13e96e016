use std::io::Read;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use super::{ByteSource, SourceError};

const OPEN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Serial-port backed source. The port is released by `close` (or on drop).
pub struct SerialSource {
    path: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialSource {
    /// Open `path` at `baud_rate`, 8 data bits, 1 stop bit, no parity.
    /// The RAVEn stick expects [`crate::config::DEFAULT_BAUD_RATE`].
    ///
    /// # Errors
    /// Returns `SourceError::Unavailable` listing the serial ports that do
    /// exist when the device cannot be opened.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, SourceError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|err| {
                SourceError::Unavailable(format!(
                    "{path}: {err}; available ports: {}",
                    available_port_names()
                ))
            })?;
        info!(device = path, baud_rate, "serial port opened");
        Ok(Self {
            path: path.to_string(),
            port: Some(port),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, SourceError> {
        self.port.as_mut().ok_or(SourceError::Closed)
    }
}

impl ByteSource for SerialSource {
    fn bytes_available(&mut self) -> Result<usize, SourceError> {
        let pending = self
            .port()?
            .bytes_to_read()
            .map_err(|err| SourceError::Io(err.into()))?;
        Ok(pending as usize)
    }

    fn read_byte(&mut self) -> Result<u8, SourceError> {
        let mut byte = [0u8; 1];
        self.port()?.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn close(&mut self) -> Result<(), SourceError> {
        if self.port.take().is_some() {
            debug!(device = %self.path, "serial port closed");
        }
        Ok(())
    }
}

fn available_port_names() -> String {
    match serialport::available_ports() {
        Ok(ports) if !ports.is_empty() => ports
            .into_iter()
            .map(|port| port.port_name)
            .collect::<Vec<_>>()
            .join(", "),
        Ok(_) => "none".to_string(),
        Err(err) => format!("unknown ({err})"),
    }
}

//! Transport and chain ownership
//!
//! A [`Transport`] moves raw frames over the shared half-duplex channel.
//! A [`Chain`] owns one transport and hands out exactly one exchange
//! (write + bounded read) at a time to the pumps attached to it.

use serialport::SerialPort;
use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::serial::{clear_buffers, open_port};
use super::{PumpError, Result};
use crate::config::ChainConfig;

/// Byte-level access to the physical channel
pub trait Transport {
    /// Write a complete frame. Returns once the bytes are handed to the channel.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Read up to `max_bytes`, blocking no longer than the configured timeout.
    ///
    /// An empty vector means nothing arrived; that is not an error here.
    fn receive(&mut self, max_bytes: usize) -> Result<Vec<u8>>;

    /// Drop anything buffered in either direction
    fn clear(&mut self) -> Result<()>;

    /// Human-readable channel name for logs
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

/// Serial port implementation of [`Transport`]
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Open and configure the port named in `config`
    pub fn open(config: &ChainConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let port = open_port(&config.port_name, config.baud_rate, timeout)?;
        Ok(Self::new(port, timeout))
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut response = Vec::with_capacity(max_bytes);
        let mut buffer = [0u8; 128];
        let deadline = Instant::now() + self.timeout;

        while response.len() < max_bytes {
            let want = (max_bytes - response.len()).min(buffer.len());
            match self.port.read(&mut buffer[..want]) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buffer[..n]),
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    break
                }
                Err(e) => return Err(PumpError::Io(e)),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        Ok(response)
    }

    fn clear(&mut self) -> Result<()> {
        clear_buffers(self.port.as_mut())
    }

    fn describe(&self) -> String {
        self.port.name().unwrap_or_else(|| "serial".to_string())
    }
}

/// The shared channel a set of addressed pumps is daisy-chained on.
///
/// Pumps borrow the chain; the chain owns the transport. `Chain` is not
/// `Sync`, and [`Chain::exchange`] holds the transport for the whole
/// request/response, so at most one exchange is ever in flight.
pub struct Chain<T: Transport> {
    transport: RefCell<T>,
    name: String,
}

impl Chain<SerialTransport> {
    /// Open the serial port described by `config` and flush it
    pub fn open(config: &ChainConfig) -> Result<Self> {
        Self::new(SerialTransport::open(config)?)
    }
}

impl<T: Transport> Chain<T> {
    /// Take ownership of a transport, flushing stale bytes before first use
    pub fn new(mut transport: T) -> Result<Self> {
        transport.clear()?;
        let name = transport.describe();
        tracing::info!(chain = %name, "Chain created");
        Ok(Self {
            transport: RefCell::new(transport),
            name,
        })
    }

    /// Name of the underlying channel
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write `frame`, then read at most `max_bytes` of reply
    pub fn exchange(&self, frame: &[u8], max_bytes: usize) -> Result<Vec<u8>> {
        let mut transport = self
            .transport
            .try_borrow_mut()
            .map_err(|_| PumpError::ChainBusy)?;
        transport.send(frame)?;
        transport.receive(max_bytes)
    }

    /// Inspect the transport between exchanges
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut transport = self
            .transport
            .try_borrow_mut()
            .map_err(|_| PumpError::ChainBusy)?;
        Ok(f(&mut transport))
    }

    /// Close the chain and hand back the transport
    pub fn into_inner(self) -> T {
        tracing::info!(chain = %self.name, "Chain closed");
        self.transport.into_inner()
    }
}

impl<T: Transport> std::fmt::Debug for Chain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pump chain on {}", self.name)
    }
}

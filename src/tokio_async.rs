//! Asynchronous transport session for the RM550 resistance module.
//!
//! This module provides the `async` counterpart of [`crate::tokio_sync`]: a
//! [`Session`] driving a `tokio-serial` stream and the stateless high-level API
//! ([`RM550`] struct). All functions are `async` and must be `.await`ed.
//!
//! The response wait is bounded by the configured timeout, so wrapping the
//! calls in `tokio::time::timeout` is not required.
//!
//! # Examples
//!
//! ```no_run
//! use rm550_lib::protocol::{Action, Address, BaudRate, Resistance};
//! use rm550_lib::tokio_async::{Session, RM550};
//! use rm550_lib::tokio_common::SessionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::open("/dev/ttyUSB0", &BaudRate::B9600, SessionConfig::default())?;
//!     let address: Address = "001".parse()?;
//!
//!     RM550::set_resistance(&mut session, Resistance::validate("1500")?, Some(&address)).await?;
//!     match RM550::perform_action(&mut session, Action::Short, Some(&address)).await {
//!         Ok(()) => println!("Output shorted"),
//!         Err(e) => eprintln!("Short failed: {e}"),
//!     }
//!     Ok(())
//! }
//! ```

use crate::command::{CommandFrame, Operation};
use crate::protocol::{self as proto, Action, Address, Resistance, Temperature};
use crate::response::{self, DeviceResponse};
use crate::table::{ResolvePolicy, Resolution, Table};
use crate::tokio_common::{
    check_response, serial_port_builder, set_resistance_operations, Error, Result, SessionConfig,
};
use log::{debug, info, trace, warn};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

/// An `async` byte link the session can drive.
pub trait AsyncPort: AsyncRead + AsyncWrite + Unpin {
    /// Drops unread received bytes.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncPort for tokio_serial::SerialStream {
    fn discard_input(&mut self) -> io::Result<()> {
        use tokio_serial::SerialPort;
        self.clear(tokio_serial::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// Exclusive owner of one serial stream.
///
/// Takes `&mut self` for every exchange, so at most one command is in flight.
/// Dropping or closing the session sends nothing.
pub struct Session<S: AsyncPort = tokio_serial::SerialStream> {
    stream: S,
    name: String,
    config: SessionConfig,
    last_exchange: Option<Instant>,
}

impl Session {
    /// Opens a serial port exclusively.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(device: &str, baud_rate: &proto::BaudRate, config: SessionConfig) -> Result<Self> {
        let builder = serial_port_builder(device, baud_rate);
        let stream =
            tokio_serial::SerialStream::open(&builder).map_err(|source| Error::PortOpenFailed {
                port: device.to_string(),
                source,
            })?;
        info!("Opened serial port {device} at {baud_rate} baud");
        Ok(Self::with_stream(stream, device, config))
    }
}

impl<S: AsyncPort> Session<S> {
    /// Wraps an already opened stream.
    pub fn with_stream(stream: S, name: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            stream,
            name: name.into(),
            config,
            last_exchange: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Writes a frame and waits for a response line until the configured
    /// timeout elapses.
    ///
    /// A missing response is reported as [`response::Outcome::Timeout`].
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the stream fails or reaches end of file.
    pub async fn send_and_receive(&mut self, frame: &CommandFrame) -> Result<DeviceResponse> {
        if let Some(last) = self.last_exchange {
            tokio::time::sleep_until(last + self.config.delay).await;
        }
        self.stream.discard_input()?;

        debug!("{}: sending {frame}", self.name);
        let result = self.exchange(frame).await;
        self.last_exchange = Some(Instant::now());
        let response = result?;

        debug!(
            "{}: received {:?} ({})",
            self.name,
            response.raw_text(),
            response.outcome
        );
        Ok(response)
    }

    async fn exchange(&mut self, frame: &CommandFrame) -> Result<DeviceResponse> {
        self.stream.write_all(frame.encode().as_bytes()).await?;
        self.stream.flush().await?;

        let deadline = Instant::now() + self.config.timeout;
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            if let Some(line) = response::take_line(&mut buffer) {
                if !buffer.is_empty() {
                    trace!("{}: ignoring {} trailing bytes", self.name, buffer.len());
                }
                return Ok(DeviceResponse::from_raw(line, &self.config.tokens));
            }
            match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial stream closed",
                    )))
                }
                Ok(Ok(n)) => buffer.extend_from_slice(&chunk[..n]),
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(err)) => return Err(err.into()),
                Err(_elapsed) => {
                    warn!(
                        "{}: no response to {frame} within {:?}",
                        self.name, self.config.timeout
                    );
                    return Ok(DeviceResponse::timeout(buffer));
                }
            }
        }
    }

    /// Releases the stream. No command is sent.
    pub fn close(self) {
        info!("Closing serial port {}", self.name);
    }
}

impl<S: AsyncPort> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Stateless `async` API of the RM550 resistance module.
#[derive(Debug)]
pub struct RM550;

impl RM550 {
    /// Sends one operation and checks the device's answer.
    pub async fn execute<S: AsyncPort>(
        session: &mut Session<S>,
        operation: Operation,
        address: Option<&Address>,
    ) -> Result<()> {
        let frame = CommandFrame::build(operation, address, &session.config().opcodes);
        let response = session.send_and_receive(&frame).await?;
        check_response(&response, session.config().timeout)
    }

    /// Presents a resistance on the output.
    ///
    /// See [`crate::tokio_sync::RM550::set_resistance`].
    pub async fn set_resistance<S: AsyncPort>(
        session: &mut Session<S>,
        value: Resistance,
        address: Option<&Address>,
    ) -> Result<()> {
        for operation in set_resistance_operations(value) {
            Self::execute(session, operation, address).await?;
        }
        Ok(())
    }

    pub async fn perform_action<S: AsyncPort>(
        session: &mut Session<S>,
        action: Action,
        address: Option<&Address>,
    ) -> Result<()> {
        Self::execute(session, Operation::Action(action), address).await
    }

    /// Resolves `temperature` in the table and presents the resulting resistance.
    pub async fn set_by_temperature<S: AsyncPort>(
        session: &mut Session<S>,
        table: &Table,
        temperature: Temperature,
        policy: ResolvePolicy,
        address: Option<&Address>,
    ) -> Result<Resolution> {
        let resolution = table.resolve(temperature, policy);
        Self::set_resistance(session, Resistance::Ohms(resolution.resistance), address).await?;
        Ok(resolution)
    }
}

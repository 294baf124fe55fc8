//! Blocking transport session for the RM550 resistance module.
//!
//! This module provides the [`Session`], which owns one serial port and runs one
//! command/response exchange at a time, and a stateless high-level API
//! ([`RM550`] struct) that turns resistance values and actions into frames and
//! the device's answers into results.
//!
//! # Examples
//!
//! ## Point-to-point link
//!
//! ```no_run
//! use rm550_lib::protocol::{BaudRate, Resistance};
//! use rm550_lib::tokio_common::SessionConfig;
//! use rm550_lib::tokio_sync::{Session, RM550};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::open("/dev/ttyUSB0", &BaudRate::B9600, SessionConfig::default())?;
//!
//!     RM550::set_resistance(&mut session, Resistance::validate("10000")?, None)?;
//!
//!     // The device keeps 10 kΩ after the port is closed.
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! ## RS-485 bus with several devices
//!
//! ```no_run
//! use rm550_lib::protocol::{Action, Address, BaudRate};
//! use rm550_lib::tokio_common::SessionConfig;
//! use rm550_lib::tokio_sync::{Session, RM550};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::open("COM3", &BaudRate::B9600, SessionConfig::default())?;
//!     let first: Address = "001".parse()?;
//!     let second: Address = "002".parse()?;
//!
//!     RM550::perform_action(&mut session, Action::Short, Some(&first))?;
//!     RM550::perform_action(&mut session, Action::Disconnect, Some(&second))?;
//!     Ok(())
//! }
//! ```

use crate::command::{CommandFrame, Operation};
use crate::protocol::{self as proto, Action, Address, Resistance, Temperature};
use crate::response::{self, DeviceResponse};
use crate::table::{ResolvePolicy, Resolution, Table};
use crate::tokio_common::{
    check_response, serial_port_builder, set_resistance_operations, Error, Result, SessionConfig,
    READ_POLL_INTERVAL,
};
use log::{debug, info, trace, warn};
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Instant;

/// A byte link the session can drive.
///
/// Implemented for the ports opened by `tokio-serial`. The input buffer is
/// discarded before each frame so that stale bytes are never taken for the
/// answer.
pub trait Port: Read + Write {
    /// Drops unread received bytes.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for Box<dyn tokio_serial::SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(tokio_serial::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// Exclusive owner of one serial link.
///
/// Exactly one command is in flight at a time and frames are written in
/// program order. Dropping or closing the session releases the port without
/// sending anything: the device keeps its last commanded state.
pub struct Session<P: Port = Box<dyn tokio_serial::SerialPort>> {
    port: P,
    name: String,
    config: SessionConfig,
    last_exchange: Option<Instant>,
}

impl Session {
    /// Opens a serial port exclusively.
    ///
    /// # Errors
    ///
    /// [`Error::PortOpenFailed`] if the port does not exist, is busy or cannot
    /// be configured.
    pub fn open(device: &str, baud_rate: &proto::BaudRate, config: SessionConfig) -> Result<Self> {
        let port = serial_port_builder(device, baud_rate)
            .timeout(READ_POLL_INTERVAL.min(config.timeout))
            .open()
            .map_err(|source| Error::PortOpenFailed {
                port: device.to_string(),
                source,
            })?;
        info!("Opened serial port {device} at {baud_rate} baud");
        Ok(Self::with_port(port, device, config))
    }
}

impl<P: Port> Session<P> {
    /// Wraps an already opened link.
    pub fn with_port(port: P, name: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            port,
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

    /// Writes a frame and blocks until a response line arrives or the
    /// configured timeout elapses.
    ///
    /// A missing response is not an error of this function: it is reported as
    /// [`response::Outcome::Timeout`]. There is no retry.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the port fails while writing or reading.
    pub fn send_and_receive(&mut self, frame: &CommandFrame) -> Result<DeviceResponse> {
        self.wait_for_delay();
        self.port.discard_input()?;

        debug!("{}: sending {frame}", self.name);
        let result = self.exchange(frame);
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

    fn exchange(&mut self, frame: &CommandFrame) -> Result<DeviceResponse> {
        self.port.write_all(frame.encode().as_bytes())?;
        self.port.flush()?;

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
            if Instant::now() >= deadline {
                warn!(
                    "{}: no response to {frame} within {:?}",
                    self.name, self.config.timeout
                );
                return Ok(DeviceResponse::timeout(buffer));
            }
            match self.port.read(&mut chunk) {
                Ok(0) => std::thread::sleep(READ_POLL_INTERVAL),
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn wait_for_delay(&self) {
        if let Some(last) = self.last_exchange {
            let elapsed = last.elapsed();
            if elapsed < self.config.delay {
                std::thread::sleep(self.config.delay - elapsed);
            }
        }
    }

    /// Releases the port. No command is sent.
    pub fn close(self) {
        info!("Closing serial port {}", self.name);
    }
}

impl<P: Port> fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Stateless high-level API of the RM550 resistance module.
///
/// Every function takes the serial number of the target device explicitly. On
/// a shared RS-485 bus the address must be given with every call; `None` sends
/// unaddressed frames for point-to-point links.
#[derive(Debug)]
pub struct RM550;

impl RM550 {
    /// Sends one operation and checks the device's answer.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] if the device did not answer in time.
    /// * [`Error::DeviceError`] if the device rejected the command.
    /// * [`Error::MalformedFrame`] for an unrecognised answer.
    /// * [`Error::Io`] for port failures.
    pub fn execute<P: Port>(
        session: &mut Session<P>,
        operation: Operation,
        address: Option<&Address>,
    ) -> Result<()> {
        let frame = CommandFrame::build(operation, address, &session.config().opcodes);
        let response = session.send_and_receive(&frame)?;
        check_response(&response, session.config().timeout)
    }

    /// Presents a resistance on the output.
    ///
    /// A finite value connects the output and then programs the set-point,
    /// [`Resistance::Open`] disconnects the output. The sequence stops at the
    /// first failing frame.
    pub fn set_resistance<P: Port>(
        session: &mut Session<P>,
        value: Resistance,
        address: Option<&Address>,
    ) -> Result<()> {
        for operation in set_resistance_operations(value) {
            Self::execute(session, operation, address)?;
        }
        Ok(())
    }

    /// Toggles the relay or the short of the output.
    pub fn perform_action<P: Port>(
        session: &mut Session<P>,
        action: Action,
        address: Option<&Address>,
    ) -> Result<()> {
        Self::execute(session, Operation::Action(action), address)
    }

    /// Resolves `temperature` in the table and presents the resulting resistance.
    ///
    /// A temperature outside of the table is clamped to the nearest boundary
    /// and reported in [`Resolution::out_of_range`], it is not an error.
    pub fn set_by_temperature<P: Port>(
        session: &mut Session<P>,
        table: &Table,
        temperature: Temperature,
        policy: ResolvePolicy,
        address: Option<&Address>,
    ) -> Result<Resolution> {
        let resolution = table.resolve(temperature, policy);
        Self::set_resistance(session, Resistance::Ohms(resolution.resistance), address)?;
        Ok(resolution)
    }
}

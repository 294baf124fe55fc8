//! This module provides common data structures and error types for the
//! `tokio-serial` based sessions.
//!
//! It defines the `Error` enum, which encapsulates all possible communication
//! errors, and the [`SessionConfig`] shared by the blocking and the `async`
//! session.
use crate::command::{Operation, Opcodes};
use crate::protocol::{self as proto, Resistance};
use crate::response::{DeviceResponse, Outcome, ResponseTokens};
use std::time::Duration;

/// Represents all possible errors that can occur while commanding a device.
///
/// Every variant renders differently, so a timeout is never reported like a
/// device-reported error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wraps `crate::Error`: the command was rejected before reaching the wire.
    #[error(transparent)]
    ProtocolError(#[from] crate::Error),

    /// The serial port could not be opened.
    #[error("Cannot open serial port {port}: {source}")]
    PortOpenFailed {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// Reading from or writing to the serial port failed.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not answer within the configured timeout.
    #[error("No response from device within {0:?}")]
    Timeout(Duration),

    /// The device answered with an error code.
    #[error("Device reported error code {0}")]
    DeviceError(String),

    /// The device answered with something that is neither an ack nor an error.
    #[error("Malformed response from device: {0:?}")]
    MalformedFrame(String),
}

/// The result type for session operations.
pub(crate) type Result<T> = std::result::Result<T, crate::tokio_common::Error>;

/// Default time to wait for the response line of a command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// Default minimum pause between two frames on the same link.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);
/// Polling granularity of blocking reads while waiting for the terminator.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The parity used for serial communication.
pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
/// The number of stop bits used for serial communication.
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The number of data bits used for serial communication.
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

/// Creates a `tokio_serial::SerialPortBuilder` with the specified settings.
///
/// # Arguments
///
/// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
/// * `baud_rate` - The baud rate for the serial communication.
pub fn serial_port_builder(
    device: &str,
    baud_rate: &proto::BaudRate,
) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, u32::from(baud_rate))
        .parity(*PARITY)
        .stop_bits(*STOP_BITS)
        .data_bits(*DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
}

/// Per-session protocol settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bounded wait for a response line. Expiry yields [`Outcome::Timeout`].
    pub timeout: Duration,
    /// Minimum pause between the end of one exchange and the next frame.
    pub delay: Duration,
    pub opcodes: Opcodes,
    pub tokens: ResponseTokens,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            delay: DEFAULT_DELAY,
            opcodes: Opcodes::default(),
            tokens: ResponseTokens::default(),
        }
    }
}

/// The frames needed to present `value` on the output.
///
/// A finite resistance is preceded by a connect so that a previously opened
/// output carries the new set-point. An open output is a plain disconnect.
pub fn set_resistance_operations(value: Resistance) -> Vec<Operation> {
    match value {
        Resistance::Ohms(ohms) => vec![
            Operation::Action(proto::Action::Connect),
            Operation::SetResistance(ohms),
        ],
        Resistance::Open => vec![Operation::Action(proto::Action::Disconnect)],
    }
}

/// Turns a classified response into the caller-facing result.
pub(crate) fn check_response(response: &DeviceResponse, timeout: Duration) -> Result<()> {
    match &response.outcome {
        Outcome::Ack => Ok(()),
        Outcome::DeviceError(code) => Err(Error::DeviceError(code.clone())),
        Outcome::Timeout => Err(Error::Timeout(timeout)),
        Outcome::MalformedFrame => Err(Error::MalformedFrame(response.raw_text())),
    }
}

//! Command frames of the RM550 AT grammar.
//!
//! A frame has the textual form `AT+<OPCODE>[=<payload>][@<address>]` followed by
//! the link terminator [`FRAME_TERMINATOR`]. The opcode strings are protocol
//! constants of the device firmware and are held in [`Opcodes`] so that they
//! can be replaced from configuration.

use crate::protocol::{Action, Address, Ohms};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Prefix of every command frame.
pub const FRAME_PREFIX: &str = "AT+";
/// Separator between opcode and payload.
pub const PAYLOAD_SEPARATOR: char = '=';
/// Separator between the command and the RS-485 serial number.
pub const ADDRESS_SEPARATOR: char = '@';
/// Link-level terminator appended to every frame.
pub const FRAME_TERMINATOR: &str = "\r\n";

pub const DEFAULT_SET_RESISTANCE_OPCODE: &str = "RES.SP";
pub const DEFAULT_CONNECT_OPCODE: &str = "RES.CONNECT";
pub const DEFAULT_DISCONNECT_OPCODE: &str = "RES.DISCONNECT";
pub const DEFAULT_SHORT_OPCODE: &str = "RES.SHORT";
pub const DEFAULT_UNSHORT_OPCODE: &str = "RES.UNSHORTEN";

/// The opcode table of the device firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Opcodes {
    pub set_resistance: String,
    pub connect: String,
    pub disconnect: String,
    pub short: String,
    pub unshort: String,
}

impl Default for Opcodes {
    fn default() -> Self {
        Self {
            set_resistance: DEFAULT_SET_RESISTANCE_OPCODE.to_string(),
            connect: DEFAULT_CONNECT_OPCODE.to_string(),
            disconnect: DEFAULT_DISCONNECT_OPCODE.to_string(),
            short: DEFAULT_SHORT_OPCODE.to_string(),
            unshort: DEFAULT_UNSHORT_OPCODE.to_string(),
        }
    }
}

impl Opcodes {
    /// Returns the opcode of an operation.
    pub fn opcode(&self, operation: &Operation) -> &str {
        match operation {
            Operation::SetResistance(_) => &self.set_resistance,
            Operation::Action(Action::Connect) => &self.connect,
            Operation::Action(Action::Disconnect) => &self.disconnect,
            Operation::Action(Action::Short) => &self.short,
            Operation::Action(Action::Unshort) => &self.unshort,
        }
    }
}

/// One device operation, i.e. the content of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Program the set-point resistance.
    SetResistance(Ohms),
    /// Toggle the relay or short stage.
    Action(Action),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::SetResistance(ohms) => write!(f, "set resistance {ohms} Ω"),
            Operation::Action(action) => write!(f, "{action}"),
        }
    }
}

/// A command frame ready to be written to the link.
///
/// Frames are transient: they are built for a single exchange and dropped
/// once the session has written them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    operation: Operation,
    opcode: String,
    payload: Option<String>,
    address: Option<Address>,
}

impl CommandFrame {
    /// Builds the frame for `operation`.
    ///
    /// The address is never taken from session state: a frame for a device on
    /// a shared bus must be given its address explicitly. `None` builds an
    /// unaddressed frame for point-to-point links.
    ///
    /// # Examples
    ///
    /// ```
    /// use rm550_lib::command::{CommandFrame, Opcodes, Operation};
    /// use rm550_lib::protocol::{Address, Ohms};
    ///
    /// let address: Address = "001".parse().unwrap();
    /// let frame = CommandFrame::build(
    ///     Operation::SetResistance(Ohms::try_from(1000u32).unwrap()),
    ///     Some(&address),
    ///     &Opcodes::default(),
    /// );
    /// assert_eq!(frame.encode(), "AT+RES.SP=1000@001\r\n");
    /// ```
    pub fn build(operation: Operation, address: Option<&Address>, opcodes: &Opcodes) -> Self {
        let payload = match &operation {
            Operation::SetResistance(ohms) => Some(ohms.to_string()),
            Operation::Action(_) => None,
        };
        Self {
            opcode: opcodes.opcode(&operation).to_string(),
            operation,
            payload,
            address: address.cloned(),
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    /// Encodes the frame including its terminator.
    pub fn encode(&self) -> String {
        format!("{self}{FRAME_TERMINATOR}")
    }
}

impl fmt::Display for CommandFrame {
    /// Formats the frame without its terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{FRAME_PREFIX}{}", self.opcode)?;
        if let Some(payload) = &self.payload {
            write!(f, "{PAYLOAD_SEPARATOR}{payload}")?;
        }
        if let Some(address) = &self.address {
            write!(f, "{ADDRESS_SEPARATOR}{address}")?;
        }
        Ok(())
    }
}

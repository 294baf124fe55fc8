//! Value types of the RM550 command grammar.
//!
//! This module holds the validated building blocks that every command frame is
//! made of: the emulated [`Resistance`], the RS-485 [`Address`] (serial number),
//! the relay/short [`Action`]s and the serial [`BaudRate`]. It also defines the
//! fixed-point [`Temperature`] used by the resistance-temperature tables.
//!
//! All types validate their input on construction, so a value that exists is
//! always safe to encode onto the wire.

use crate::Error;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A resistance in whole ohms, bounded to what the RM550 can emulate.
///
/// Values above [`Ohms::MAX`] are rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ohms(u32);

impl Ohms {
    /// The smallest settable resistance.
    pub const MIN: u32 = 0;
    /// The largest settable resistance (7 MΩ).
    pub const MAX: u32 = 7_000_000;

    /// Returns the resistance in ohms.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Ohms {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::OutOfRange(value.to_string()))
        }
    }
}

impl TryFrom<i64> for Ohms {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map_err(|_| Error::OutOfRange(value.to_string()))
            .and_then(Ohms::try_from)
    }
}

impl fmt::Display for Ohms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The token accepted in place of a numeric resistance to leave the output open.
pub const OPEN_TOKEN: &str = "OPEN";

/// The resistance the device should present on its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resistance {
    /// A finite resistance in ohms.
    Ohms(Ohms),
    /// An open circuit (infinite resistance).
    Open,
}

impl Resistance {
    /// Validates a human supplied resistance.
    ///
    /// Accepts a non-negative integer (surrounding whitespace is ignored) or the
    /// token `OPEN` in any letter case.
    ///
    /// # Errors
    ///
    /// * [`Error::OutOfRange`] for negative values or values above [`Ohms::MAX`].
    /// * [`Error::InvalidFormat`] for anything else.
    pub fn validate(input: &str) -> Result<Self, Error> {
        let value = input.trim();
        if value.eq_ignore_ascii_case(OPEN_TOKEN) {
            return Ok(Resistance::Open);
        }

        let (negative, digits) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value.strip_prefix('+').unwrap_or(value)),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidFormat(input.to_string()));
        }
        if negative {
            return Err(Error::OutOfRange(value.to_string()));
        }
        // Digit strings too long for u32 are still numbers, just too large ones.
        digits
            .parse::<u32>()
            .map_err(|_| Error::OutOfRange(value.to_string()))
            .and_then(Ohms::try_from)
            .map(Resistance::Ohms)
    }

    /// Encodes the set-point payload for the resistance-set command.
    ///
    /// Returns `None` for [`Resistance::Open`]: the device has no open
    /// set-point, an open output is commanded with [`Action::Disconnect`].
    pub fn encode(&self) -> Option<String> {
        match self {
            Resistance::Ohms(ohms) => Some(ohms.to_string()),
            Resistance::Open => None,
        }
    }
}

impl FromStr for Resistance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resistance::validate(s)
    }
}

impl From<Ohms> for Resistance {
    fn from(ohms: Ohms) -> Self {
        Resistance::Ohms(ohms)
    }
}

impl fmt::Display for Resistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resistance::Ohms(ohms) => write!(f, "{ohms} Ω"),
            Resistance::Open => write!(f, "{OPEN_TOKEN}"),
        }
    }
}

/// The serial number that selects one device on a shared RS-485 bus.
///
/// The number is assigned externally and embedded verbatim in every addressed
/// frame, so leading zeros are significant (`"001"` and `"1"` are different
/// devices).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Address(String);

impl Address {
    /// The maximum number of digits of a serial number.
    pub const MAX_LEN: usize = 16;

    /// Returns the serial number as it is sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > Self::MAX_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            Err(Error::InvalidAddress(s.to_string()))
        } else {
            Ok(Self(s.to_string()))
        }
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relay and short-circuit toggles of the output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Action {
    /// Close the output relay so the set-point resistance is presented.
    Connect,
    /// Open the output relay.
    Disconnect,
    /// Short the output terminals.
    Short,
    /// Remove the output short.
    Unshort,
}

impl Action {
    /// All actions, in the order the device documentation lists them.
    pub const ALL: [Action; 4] = [
        Action::Connect,
        Action::Disconnect,
        Action::Short,
        Action::Unshort,
    ];
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connect" => Ok(Action::Connect),
            "disconnect" => Ok(Action::Disconnect),
            "short" => Ok(Action::Short),
            "unshort" => Ok(Action::Unshort),
            _ => Err(Error::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Connect => "connect",
            Action::Disconnect => "disconnect",
            Action::Short => "short",
            Action::Unshort => "unshort",
        };
        write!(f, "{name}")
    }
}

/// State of the output relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayState {
    Connected,
    Disconnected,
}

/// State of the output short. Independent of [`RelayState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShortState {
    Shorted,
    Normal,
}

/// A temperature in tenths of a degree Celsius.
///
/// The fixed-point representation makes table lookups exact: `25C` and
/// `25.0C` are the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temperature(i32);

impl Temperature {
    /// The lowest accepted temperature in °C.
    pub const DEGREE_CELSIUS_MIN: f64 = -3276.8;
    /// The highest accepted temperature in °C.
    pub const DEGREE_CELSIUS_MAX: f64 = 3276.7;

    /// Creates a temperature from tenths of a degree Celsius.
    pub const fn from_decidegrees(value: i32) -> Self {
        Self(value)
    }

    /// Returns the temperature in tenths of a degree Celsius.
    pub const fn decidegrees(&self) -> i32 {
        self.0
    }

    /// Returns the temperature in degrees Celsius.
    pub fn degrees(&self) -> f64 {
        self.0 as f64 / 10.0
    }
}

impl TryFrom<f64> for Temperature {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value.is_finite() && (Self::DEGREE_CELSIUS_MIN..=Self::DEGREE_CELSIUS_MAX).contains(&value)
        {
            Ok(Self((value * 10.0).round() as i32))
        } else {
            Err(Error::InvalidTemperature(value.to_string()))
        }
    }
}

impl FromStr for Temperature {
    type Err = Error;

    /// Parses `25`, `-40C`, `25.5 °C` or `100c`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let value = value
            .strip_suffix(&['C', 'c'][..])
            .unwrap_or(value)
            .trim_end()
            .trim_end_matches('°')
            .trim_end();
        value
            .parse::<f64>()
            .map_err(|_| Error::InvalidTemperature(s.to_string()))
            .and_then(|degrees| {
                Temperature::try_from(degrees).map_err(|_| Error::InvalidTemperature(s.to_string()))
            })
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        if abs % 10 == 0 {
            write!(f, "{sign}{}C", abs / 10)
        } else {
            write!(f, "{sign}{}.{}C", abs / 10, abs % 10)
        }
    }
}

/// Baud rates of the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    #[default]
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1200 => Ok(BaudRate::B1200),
            2400 => Ok(BaudRate::B2400),
            4800 => Ok(BaudRate::B4800),
            9600 => Ok(BaudRate::B9600),
            19200 => Ok(BaudRate::B19200),
            38400 => Ok(BaudRate::B38400),
            57600 => Ok(BaudRate::B57600),
            115200 => Ok(BaudRate::B115200),
            _ => Err(Error::InvalidBaudRate(value)),
        }
    }
}

impl From<&BaudRate> for u32 {
    fn from(baud_rate: &BaudRate) -> u32 {
        match baud_rate {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(baud_rate: BaudRate) -> u32 {
        u32::from(&baud_rate)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u32::from(self))
    }
}

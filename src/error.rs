use std::path::PathBuf;

/// Errors raised while validating values, building frames or loading tables.
///
/// None of these ever reach the wire: they are detected before a frame is
/// written to the serial port.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The input is neither a non-negative integer nor `OPEN`.
    #[error("Invalid resistance '{0}', expected integer ohms or OPEN")]
    InvalidFormat(String),

    /// The resistance lies outside of the range the device can emulate.
    #[error("Resistance {0} Ω out of range (0..={max} Ω)", max = crate::protocol::Ohms::MAX)]
    OutOfRange(String),

    /// The RS-485 serial number is not a plain digit string.
    #[error("Invalid device address '{0}', expected a numeric serial number")]
    InvalidAddress(String),

    /// The temperature could not be parsed or lies outside the representable range.
    #[error("Invalid temperature '{0}'")]
    InvalidTemperature(String),

    /// The baud rate is not one the serial link supports.
    #[error("Unsupported baud rate {0}")]
    InvalidBaudRate(u32),

    /// The resistance-temperature table file does not exist.
    #[error("Temperature table {0:?} not found")]
    TableNotFound(PathBuf),

    /// The resistance-temperature table file exists but could not be read.
    #[error("Cannot read temperature table {path:?}: {source}")]
    TableRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A table line carries a resistance and temperature but violates the table invariants.
    #[error("Temperature table line {line}: {reason}")]
    TableParse { line: usize, reason: String },

    /// No line of the table yielded a usable entry.
    #[error("Temperature table contains no usable entries")]
    EmptyTable,

    /// The resistance sequence file could not be read.
    #[error("Cannot read resistance sequence {path:?}: {source}")]
    SequenceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A resistance sequence line could not be parsed.
    #[error("Resistance sequence line {line}: {reason}")]
    InvalidSequence { line: usize, reason: String },
}

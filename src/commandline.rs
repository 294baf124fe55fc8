use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use rm550_lib::{
    protocol::{self as proto, Action, Address, Resistance, Temperature},
    sweep::MIN_SWEEP_INTERVAL,
    table::ResolvePolicy,
};
use std::path::PathBuf;
use std::time::Duration;

fn parse_baud_rate(s: &str) -> Result<proto::BaudRate, String> {
    let rate_val = s
        .parse::<u32>()
        .map_err(|e| format!("Invalid baud rate number format: {e}"))?;
    proto::BaudRate::try_from(rate_val).map_err(|e| e.to_string())
}

fn parse_address(s: &str) -> Result<Address, String> {
    s.parse::<Address>().map_err(|e| e.to_string())
}

fn parse_resistance(s: &str) -> Result<Resistance, String> {
    Resistance::validate(s).map_err(|e| e.to_string())
}

fn parse_action(s: &str) -> Result<Action, String> {
    s.parse::<Action>().map_err(|e| e.to_string())
}

fn parse_temperature(s: &str) -> Result<Temperature, String> {
    s.parse::<Temperature>().map_err(|e| e.to_string())
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    let interval = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if interval < MIN_SWEEP_INTERVAL {
        return Err(format!(
            "Interval must be at least {}",
            humantime::format_duration(MIN_SWEEP_INTERVAL)
        ));
    }
    Ok(interval)
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// List the serial ports of this machine.
    ListPorts,

    /// Command one or more RM550 modules on a serial port.
    /// Without --device the port from the config file is used, or asked for interactively.
    #[clap(verbatim_doc_comment)]
    Serial {
        /// Serial port device name.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, verbatim_doc_comment)]
        device: Option<String>,

        /// Baud rate for serial communication.
        /// Supported values: 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200.
        #[arg(short, long, value_parser = parse_baud_rate, verbatim_doc_comment)]
        baud_rate: Option<proto::BaudRate>,

        /// Serial number of a module on an RS-485 bus.
        /// Repeat to send the command to several modules, in the given order.
        /// Without it, unaddressed frames are sent (point-to-point link).
        #[arg(short, long = "address", value_parser = parse_address, verbatim_doc_comment)]
        addresses: Vec<Address>,

        #[command(subcommand)]
        command: SerialCommand,
    },

    /// Show a resistance-temperature table or resolve one temperature, offline.
    Table {
        /// Table file with "<ohms> ; <comment ending with the temperature>" lines.
        #[arg(short, long)]
        file: PathBuf,

        /// How temperatures between two table entries are resolved.
        #[arg(long)]
        policy: Option<ResolvePolicy>,

        /// Temperature in °C, e.g. "25", "-12.5C".
        #[arg(value_parser = parse_temperature, allow_hyphen_values = true)]
        temperature: Option<Temperature>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SerialCommand {
    /// Present a resistance on the output.
    /// VALUE is an integer in ohms (0 to 7000000) or OPEN.
    #[clap(verbatim_doc_comment)]
    Set {
        #[arg(value_parser = parse_resistance)]
        value: Resistance,
    },

    /// Switch the output relay or short stage.
    Action {
        /// One of: connect, disconnect, short, unshort.
        #[arg(value_parser = parse_action)]
        action: Action,
    },

    /// Present the resistance a sensor has at the given temperature.
    Temp {
        /// Table file with "<ohms> ; <comment ending with the temperature>" lines.
        #[arg(short, long)]
        file: PathBuf,

        /// How temperatures between two table entries are resolved.
        /// Defaults to the config file setting, else nearest.
        #[arg(long, verbatim_doc_comment)]
        policy: Option<ResolvePolicy>,

        /// Temperature in °C, e.g. "25", "-12.5C".
        #[arg(value_parser = parse_temperature, allow_hyphen_values = true)]
        temperature: Temperature,
    },

    /// Step through a resistance sequence file at a fixed interval.
    /// Lines hold "<value>[,<value>...] [; comment]". Values of one line are
    /// applied one after another before the next line.
    #[clap(verbatim_doc_comment)]
    Sweep {
        #[arg(short, long)]
        file: PathBuf,

        /// Time between two steps (e.g., "1s", "500ms"), at least 100ms.
        #[arg(long, default_value = "1s", value_parser = parse_interval)]
        interval: Duration,

        /// First sequence line of the sweep (1-based).
        #[arg(long)]
        start: Option<usize>,

        /// Last sequence line of the sweep (1-based, inclusive).
        #[arg(long)]
        end: Option<usize>,
    },
}

const fn about_text() -> &'static str {
    "RM550 resistance module CLI - Present resistances, actions and temperature curves on RM550 modules."
}

#[derive(Parser, Debug)]
#[command(name="rescon", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: CliCommand,

    /// YAML configuration file.
    /// Default: rm550.yml in the working directory, if present.
    #[arg(global = true, long, verbatim_doc_comment)]
    pub config: Option<PathBuf>,

    /// Time to wait for the answer to each frame.
    /// Examples: "1s", "500ms". Default 1s.
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Option<Duration>,

    /// Minimum delay between two frames on the same port.
    /// Gives USB-to-RS485 converters time to switch between TX and RX.
    /// Examples: "50ms", "100ms". Default 50ms.
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Option<Duration>,
}

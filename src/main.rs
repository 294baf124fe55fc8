//! RM550 Resistance Module CLI
//!
//! A command-line interface (CLI) application for commanding RM550
//! programmable resistance modules over a serial (USB or RS-485) link.
//!
//! This tool allows users to:
//! - List the serial ports of the machine.
//! - Present a resistance in ohms or an open circuit on the output.
//! - Connect, disconnect, short or unshort the output.
//! - Present the resistance of a sensor at a given temperature, resolved from a
//!   resistance-temperature table.
//! - Sweep through a resistance sequence file at a fixed interval.
//! - Inspect a table offline.
//!
//! Several modules on one RS-485 bus are commanded by repeating `--address`.
//! The CLI leverages the `rm550_lib` crate for protocol definitions and client operations.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::Select;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use rm550_lib::{
    protocol::{self as proto, Address, Resistance, Temperature},
    sequence::Sequence,
    sweep::{Sweep, SweepState},
    table::{ResolutionSource, Resolution, ResolvePolicy, Table},
    tokio_sync::Session,
    tokio_sync_safe_client::SafeClient,
};
use std::panic;
use std::path::Path;
use std::time::Duration;

mod commandline;
mod config;

use config::BenchConfig;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

fn describe_port_type(port_type: &tokio_serial::SerialPortType) -> String {
    match port_type {
        tokio_serial::SerialPortType::UsbPort(usb) => format!(
            "USB {:04x}:{:04x} {} {}",
            usb.vid,
            usb.pid,
            usb.manufacturer.as_deref().unwrap_or_default(),
            usb.product.as_deref().unwrap_or_default()
        )
        .trim_end()
        .to_string(),
        tokio_serial::SerialPortType::PciPort => String::from("PCI"),
        tokio_serial::SerialPortType::BluetoothPort => String::from("Bluetooth"),
        tokio_serial::SerialPortType::Unknown => String::from("unknown"),
    }
}

fn list_ports() -> Result<()> {
    let ports = tokio_serial::available_ports().context("Cannot list serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{:<20} {}", port.port_name, describe_port_type(&port.port_type));
    }
    Ok(())
}

/// Lets the user pick one of the available serial ports.
fn select_port() -> Result<String> {
    let ports = tokio_serial::available_ports().context("Cannot list serial ports")?;
    if ports.is_empty() {
        bail!("No serial ports found, name one with --device");
    }
    let names: Vec<&str> = ports.iter().map(|port| port.port_name.as_str()).collect();
    let index = Select::new()
        .with_prompt("Select the serial port of the RM550")
        .items(&names)
        .default(0)
        .interact()
        .context("Failed to get the port selection")?;
    Ok(names[index].to_string())
}

fn target_name(address: Option<&Address>) -> String {
    match address {
        Some(address) => format!("module {address}"),
        None => String::from("module"),
    }
}

/// Runs `command` once per address in order, or once unaddressed.
fn for_each_target(
    addresses: &[Address],
    mut command: impl FnMut(Option<&Address>) -> Result<()>,
) -> Result<()> {
    if addresses.is_empty() {
        return command(None);
    }
    for address in addresses {
        command(Some(address))?;
    }
    Ok(())
}

fn describe_resolution(table: &Table, temperature: Temperature, resolution: &Resolution) -> String {
    let entries = table.entries();
    let source = match resolution.source {
        ResolutionSource::Exact(index) => format!("table entry '{}'", entries[index].comment),
        ResolutionSource::Nearest(index) => {
            format!("nearest entry at {}", entries[index].temperature)
        }
        ResolutionSource::Interpolated { lower, upper } => format!(
            "interpolated between {} and {}",
            entries[lower].temperature, entries[upper].temperature
        ),
    };
    format!("{temperature} -> {} Ω ({source})", resolution.resistance)
}

fn load_table(file: &Path) -> Result<Table> {
    Table::load(file).with_context(|| format!("Cannot load temperature table {file:?}"))
}

fn handle_table(
    file: &Path,
    policy: ResolvePolicy,
    temperature: Option<Temperature>,
) -> Result<()> {
    let table = load_table(file)?;
    match temperature {
        Some(temperature) => {
            info!("Executing: Resolve {temperature} ({policy})");
            let resolution = table.resolve(temperature, policy);
            println!("{}", describe_resolution(&table, temperature, &resolution));
            if let Some(warning) = resolution.out_of_range {
                println!("Warning: {warning}");
            }
        }
        None => {
            let (lowest, highest) = table.range();
            print!("{table}");
            println!("{} entries from {lowest} to {highest}", table.len());
        }
    }
    Ok(())
}

fn handle_sweep(
    client: &SafeClient,
    addresses: &[Address],
    file: &Path,
    interval: Duration,
    start: Option<usize>,
    end: Option<usize>,
) -> Result<()> {
    let sequence = Sequence::load(file)
        .with_context(|| format!("Cannot load resistance sequence {file:?}"))?;
    let mut sweep = Sweep::new(&sequence);
    let range = start.unwrap_or(1)..=end.unwrap_or(sequence.len());
    sweep
        .start(range.clone())
        .with_context(|| format!("Cannot sweep lines {range:?}"))?;
    info!(
        "Executing: Sweep {file:?} lines {range:?} every {}",
        humantime::format_duration(interval)
    );

    while let Some(step) = sweep.tick() {
        let comment = sequence
            .line(step.line)
            .map(|line| line.comment.as_str())
            .unwrap_or_default();
        if step.group_len > 1 {
            println!(
                "[{}/{}] {} (value {}/{}) {comment}",
                step.line,
                sequence.len(),
                step.value,
                step.index + 1,
                step.group_len
            );
        } else {
            println!("[{}/{}] {} {comment}", step.line, sequence.len(), step.value);
        }
        for_each_target(addresses, |address| {
            client.set_resistance(step.value, address).with_context(|| {
                format!("Failed to set {} on {}", step.value, target_name(address))
            })
        })?;
        if sweep.state() == SweepState::Idle {
            break;
        }
        std::thread::sleep(interval);
    }
    println!("Sweep finished after {} steps.", sweep.applied());
    Ok(())
}

fn handle_serial(
    args: &commandline::CliArgs,
    config: &BenchConfig,
    device: Option<&str>,
    baud_rate: Option<proto::BaudRate>,
    addresses: &[Address],
    command: &commandline::SerialCommand,
) -> Result<()> {
    let device = match device.or(config.device.as_deref()) {
        Some(device) => device.to_string(),
        None => select_port()?,
    };
    let baud_rate = baud_rate.unwrap_or(config.baud_rate);
    let addresses = if addresses.is_empty() {
        &config.addresses[..]
    } else {
        addresses
    };

    info!("Attempting to open serial port {device} at {baud_rate} baud...");
    let session = Session::open(
        &device,
        &baud_rate,
        config.session_config(args.timeout, args.delay),
    )
    .with_context(|| format!("Cannot open serial port {device}"))?;
    let client = SafeClient::new(session);

    match command {
        commandline::SerialCommand::Set { value } => {
            info!("Executing: Set {value}");
            for_each_target(addresses, |address| {
                client
                    .set_resistance(*value, address)
                    .with_context(|| format!("Failed to set {value} on {}", target_name(address)))?;
                match value {
                    Resistance::Open => println!("{}: output open.", target_name(address)),
                    Resistance::Ohms(ohms) => {
                        println!("{}: {ohms} Ω set successfully.", target_name(address))
                    }
                }
                Ok(())
            })?;
        }
        commandline::SerialCommand::Action { action } => {
            info!("Executing: {action}");
            for_each_target(addresses, |address| {
                client
                    .perform_action(*action, address)
                    .with_context(|| format!("Failed to {action} {}", target_name(address)))?;
                println!("{}: {action} done.", target_name(address));
                Ok(())
            })?;
        }
        commandline::SerialCommand::Temp {
            file,
            policy,
            temperature,
        } => {
            let policy = policy.unwrap_or(config.policy);
            info!("Executing: Set temperature {temperature} ({policy})");
            let table = load_table(file)?;
            for_each_target(addresses, |address| {
                let resolution = client
                    .set_by_temperature(*temperature, &table, policy, address)
                    .with_context(|| {
                        format!("Failed to set {temperature} on {}", target_name(address))
                    })?;
                println!(
                    "{}: {}",
                    target_name(address),
                    describe_resolution(&table, *temperature, &resolution)
                );
                if let Some(warning) = resolution.out_of_range {
                    println!("Warning: {warning}");
                }
                Ok(())
            })?;
        }
        commandline::SerialCommand::Sweep {
            file,
            interval,
            start,
            end,
        } => {
            handle_sweep(&client, addresses, file, *interval, *start, *end)?;
        }
    }

    // The modules keep their last commanded state.
    client.close();
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "RM550 CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    match &args.command {
        commandline::CliCommand::ListPorts => list_ports(),
        commandline::CliCommand::Table {
            file,
            policy,
            temperature,
        } => {
            let config = BenchConfig::load(args.config.as_deref())?;
            handle_table(file, policy.unwrap_or(config.policy), *temperature)
        }
        commandline::CliCommand::Serial {
            device,
            baud_rate,
            addresses,
            command,
        } => {
            let config = BenchConfig::load(args.config.as_deref())?;
            handle_serial(
                &args,
                &config,
                device.as_deref(),
                *baud_rate,
                addresses,
                command,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::parse("1000 ; -40C\n2000 ; 0C\n3000 ; 25C\n").unwrap()
    }

    #[test]
    fn describe_every_resolution_source() {
        let table = table();
        let describe = |temperature: &str, policy| {
            let temperature: Temperature = temperature.parse().unwrap();
            describe_resolution(&table, temperature, &table.resolve(temperature, policy))
        };
        assert_eq!(
            describe("0", ResolvePolicy::Nearest),
            "0C -> 2000 Ω (table entry '0C')"
        );
        assert_eq!(
            describe("20", ResolvePolicy::Nearest),
            "20C -> 3000 Ω (nearest entry at 25C)"
        );
        assert_eq!(
            describe("12", ResolvePolicy::Linear),
            "12C -> 2480 Ω (interpolated between 0C and 25C)"
        );
    }

    #[test]
    fn for_each_target_keeps_order_and_stops_on_failure() {
        let addresses: Vec<Address> = ["003", "001", "002"]
            .iter()
            .map(|sn| sn.parse().unwrap())
            .collect();
        let mut visited = Vec::new();
        let result = for_each_target(&addresses, |address| {
            let sn = address.unwrap().as_str().to_string();
            visited.push(sn.clone());
            if sn == "001" {
                bail!("rejected");
            }
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(visited, vec!["003", "001"]);

        let mut unaddressed = 0;
        for_each_target(&[], |address| {
            assert!(address.is_none());
            unaddressed += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(unaddressed, 1);
    }
}

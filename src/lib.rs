//! A library for controlling RM550 programmable resistance modules over a serial link.
//!
//! The RM550 emulates a resistive sensor (for example an NTC thermistor) and is
//! commanded with line-oriented AT frames such as `AT+RES.SP=10000\r\n`. Several
//! modules can share one RS-485 bus, each selected by its serial number.
//!
//! This crate provides two main ways to interact with the module:
//!
//! 1.  **High-Level, Safe Clients**: Cloneable clients that serialize every
//!     frame of one physical port and track the last acknowledged relay and
//!     short state of each device. See [`tokio_sync_safe_client::SafeClient`]
//!     (blocking) and [`tokio_async_safe_client::SafeClient`] (`async`).
//!
//! 2.  **Low-Level, Stateless Functions**: A [`tokio_sync::Session`] owning the
//!     serial port plus stateless functions that map directly to the device's
//!     commands. See the [`tokio_sync`] and [`tokio_async`] modules.
//!
//! ## Features
//!
//! - **Protocol Implementation**: Resistance validation, frame building and
//!   response classification without any I/O ([`protocol`], [`command`],
//!   [`response`]).
//! - **Temperature Tables**: Resolve a temperature to a resistance from a
//!   resistance-temperature table ([`table`]).
//! - **Sequences**: Step through resistance sequence files manually or with a
//!   timed sweep ([`sequence`], [`sweep`]).
//! - **Synchronous and Asynchronous APIs**: Both blocking and `async/await`
//!   sessions are available behind cargo features.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rm550_lib::{
//!     protocol::{BaudRate, Temperature},
//!     table::{ResolvePolicy, Table},
//!     tokio_common::SessionConfig,
//!     tokio_sync::Session,
//!     tokio_sync_safe_client::SafeClient,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let table = Table::load("ntc_10k.txt")?;
//!     let session = Session::open("/dev/ttyUSB0", &BaudRate::B9600, SessionConfig::default())?;
//!     let client = SafeClient::new(session);
//!
//!     let temperature: Temperature = "25C".parse()?;
//!     let resolution = client.set_by_temperature(temperature, &table, ResolvePolicy::Nearest, None)?;
//!     println!("Presenting {} for {temperature}", resolution.resistance);
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod error;
pub mod protocol;
pub mod response;
pub mod sequence;
pub mod state;
pub mod sweep;
pub mod table;

pub use error::Error;

#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "tokio-serial-sync", feature = "tokio-serial-async")))
)]
#[cfg(any(feature = "tokio-serial-sync", feature = "tokio-serial-async"))]
pub mod tokio_common;

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-serial-sync")))]
#[cfg(feature = "tokio-serial-sync")]
pub mod tokio_sync;

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-serial-async")))]
#[cfg(feature = "tokio-serial-async")]
pub mod tokio_async;

#[cfg_attr(docsrs, doc(cfg(feature = "safe-client-sync")))]
#[cfg(feature = "safe-client-sync")]
pub mod tokio_sync_safe_client;

#[cfg_attr(docsrs, doc(cfg(feature = "safe-client-async")))]
#[cfg(feature = "safe-client-async")]
pub mod tokio_async_safe_client;

#[cfg(all(test, feature = "tokio-serial-sync"))]
mod mock_serial;

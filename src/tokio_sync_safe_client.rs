//! Synchronous, shareable client for RM550 resistance modules.
//!
//! This module provides a high-level API (`SafeClient` struct) on top of a
//! blocking [`Session`]. The session is guarded by a mutex, so clones of one
//! client can be handed to several threads while the frames for the physical
//! port are still written strictly one after another. The client also records
//! the last acknowledged relay and short state of every device it addressed.
//!
//! ## Example
//!
//! ```no_run
//! use rm550_lib::{
//!     protocol::{Action, Address, BaudRate, Resistance},
//!     tokio_common::SessionConfig,
//!     tokio_sync::Session,
//!     tokio_sync_safe_client::SafeClient,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::open("/dev/ttyUSB0", &BaudRate::B9600, SessionConfig::default())?;
//!     let client = SafeClient::new(session);
//!     let address: Address = "001".parse()?;
//!
//!     client.set_resistance(Resistance::validate("2200")?, Some(&address))?;
//!     client.perform_action(Action::Short, Some(&address))?;
//!     println!("State: {:?}", client.state(Some(&address)));
//!
//!     Ok(())
//! }
//! ```

use crate::command::Operation;
use crate::protocol::{Action, Address, Resistance, Temperature};
use crate::state::{DeviceState, DeviceStates};
use crate::table::{ResolvePolicy, Resolution, Table};
use crate::tokio_common::{set_resistance_operations, Result};
use crate::tokio_sync::{Port, Session, RM550};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Inner<P: Port> {
    session: Session<P>,
    states: DeviceStates,
}

/// Synchronous client that serializes all frames of one physical port.
#[derive(Debug)]
pub struct SafeClient<P: Port = Box<dyn tokio_serial::SerialPort>> {
    inner: Arc<Mutex<Inner<P>>>,
}

impl<P: Port> Clone for SafeClient<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Port> SafeClient<P> {
    /// Creates a new `SafeClient` owning the given session.
    pub fn new(session: Session<P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session,
                states: DeviceStates::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        // Input is discarded before every frame, so a poisoned session stays usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(inner: &mut Inner<P>, operation: Operation, address: Option<&Address>) -> Result<()> {
        RM550::execute(&mut inner.session, operation, address)?;
        inner.states.record(address, &operation);
        Ok(())
    }

    fn set_resistance_locked(
        inner: &mut Inner<P>,
        value: Resistance,
        address: Option<&Address>,
    ) -> Result<()> {
        for operation in set_resistance_operations(value) {
            Self::execute(inner, operation, address)?;
        }
        Ok(())
    }

    /// Presents a resistance on the output of the addressed device.
    pub fn set_resistance(&self, value: Resistance, address: Option<&Address>) -> Result<()> {
        let mut inner = self.lock();
        Self::set_resistance_locked(&mut inner, value, address)
    }

    /// Toggles the relay or the short of the addressed device.
    pub fn perform_action(&self, action: Action, address: Option<&Address>) -> Result<()> {
        let mut inner = self.lock();
        Self::execute(&mut inner, Operation::Action(action), address)
    }

    /// Resolves `temperature` in an already loaded table and applies the result.
    pub fn set_by_temperature(
        &self,
        temperature: Temperature,
        table: &Table,
        policy: ResolvePolicy,
        address: Option<&Address>,
    ) -> Result<Resolution> {
        let resolution = table.resolve(temperature, policy);
        let mut inner = self.lock();
        Self::set_resistance_locked(&mut inner, Resistance::Ohms(resolution.resistance), address)?;
        Ok(resolution)
    }

    /// Loads the table at `table_path` and applies the resistance for `temperature`.
    ///
    /// The table is validated completely before any frame is sent.
    pub fn set_by_temperature_file(
        &self,
        temperature: Temperature,
        table_path: impl AsRef<Path>,
        policy: ResolvePolicy,
        address: Option<&Address>,
    ) -> Result<Resolution> {
        let table = Table::load(table_path)?;
        self.set_by_temperature(temperature, &table, policy, address)
    }

    /// The last acknowledged state of a device.
    pub fn state(&self, address: Option<&Address>) -> DeviceState {
        self.lock().states.get(address)
    }

    /// Releases this handle. The port is closed once the last clone is gone;
    /// no command is sent and the devices keep their state.
    pub fn close(self) {
        if let Ok(inner) = Arc::try_unwrap(self.inner) {
            inner
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .session
                .close();
        }
    }
}

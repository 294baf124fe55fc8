//! Last acknowledged output state of each device on a link.
//!
//! Relay and short are orthogonal hardware functions, so they are tracked as
//! two independent values. A value stays `None` until the device acknowledged
//! a command that defines it. The state is a record of what the engine
//! commanded, it is never reset when a session closes.

use crate::command::Operation;
use crate::protocol::{Action, Address, RelayState, ShortState};
use std::collections::HashMap;

/// Output state of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub relay: Option<RelayState>,
    pub short: Option<ShortState>,
}

impl DeviceState {
    /// Applies an acknowledged operation.
    pub fn apply(&mut self, operation: &Operation) {
        match operation {
            // The set-point is only commanded after a connect, see `RM550::set_resistance`.
            Operation::SetResistance(_) => {}
            Operation::Action(Action::Connect) => self.relay = Some(RelayState::Connected),
            Operation::Action(Action::Disconnect) => self.relay = Some(RelayState::Disconnected),
            Operation::Action(Action::Short) => self.short = Some(ShortState::Shorted),
            Operation::Action(Action::Unshort) => self.short = Some(ShortState::Normal),
        }
    }
}

/// States of all devices addressed through one session.
///
/// The `None` key stands for the single device of a point-to-point link.
#[derive(Debug, Clone, Default)]
pub struct DeviceStates {
    devices: HashMap<Option<Address>, DeviceState>,
}

impl DeviceStates {
    /// Returns the state of a device, all unknown if it was never commanded.
    pub fn get(&self, address: Option<&Address>) -> DeviceState {
        self.devices
            .get(&address.cloned())
            .copied()
            .unwrap_or_default()
    }

    /// Records an acknowledged operation for a device.
    pub fn record(&mut self, address: Option<&Address>, operation: &Operation) {
        self.devices
            .entry(address.cloned())
            .or_default()
            .apply(operation);
    }
}

//! Asynchronous, shareable client for RM550 resistance modules.
//!
//! This module provides a high-level API (`SafeClient` struct) on top of an
//! `async` [`Session`]. The session sits behind a `tokio::sync::Mutex`, so every
//! clone can be moved into its own task while the frames still leave the port
//! one at a time.
//!
//! All client methods are `async` and must be `.await`ed.

use crate::command::Operation;
use crate::protocol::{Action, Address, Resistance, Temperature};
use crate::state::{DeviceState, DeviceStates};
use crate::table::{ResolvePolicy, Resolution, Table};
use crate::tokio_async::{AsyncPort, Session, RM550};
use crate::tokio_common::{set_resistance_operations, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
struct Inner<S: AsyncPort> {
    session: Session<S>,
    states: DeviceStates,
}

impl<S: AsyncPort> Inner<S> {
    async fn execute(&mut self, operation: Operation, address: Option<&Address>) -> Result<()> {
        RM550::execute(&mut self.session, operation, address).await?;
        self.states.record(address, &operation);
        Ok(())
    }

    async fn set_resistance(&mut self, value: Resistance, address: Option<&Address>) -> Result<()> {
        for operation in set_resistance_operations(value) {
            self.execute(operation, address).await?;
        }
        Ok(())
    }
}

/// Asynchronous client that serializes all frames of one physical port.
#[derive(Debug)]
pub struct SafeClient<S: AsyncPort = tokio_serial::SerialStream> {
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S: AsyncPort> Clone for SafeClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: AsyncPort> SafeClient<S> {
    /// Creates a new `SafeClient` owning the given session.
    pub fn new(session: Session<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session,
                states: DeviceStates::default(),
            })),
        }
    }

    /// Presents a resistance on the output of the addressed device.
    pub async fn set_resistance(&self, value: Resistance, address: Option<&Address>) -> Result<()> {
        self.inner.lock().await.set_resistance(value, address).await
    }

    /// Toggles the relay or the short of the addressed device.
    pub async fn perform_action(&self, action: Action, address: Option<&Address>) -> Result<()> {
        self.inner
            .lock()
            .await
            .execute(Operation::Action(action), address)
            .await
    }

    /// Resolves `temperature` in the table and applies the result.
    pub async fn set_by_temperature(
        &self,
        temperature: Temperature,
        table: &Table,
        policy: ResolvePolicy,
        address: Option<&Address>,
    ) -> Result<Resolution> {
        let resolution = table.resolve(temperature, policy);
        self.inner
            .lock()
            .await
            .set_resistance(Resistance::Ohms(resolution.resistance), address)
            .await?;
        Ok(resolution)
    }

    /// Loads the table at `table_path` and applies the resistance for `temperature`.
    ///
    /// The table is read and validated before any frame is sent.
    pub async fn set_by_temperature_file(
        &self,
        temperature: Temperature,
        table_path: impl AsRef<Path>,
        policy: ResolvePolicy,
        address: Option<&Address>,
    ) -> Result<Resolution> {
        let table = Table::load(table_path)?;
        self.set_by_temperature(temperature, &table, policy, address)
            .await
    }

    /// The last acknowledged state of a device.
    pub async fn state(&self, address: Option<&Address>) -> DeviceState {
        self.inner.lock().await.states.get(address)
    }

    /// Releases this handle. The stream is closed once the last clone is gone.
    pub fn close(self) {
        if let Ok(inner) = Arc::try_unwrap(self.inner) {
            inner.into_inner().session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RelayState, ShortState};
    use crate::tokio_common::{Error, SessionConfig};
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Acknowledges every frame except the ones containing `reject`.
    fn client(
        reject: &'static str,
    ) -> (
        SafeClient<DuplexStream>,
        tokio::task::JoinHandle<Vec<String>>,
    ) {
        let (host, device) = tokio::io::duplex(1024);
        let handle = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(device);
            let mut lines = BufReader::new(read).lines();
            let mut frames = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let answer = if !reject.is_empty() && line.contains(reject) {
                    "ERROR:5\r\n"
                } else {
                    "OK\r\n"
                };
                frames.push(line.trim_end().to_string());
                if write.write_all(answer.as_bytes()).await.is_err() {
                    break;
                }
            }
            frames
        });
        let config = SessionConfig {
            timeout: Duration::from_millis(200),
            delay: Duration::ZERO,
            ..Default::default()
        };
        (
            SafeClient::new(Session::with_stream(host, "duplex", config)),
            handle,
        )
    }

    #[tokio::test]
    async fn state_is_tracked_per_address() {
        let (client, _device) = client("");
        let first: Address = "1".parse().unwrap();
        let second: Address = "2".parse().unwrap();

        client
            .set_resistance(Resistance::validate("100").unwrap(), Some(&first))
            .await
            .unwrap();
        client
            .perform_action(Action::Short, Some(&second))
            .await
            .unwrap();

        let state = client.state(Some(&first)).await;
        assert_eq!(state.relay, Some(RelayState::Connected));
        assert_eq!(state.short, None);
        let state = client.state(Some(&second)).await;
        assert_eq!(state.relay, None);
        assert_eq!(state.short, Some(ShortState::Shorted));
    }

    #[tokio::test]
    async fn rejected_set_point_keeps_connect_state() {
        let (client, _device) = client("RES.SP");
        assert_matches!(
            client
                .set_resistance(Resistance::validate("100").unwrap(), None)
                .await,
            Err(Error::DeviceError(code)) if code == "5"
        );
        assert_eq!(client.state(None).await.relay, Some(RelayState::Connected));
    }

    #[tokio::test]
    async fn tasks_never_interleave_frames() {
        let (client, device) = client("");
        let tasks: Vec<_> = ["11", "22", "33"]
            .into_iter()
            .map(|sn| {
                let client = client.clone();
                tokio::spawn(async move {
                    let address: Address = sn.parse().unwrap();
                    client
                        .set_resistance(Resistance::validate("680").unwrap(), Some(&address))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        client.close();

        let frames = device.await.unwrap();
        assert_eq!(frames.len(), 6);
        for pair in frames.chunks(2) {
            let sn = pair[0].rsplit('@').next().unwrap();
            assert_eq!(pair[0], format!("AT+RES.CONNECT@{sn}"));
            assert_eq!(pair[1], format!("AT+RES.SP=680@{sn}"));
        }
    }

    #[tokio::test]
    async fn set_by_temperature_reports_resolution() {
        let (client, _device) = client("");
        let table = Table::parse("1000 ; -40C\n2000 ; 0C\n3000 ; 25C\n").unwrap();
        let resolution = client
            .set_by_temperature("-1C".parse().unwrap(), &table, ResolvePolicy::Nearest, None)
            .await
            .unwrap();
        assert_eq!(resolution.resistance.get(), 2000);
        assert_eq!(resolution.out_of_range, None);
    }

    #[tokio::test]
    async fn set_by_temperature_file_rejects_bad_table_before_sending() {
        let dir = std::env::temp_dir().join(format!("rm550-async-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("unsorted.txt");
        std::fs::write(&path, "1000 ; -40C\n2000 ; 25C\n3000 ; 0C\n").unwrap();

        let (client, device) = client("");
        let result = client
            .set_by_temperature_file("10C".parse().unwrap(), &path, ResolvePolicy::Linear, None)
            .await;
        assert_matches!(
            result,
            Err(Error::ProtocolError(crate::Error::TableParse { line: 3, .. }))
        );
        client.close();
        assert!(device.await.unwrap().is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

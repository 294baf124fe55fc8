//! Scripted in-memory serial port for session tests.

use crate::tokio_sync::Port;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

/// Answers every complete frame written to it with the next scripted response.
///
/// When the script is exhausted the port stays silent and every read times out.
#[derive(Debug, Default)]
pub struct MockPort {
    responses: VecDeque<Vec<u8>>,
    pending: VecDeque<u8>,
    frame: Vec<u8>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl MockPort {
    pub fn new<I, R>(responses: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[u8]>,
    {
        Self {
            responses: responses.into_iter().map(|r| r.as_ref().to_vec()).collect(),
            ..Default::default()
        }
    }

    /// Everything written to the port so far, shared with the test.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }

    /// Bytes already waiting in the receive buffer before the first frame.
    pub fn with_stale_input(mut self, stale: &[u8]) -> Self {
        self.pending.extend(stale);
        self
    }
}

pub fn written_text(written: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(written.lock().unwrap().clone()).unwrap()
}

impl io::Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl io::Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        self.frame.extend_from_slice(buf);
        if self.frame.ends_with(b"\r\n") {
            self.frame.clear();
            if let Some(response) = self.responses.pop_front() {
                self.pending.extend(response);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}

/// A port whose writes fail, as if the adapter was unplugged.
#[derive(Debug, Default)]
pub struct BrokenPort;

impl io::Read for BrokenPort {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
    }
}

impl io::Write for BrokenPort {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for BrokenPort {}

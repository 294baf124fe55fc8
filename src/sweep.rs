//! Timed traversal of a resistance sequence.
//!
//! [`Sweep`] is a plain state machine. It never touches the serial port or a
//! clock: the caller calls [`Sweep::tick`] once per interval and applies the
//! returned step with `set_resistance`. `rescon sweep` only drives
//! [`Sweep::start`] and [`Sweep::tick`]; pausing and stopping are left to
//! interactive front ends built on the library.
//!
//! ```text
//!          start            pause
//!   Idle ---------> Traversing ------> Paused
//!    ^  <---------      |     <------    |
//!    |   stop / end     |      resume    |
//!    +------------------+----------------+
//!                     stop
//! ```

use crate::sequence::{Cursor, Sequence, Step};
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Shortest interval between two sweep steps.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Traversing,
    Paused,
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepState::Idle => write!(f, "idle"),
            SweepState::Traversing => write!(f, "traversing"),
            SweepState::Paused => write!(f, "paused"),
        }
    }
}

/// A transition that is not allowed in the current state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    #[error("Sweep is already running")]
    AlreadyRunning,

    #[error("Sweep is not running")]
    NotRunning,

    #[error("Sweep is already paused")]
    AlreadyPaused,

    #[error("Sweep is not paused")]
    NotPaused,

    /// The line range is empty or exceeds the sequence.
    #[error("Invalid sweep range {start}..={end}, the sequence has {len} lines")]
    InvalidRange { start: usize, end: usize, len: usize },
}

/// Walks a 1-based inclusive line range of a sequence, value by value.
#[derive(Debug, Clone)]
pub struct Sweep<'a> {
    cursor: Cursor<'a>,
    state: SweepState,
    end: usize,
    applied: usize,
}

impl<'a> Sweep<'a> {
    pub fn new(sequence: &'a Sequence) -> Self {
        Self {
            cursor: sequence.cursor(),
            state: SweepState::Idle,
            end: 0,
            applied: 0,
        }
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    /// Number of steps handed out since the last start.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// The whole sequence as a line range.
    pub fn full_range(&self) -> RangeInclusive<usize> {
        1..=self.cursor.sequence().len()
    }

    /// Starts traversing `range` (1-based, inclusive) from its first value.
    pub fn start(&mut self, range: RangeInclusive<usize>) -> Result<(), SweepError> {
        if self.state != SweepState::Idle {
            return Err(SweepError::AlreadyRunning);
        }
        let (start, end) = range.into_inner();
        let len = self.cursor.sequence().len();
        if start == 0 || start > end || end > len || !self.cursor.seek(start) {
            return Err(SweepError::InvalidRange { start, end, len });
        }
        self.end = end;
        self.applied = 0;
        self.state = SweepState::Traversing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SweepError> {
        match self.state {
            SweepState::Traversing => {
                self.state = SweepState::Paused;
                Ok(())
            }
            SweepState::Paused => Err(SweepError::AlreadyPaused),
            SweepState::Idle => Err(SweepError::NotRunning),
        }
    }

    pub fn resume(&mut self) -> Result<(), SweepError> {
        match self.state {
            SweepState::Paused => {
                self.state = SweepState::Traversing;
                Ok(())
            }
            SweepState::Traversing => Err(SweepError::NotPaused),
            SweepState::Idle => Err(SweepError::NotRunning),
        }
    }

    pub fn stop(&mut self) -> Result<(), SweepError> {
        if self.state == SweepState::Idle {
            return Err(SweepError::NotRunning);
        }
        self.state = SweepState::Idle;
        Ok(())
    }

    /// Returns the next step to apply.
    ///
    /// `None` while idle or paused. The last step of the range moves the sweep
    /// back to [`SweepState::Idle`].
    pub fn tick(&mut self) -> Option<Step> {
        if self.state != SweepState::Traversing {
            return None;
        }
        let step = self.cursor.current()?;
        self.applied += 1;
        let moved = self.cursor.next();
        if !moved || self.cursor.current().is_some_and(|next| next.line > self.end) {
            self.state = SweepState::Idle;
        }
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Ohms, Resistance};
    use assert_matches::assert_matches;

    fn sequence() -> Sequence {
        Sequence::parse("100\n200,210\n300\nOPEN\n").unwrap()
    }

    fn value(step: Step) -> Resistance {
        step.value
    }

    fn ohms(value: u32) -> Resistance {
        Resistance::Ohms(Ohms::try_from(value).unwrap())
    }

    #[test]
    fn full_sweep_visits_every_value_then_idles() {
        let sequence = sequence();
        let mut sweep = Sweep::new(&sequence);
        sweep.start(sweep.full_range()).unwrap();

        let mut values = Vec::new();
        while let Some(step) = sweep.tick() {
            values.push(value(step));
        }
        assert_eq!(
            values,
            vec![ohms(100), ohms(200), ohms(210), ohms(300), Resistance::Open]
        );
        assert_eq!(sweep.state(), SweepState::Idle);
        assert_eq!(sweep.applied(), 5);
        assert_eq!(sweep.tick(), None);
    }

    #[test]
    fn partial_range_stops_after_end_line() {
        let sequence = sequence();
        let mut sweep = Sweep::new(&sequence);
        sweep.start(2..=3).unwrap();

        let lines: Vec<usize> = std::iter::from_fn(|| sweep.tick().map(|s| s.line)).collect();
        assert_eq!(lines, vec![2, 2, 3]);
        assert_eq!(sweep.state(), SweepState::Idle);
    }

    #[test]
    fn pause_holds_position() {
        let sequence = sequence();
        let mut sweep = Sweep::new(&sequence);
        sweep.start(1..=2).unwrap();
        assert_eq!(sweep.tick().map(value), Some(ohms(100)));

        sweep.pause().unwrap();
        assert_eq!(sweep.tick(), None);
        assert_eq!(sweep.state(), SweepState::Paused);
        sweep.resume().unwrap();
        assert_eq!(sweep.tick().map(value), Some(ohms(200)));
    }

    #[test]
    fn invalid_transitions_keep_state() {
        let sequence = sequence();
        let mut sweep = Sweep::new(&sequence);
        assert_eq!(sweep.pause(), Err(SweepError::NotRunning));
        assert_eq!(sweep.resume(), Err(SweepError::NotRunning));
        assert_eq!(sweep.stop(), Err(SweepError::NotRunning));
        assert_eq!(sweep.state(), SweepState::Idle);

        sweep.start(1..=4).unwrap();
        assert_eq!(sweep.start(1..=4), Err(SweepError::AlreadyRunning));
        assert_eq!(sweep.resume(), Err(SweepError::NotPaused));
        assert_eq!(sweep.state(), SweepState::Traversing);

        sweep.pause().unwrap();
        assert_eq!(sweep.pause(), Err(SweepError::AlreadyPaused));
        assert_eq!(sweep.state(), SweepState::Paused);

        sweep.stop().unwrap();
        assert_eq!(sweep.state(), SweepState::Idle);
    }

    #[test]
    fn start_validates_range() {
        let sequence = sequence();
        let mut sweep = Sweep::new(&sequence);
        assert_matches!(sweep.start(0..=2), Err(SweepError::InvalidRange { .. }));
        assert_matches!(sweep.start(3..=2), Err(SweepError::InvalidRange { .. }));
        assert_matches!(
            sweep.start(1..=5),
            Err(SweepError::InvalidRange { end: 5, len: 4, .. })
        );
        assert_eq!(sweep.state(), SweepState::Idle);

        let empty = Sequence::default();
        let mut sweep = Sweep::new(&empty);
        assert_matches!(
            sweep.start(sweep.full_range()),
            Err(SweepError::InvalidRange { len: 0, .. })
        );
    }

    #[test]
    fn restart_after_stop_begins_at_range_start() {
        let sequence = sequence();
        let mut sweep = Sweep::new(&sequence);
        sweep.start(1..=4).unwrap();
        sweep.tick();
        sweep.tick();
        sweep.stop().unwrap();

        sweep.start(3..=4).unwrap();
        assert_eq!(sweep.applied(), 0);
        assert_eq!(sweep.tick().map(value), Some(ohms(300)));
    }
}

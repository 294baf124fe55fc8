//! Resistance sequence files.
//!
//! A sequence lists the set-points of a bench test, one step per line:
//!
//! ```text
//! <value>[,<value>...] [; comment]
//! ```
//!
//! Every value is an integer ohm value or `OPEN`. A line with several
//! comma-separated values forms a group (for example the tiers of one sensor
//! bin), which is traversed value by value before the next line is entered.
//! Blank lines and lines starting with `;` or `#` are skipped.

use crate::protocol::Resistance;
use crate::Error;
use log::debug;
use std::path::Path;

/// Separator between the values of one group.
pub const VALUE_SEPARATOR: char = ',';
/// Separator between the values and the comment.
pub const COMMENT_SEPARATOR: char = ';';

/// One line of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceLine {
    /// Line number in the source text, for messages.
    pub source_line: usize,
    /// Never empty.
    pub values: Vec<Resistance>,
    pub comment: String,
}

impl SequenceLine {
    fn parse(line: &str, source_line: usize) -> Result<Option<Self>, Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_SEPARATOR) || line.starts_with('#') {
            return Ok(None);
        }
        let (values, comment) = line.split_once(COMMENT_SEPARATOR).unwrap_or((line, ""));
        let values = values
            .split(VALUE_SEPARATOR)
            .map(Resistance::validate)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| Error::InvalidSequence {
                line: source_line,
                reason: err.to_string(),
            })?;
        Ok(Some(Self {
            source_line,
            values,
            comment: comment.trim().to_string(),
        }))
    }
}

/// An immutable list of sequence lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    lines: Vec<SequenceLine>,
}

impl Sequence {
    /// Loads a sequence file.
    ///
    /// # Errors
    ///
    /// [`Error::SequenceRead`] if the file cannot be read,
    /// [`Error::InvalidSequence`] for a malformed value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::SequenceRead {
            path: path.to_path_buf(),
            source,
        })?;
        let sequence = Self::parse(&text)?;
        debug!("Loaded {} sequence lines from {path:?}", sequence.len());
        Ok(sequence)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if let Some(line) = SequenceLine::parse(line, index + 1)? {
                lines.push(line);
            }
        }
        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[SequenceLine] {
        &self.lines
    }

    /// The line at the 1-based position `line`.
    pub fn line(&self, line: usize) -> Option<&SequenceLine> {
        line.checked_sub(1).and_then(|index| self.lines.get(index))
    }

    /// Number of lines, not counting the values of groups.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// A cursor on the first value of the sequence.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }
}

/// A single set-point of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// 1-based position of the line in the sequence.
    pub line: usize,
    /// 0-based position of the value within its group.
    pub index: usize,
    /// Number of values in the group.
    pub group_len: usize,
    pub value: Resistance,
}

/// Position within a sequence, moving value by value through groups.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    sequence: &'a Sequence,
    line: usize,
    index: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(sequence: &'a Sequence) -> Self {
        Self {
            sequence,
            line: 0,
            index: 0,
        }
    }

    pub fn sequence(&self) -> &'a Sequence {
        self.sequence
    }

    /// The step under the cursor, `None` for an empty sequence.
    pub fn current(&self) -> Option<Step> {
        let line = self.sequence.lines.get(self.line)?;
        Some(Step {
            line: self.line + 1,
            index: self.index,
            group_len: line.values.len(),
            value: line.values[self.index],
        })
    }

    /// Moves to the next value. Returns `false` and stays on the last value at
    /// the end of the sequence.
    pub fn next(&mut self) -> bool {
        let Some(line) = self.sequence.lines.get(self.line) else {
            return false;
        };
        if self.index + 1 < line.values.len() {
            self.index += 1;
            return true;
        }
        if self.line + 1 < self.sequence.lines.len() {
            self.line += 1;
            self.index = 0;
            return true;
        }
        false
    }

    /// Moves to the previous value, entering a group at its last value.
    /// Returns `false` and stays on the first value at the start.
    pub fn previous(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            return true;
        }
        if self.line == 0 {
            return false;
        }
        self.line -= 1;
        self.index = self.sequence.lines[self.line].values.len() - 1;
        true
    }

    /// Returns to the first value of the sequence.
    pub fn reset(&mut self) {
        self.line = 0;
        self.index = 0;
    }

    /// Moves to the first value of the 1-based `line`. Returns `false` and
    /// leaves the cursor unchanged when the line does not exist.
    pub fn seek(&mut self, line: usize) -> bool {
        if line == 0 || line > self.sequence.lines.len() {
            return false;
        }
        self.line = line - 1;
        self.index = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Ohms;
    use assert_matches::assert_matches;

    fn ohms(value: u32) -> Resistance {
        Resistance::Ohms(Ohms::try_from(value).unwrap())
    }

    fn bench_sequence() -> Sequence {
        Sequence::parse(
            "; bench test\n\
             1000 ; cold\n\
             \n\
             2000,2100,2200 ; bin A\n\
             # open circuit check\n\
             OPEN\n",
        )
        .unwrap()
    }

    #[test]
    fn parse_groups_and_comments() {
        let sequence = bench_sequence();
        assert_eq!(sequence.len(), 3);
        let group = sequence.line(2).unwrap();
        assert_eq!(group.source_line, 4);
        assert_eq!(group.values, vec![ohms(2000), ohms(2100), ohms(2200)]);
        assert_eq!(group.comment, "bin A");
        assert_eq!(sequence.line(3).unwrap().values, vec![Resistance::Open]);
        assert_eq!(sequence.line(0), None);
        assert_eq!(sequence.line(4), None);
    }

    #[test]
    fn parse_rejects_malformed_values() {
        assert_matches!(
            Sequence::parse("1000\n2000,x ; bad\n"),
            Err(Error::InvalidSequence { line: 2, .. })
        );
        assert_matches!(
            Sequence::parse("1000,,2000\n"),
            Err(Error::InvalidSequence { line: 1, .. })
        );
        assert_matches!(
            Sequence::parse("\n\n99999999\n"),
            Err(Error::InvalidSequence { line: 3, .. })
        );
    }

    #[test]
    fn cursor_walks_groups_value_by_value() {
        let sequence = bench_sequence();
        let mut cursor = sequence.cursor();
        let mut visited = vec![cursor.current().unwrap().value];
        while cursor.next() {
            visited.push(cursor.current().unwrap().value);
        }
        assert_eq!(
            visited,
            vec![ohms(1000), ohms(2000), ohms(2100), ohms(2200), Resistance::Open]
        );
        assert_eq!(cursor.current().unwrap().line, 3);
    }

    #[test]
    fn cursor_previous_enters_group_at_last_value() {
        let sequence = bench_sequence();
        let mut cursor = sequence.cursor();
        assert!(!cursor.previous());
        assert!(cursor.seek(3));
        assert!(cursor.previous());
        let step = cursor.current().unwrap();
        assert_eq!((step.line, step.index, step.group_len), (2, 2, 3));
        assert_eq!(step.value, ohms(2200));

        cursor.reset();
        assert_eq!(cursor.current().unwrap().value, ohms(1000));
        assert!(!cursor.seek(4));
        assert_eq!(cursor.current().unwrap().line, 1);
    }

    #[test]
    fn empty_sequence_has_no_steps() {
        let sequence = Sequence::parse("; nothing\n\n").unwrap();
        let mut cursor = sequence.cursor();
        assert!(sequence.is_empty());
        assert_eq!(cursor.current(), None);
        assert!(!cursor.next());
        assert!(!cursor.previous());
    }

    #[test]
    fn load_missing_file() {
        assert_matches!(
            Sequence::load("/nonexistent/rm550/sequence.txt"),
            Err(Error::SequenceRead { source, .. }) if source.kind() == std::io::ErrorKind::NotFound
        );
    }

    #[test]
    fn byte_order_mark_keeps_first_line() {
        let sequence = Sequence::parse("\u{feff}1000 ; first\n2000\n").unwrap();
        assert_eq!(sequence.len(), 2);
        let first = sequence.line(1).unwrap();
        assert_eq!(first.values, vec![ohms(1000)]);
        assert_eq!(first.source_line, 1);
    }
}

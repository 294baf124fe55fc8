//! Resistance-temperature tables (e.g. NTC thermistor curves).
//!
//! A table file holds one entry per line in the form
//!
//! ```text
//! <resistance in ohms> ; <free text ending with a temperature, e.g. 25C>
//! ```
//!
//! Lines that do not carry both an integer resistance and a trailing
//! temperature are skipped. The remaining entries must be strictly monotonic in
//! temperature (either ascending or descending). The table is loaded once and is
//! immutable afterwards.

use crate::protocol::{Ohms, Resistance, Temperature};
use crate::Error;
use log::{debug, warn};
use std::fmt;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Separator between the resistance and the comment column.
pub const COLUMN_SEPARATOR: char = ';';

/// One row of a resistance-temperature table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub resistance: Ohms,
    pub temperature: Temperature,
    pub comment: String,
}

impl TableEntry {
    /// Parses a table line, returning `Ok(None)` for lines that are skipped.
    fn parse_line(line: &str, line_number: usize) -> Result<Option<Self>, Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COLUMN_SEPARATOR) || line.starts_with('#') {
            return Ok(None);
        }
        let Some((value, comment)) = line.split_once(COLUMN_SEPARATOR) else {
            debug!("Skipping table line {line_number} without comment column: {line:?}");
            return Ok(None);
        };

        let resistance = match Resistance::validate(value) {
            Ok(Resistance::Ohms(ohms)) => ohms,
            Ok(Resistance::Open) | Err(Error::InvalidFormat(_)) => {
                debug!("Skipping table line {line_number} without numeric resistance: {line:?}");
                return Ok(None);
            }
            Err(err) => {
                return Err(Error::TableParse {
                    line: line_number,
                    reason: err.to_string(),
                })
            }
        };

        let comment = comment.trim();
        let Some(temperature) = comment
            .split(COLUMN_SEPARATOR)
            .rev()
            .find_map(trailing_temperature)
        else {
            debug!("Skipping table line {line_number} without temperature: {line:?}");
            return Ok(None);
        };

        Ok(Some(Self {
            resistance,
            temperature,
            comment: comment.to_string(),
        }))
    }
}

/// Extracts the signed number at the end of `text`, ignoring a `°C` suffix.
fn trailing_temperature(text: &str) -> Option<Temperature> {
    let text = text.trim_end();
    let text = text.strip_suffix(&['C', 'c'][..]).unwrap_or(text).trim_end();
    let text = text.strip_suffix('°').unwrap_or(text).trim_end();

    let bytes = text.as_bytes();
    let mut start = bytes.len();
    while start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
        start -= 1;
    }
    if start == bytes.len() {
        return None;
    }
    // A sign only counts when it is not a range dash, as in "0-25C".
    if start > 0
        && matches!(bytes[start - 1], b'-' | b'+')
        && (start == 1 || !bytes[start - 2].is_ascii_digit())
    {
        start -= 1;
    }
    text[start..].parse().ok()
}

/// How a temperature between two table entries is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ResolvePolicy {
    /// Use the entry with the closest temperature; ties go to the lower temperature.
    #[default]
    Nearest,
    /// Interpolate linearly between the two bracketing entries.
    Linear,
}

impl std::str::FromStr for ResolvePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(ResolvePolicy::Nearest),
            "linear" => Ok(ResolvePolicy::Linear),
            _ => Err(format!("Unknown resolve policy '{s}', expected nearest or linear")),
        }
    }
}

impl fmt::Display for ResolvePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvePolicy::Nearest => write!(f, "nearest"),
            ResolvePolicy::Linear => write!(f, "linear"),
        }
    }
}

/// Soft warning: the requested temperature lies outside the table and the
/// boundary entry was used instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfTableRange {
    pub requested: Temperature,
    pub clamped_to: Temperature,
}

impl fmt::Display for OutOfTableRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temperature {} outside of table range, clamped to {}",
            self.requested, self.clamped_to
        )
    }
}

/// Which table rows a resolved resistance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// The table holds the requested temperature.
    Exact(usize),
    /// The closest entry (or the boundary entry when clamped).
    Nearest(usize),
    /// Interpolated between two adjacent entries.
    Interpolated { lower: usize, upper: usize },
}

/// The outcome of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub resistance: Ohms,
    pub source: ResolutionSource,
    pub out_of_range: Option<OutOfTableRange>,
}

/// An immutable resistance-temperature table sorted by ascending temperature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    entries: Vec<TableEntry>,
}

impl Table {
    /// Loads a table from a file.
    ///
    /// # Errors
    ///
    /// * [`Error::TableNotFound`] if the file does not exist.
    /// * [`Error::TableRead`] if the file cannot be read.
    /// * [`Error::TableParse`] / [`Error::EmptyTable`] for invalid content, see [`Table::parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                Error::TableNotFound(path.to_path_buf())
            } else {
                Error::TableRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let table = Self::parse(&text)?;
        debug!("Loaded {} table entries from {path:?}", table.entries.len());
        Ok(table)
    }

    /// Parses the textual table format.
    ///
    /// # Errors
    ///
    /// * [`Error::TableParse`] for an out-of-range resistance, a duplicate
    ///   temperature or a break of the monotonic temperature order.
    /// * [`Error::EmptyTable`] if no line yields an entry.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut rows = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if let Some(entry) = TableEntry::parse_line(line, index + 1)? {
                rows.push((index + 1, entry));
            }
        }
        Self::from_rows(rows)
    }

    /// Creates a table from entries in file order.
    pub fn from_entries(entries: Vec<TableEntry>) -> Result<Self, Error> {
        Self::from_rows(entries.into_iter().enumerate().map(|(i, e)| (i + 1, e)).collect())
    }

    fn from_rows(rows: Vec<(usize, TableEntry)>) -> Result<Self, Error> {
        if rows.is_empty() {
            return Err(Error::EmptyTable);
        }

        let mut descending = None;
        for pair in rows.windows(2) {
            let (_, previous) = &pair[0];
            let (line, current) = &pair[1];
            if current.temperature == previous.temperature {
                return Err(Error::TableParse {
                    line: *line,
                    reason: format!("duplicate temperature {}", current.temperature),
                });
            }
            let is_descending = current.temperature < previous.temperature;
            match descending {
                None => descending = Some(is_descending),
                Some(order) if order != is_descending => {
                    return Err(Error::TableParse {
                        line: *line,
                        reason: format!(
                            "temperature {} breaks the monotonic order of the table",
                            current.temperature
                        ),
                    });
                }
                Some(_) => {}
            }
        }

        let mut entries: Vec<TableEntry> = rows.into_iter().map(|(_, entry)| entry).collect();
        if descending == Some(true) {
            entries.reverse();
        }
        Ok(Self { entries })
    }

    /// The entries, sorted by ascending temperature.
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`: an empty table cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The lowest and highest temperature covered by the table.
    pub fn range(&self) -> (Temperature, Temperature) {
        let first = &self.entries[0];
        let last = &self.entries[self.entries.len() - 1];
        (first.temperature, last.temperature)
    }

    /// Resolves a target temperature to a resistance.
    ///
    /// An exact match always returns the entry's resistance. Between two
    /// entries the `policy` decides. Outside the table the boundary entry is
    /// used and [`Resolution::out_of_range`] is set.
    pub fn resolve(&self, target: Temperature, policy: ResolvePolicy) -> Resolution {
        let last = self.entries.len() - 1;
        match self
            .entries
            .binary_search_by_key(&target, |entry| entry.temperature)
        {
            Ok(index) => Resolution {
                resistance: self.entries[index].resistance,
                source: ResolutionSource::Exact(index),
                out_of_range: None,
            },
            Err(0) => self.clamp(target, 0),
            Err(upper) if upper > last => self.clamp(target, last),
            Err(upper) => {
                let lower = upper - 1;
                match policy {
                    ResolvePolicy::Nearest => {
                        let below = target.decidegrees() - self.entries[lower].temperature.decidegrees();
                        let above = self.entries[upper].temperature.decidegrees() - target.decidegrees();
                        let index = if below <= above { lower } else { upper };
                        Resolution {
                            resistance: self.entries[index].resistance,
                            source: ResolutionSource::Nearest(index),
                            out_of_range: None,
                        }
                    }
                    ResolvePolicy::Linear => Resolution {
                        resistance: interpolate(&self.entries[lower], &self.entries[upper], target),
                        source: ResolutionSource::Interpolated { lower, upper },
                        out_of_range: None,
                    },
                }
            }
        }
    }

    fn clamp(&self, target: Temperature, index: usize) -> Resolution {
        let entry = &self.entries[index];
        let warning = OutOfTableRange {
            requested: target,
            clamped_to: entry.temperature,
        };
        warn!("{warning}");
        Resolution {
            resistance: entry.resistance,
            source: ResolutionSource::Nearest(index),
            out_of_range: Some(warning),
        }
    }
}

/// `R = R1 + (R2 - R1) * (T - T1) / (T2 - T1)`, rounded to the nearest ohm.
fn interpolate(lower: &TableEntry, upper: &TableEntry, target: Temperature) -> Ohms {
    let r1 = i64::from(lower.resistance.get());
    let r2 = i64::from(upper.resistance.get());
    let t1 = i64::from(lower.temperature.decidegrees());
    let t2 = i64::from(upper.temperature.decidegrees());
    let t = i64::from(target.decidegrees());

    let numerator = (r2 - r1) * (t - t1);
    let denominator = t2 - t1;
    let offset = (2 * numerator + numerator.signum() * denominator) / (2 * denominator);
    // The result lies between r1 and r2, both of which are valid.
    Ohms::try_from(r1 + offset).unwrap_or(lower.resistance)
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "{:>8} {:>9} Ω  {}",
                entry.temperature.to_string(),
                entry.resistance.to_string(),
                entry.comment
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn temp(degrees: i32) -> Temperature {
        Temperature::from_decidegrees(degrees * 10)
    }

    fn ohms(value: u32) -> Ohms {
        Ohms::try_from(value).unwrap()
    }

    fn three_point_table() -> Table {
        Table::parse("1000 ; -40C\n2000 ; 0C\n3000 ; 25C\n").unwrap()
    }

    #[test]
    fn trailing_temperature_extraction() {
        assert_eq!(trailing_temperature("25C"), Some(temp(25)));
        assert_eq!(trailing_temperature("-40C"), Some(temp(-40)));
        assert_eq!(trailing_temperature("NTC 10k -20 °C"), Some(temp(-20)));
        assert_eq!(trailing_temperature("T=+85c"), Some(temp(85)));
        assert_eq!(trailing_temperature("range 0-25C"), Some(temp(25)));
        assert_eq!(
            trailing_temperature("37.5C"),
            Some(Temperature::from_decidegrees(375))
        );
        assert_eq!(trailing_temperature("100"), Some(temp(100)));
        assert_eq!(trailing_temperature("room temperature"), None);
        assert_eq!(trailing_temperature("C"), None);
        assert_eq!(trailing_temperature("1.2.3C"), None);
    }

    #[test]
    fn parse_skips_unusable_lines() {
        let table = Table::parse(
            "; NTC 10k table\n\
             \n\
             # generated\n\
             OPEN ; -60C\n\
             abc ; -50C\n\
             1000 ; -40C\n\
             1500\n\
             1700 ; no temperature here\n\
             2000 ; 0C\n\
             3000 ; sensor A ; 25C\n",
        )
        .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.entries()[0].resistance, ohms(1000));
        assert_eq!(table.entries()[2].temperature, temp(25));
        assert_eq!(table.entries()[2].comment, "sensor A ; 25C");
        assert_eq!(table.range(), (temp(-40), temp(25)));
    }

    #[test]
    fn parse_descending_table_is_normalized() {
        let table = Table::parse("3000 ; 25C\n2000 ; 0C\n1000 ; -40C\n").unwrap();
        assert_eq!(table, three_point_table());
    }

    #[test]
    fn parse_errors() {
        assert_matches!(Table::parse(""), Err(Error::EmptyTable));
        assert_matches!(Table::parse("; only comments\nfoo\n"), Err(Error::EmptyTable));
        assert_matches!(
            Table::parse("1000 ; 0C\n2000 ; 0C\n"),
            Err(Error::TableParse { line: 2, .. })
        );
        assert_matches!(
            Table::parse("1000 ; 0C\n2000 ; 10C\n1500 ; 5C\n"),
            Err(Error::TableParse { line: 3, .. })
        );
        assert_matches!(
            Table::parse("1000 ; 0C\n7000001 ; 10C\n"),
            Err(Error::TableParse { line: 2, .. })
        );
        assert_matches!(
            Table::parse("-5 ; 0C\n"),
            Err(Error::TableParse { line: 1, .. })
        );
    }

    #[test]
    fn load_distinguishes_missing_file() {
        let path = std::env::temp_dir().join(format!("rm550-missing-{}.txt", std::process::id()));
        assert_matches!(Table::load(&path), Err(Error::TableNotFound(p)) if p == path);
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("rm550-table-{}.txt", std::process::id()));
        std::fs::write(&path, "332094 ; -40C\n32650 ; 0C\n10000 ; 25C\n").unwrap();
        let table = Table::load(&path);
        std::fs::remove_file(&path).unwrap();
        let table = table.unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve(temp(25), ResolvePolicy::Nearest).resistance, ohms(10000));
    }

    #[test]
    fn resolve_exact() {
        let table = three_point_table();
        for policy in [ResolvePolicy::Nearest, ResolvePolicy::Linear] {
            let resolution = table.resolve(temp(25), policy);
            assert_eq!(resolution.resistance, ohms(3000));
            assert_eq!(resolution.source, ResolutionSource::Exact(2));
            assert_eq!(resolution.out_of_range, None);
            assert_eq!(table.resolve(temp(-40), policy).resistance, ohms(1000));
        }
    }

    #[test]
    fn resolve_nearest() {
        let table = three_point_table();
        let resolution = table.resolve(temp(12), ResolvePolicy::Nearest);
        assert_eq!(resolution.resistance, ohms(2000));
        assert_eq!(resolution.source, ResolutionSource::Nearest(1));
        assert_eq!(table.resolve(temp(13), ResolvePolicy::Nearest).resistance, ohms(3000));
        // 12.5C is equally far from 0C and 25C.
        let tie = Temperature::from_decidegrees(125);
        assert_eq!(table.resolve(tie, ResolvePolicy::Nearest).resistance, ohms(2000));
    }

    #[test]
    fn resolve_linear() {
        let table = three_point_table();
        let resolution = table.resolve(temp(12), ResolvePolicy::Linear);
        assert_eq!(resolution.resistance, ohms(2480));
        assert_eq!(
            resolution.source,
            ResolutionSource::Interpolated { lower: 1, upper: 2 }
        );
        assert_eq!(table.resolve(temp(-20), ResolvePolicy::Linear).resistance, ohms(1500));
    }

    #[test]
    fn resolve_linear_decreasing_resistance_rounds() {
        let table = Table::parse("10000 ; 0C\n1 ; 30C\n").unwrap();
        // 10000 - 9999 * 10 / 30 = 6667
        assert_eq!(table.resolve(temp(10), ResolvePolicy::Linear).resistance, ohms(6667));
        // 10000 - 9999 * 20 / 30 = 3334
        assert_eq!(table.resolve(temp(20), ResolvePolicy::Linear).resistance, ohms(3334));
    }

    #[test]
    fn resolve_outside_range_clamps_with_warning() {
        let table = three_point_table();
        for policy in [ResolvePolicy::Nearest, ResolvePolicy::Linear] {
            let below = table.resolve(temp(-55), policy);
            assert_eq!(below.resistance, ohms(1000));
            assert_eq!(
                below.out_of_range,
                Some(OutOfTableRange {
                    requested: temp(-55),
                    clamped_to: temp(-40)
                })
            );
            let above = table.resolve(temp(150), policy);
            assert_eq!(above.resistance, ohms(3000));
            assert_eq!(above.source, ResolutionSource::Nearest(2));
            assert!(above.out_of_range.is_some());
        }
    }

    #[test]
    fn single_entry_table() {
        let table = Table::parse("4700 ; 20C\n").unwrap();
        assert_eq!(table.resolve(temp(20), ResolvePolicy::Linear).resistance, ohms(4700));
        assert!(table
            .resolve(temp(21), ResolvePolicy::Linear)
            .out_of_range
            .is_some());
    }

    #[test]
    fn byte_order_mark_keeps_first_row() {
        let table = Table::parse("\u{feff}1000 ; -40C\n2000 ; 0C\n").unwrap();
        assert_eq!(table.len(), 2);
        let resolution = table.resolve(temp(-40), ResolvePolicy::Nearest);
        assert_eq!(resolution.resistance, ohms(1000));
        assert_eq!(resolution.out_of_range, None);
    }
}

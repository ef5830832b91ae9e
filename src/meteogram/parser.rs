//! Meteogram text parser
//!
//! Turns the provider's ASCII export into one [`ForecastSeries`] per declared
//! location. The grammar is line oriented:
//!
//! ```text
//! REFERENCE 2024-01-01T00:00:00Z
//! TEMPERATURE_UNIT K
//! WIND_UNIT m/s
//! LOCATION campinas P042 Campinas
//! BLOCK P042
//! 2024-01-01T03:00:00Z, 300.15, 45, 3.2, 0.0
//! 10800, 301.15, 44, 3.5, 0.2
//! END
//! ```
//!
//! Parsing is tolerant: a broken row is skipped with a [`ParseWarning`], a
//! broken value leaves that single variable absent. Only an export without
//! any location or any data point is rejected.

use super::units::{TemperatureUnit, WindUnit};
use super::{ParseError, ParseWarning, WarningKind};
use crate::models::{ForecastPoint, ForecastSeries, Location, Meteogram, Variable};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const ROW_COLUMNS: usize = 5;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub meteogram: Meteogram,
    /// Skipped lines and absent fields, in source order
    pub warnings: Vec<ParseWarning>,
}

/// Meteogram export parser
pub struct MeteogramParser;

impl MeteogramParser {
    /// Read and parse a meteogram file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ParseOutcome, ParseError> {
        let path = path.as_ref();
        info!("Loading meteogram from: {:?}", path);

        let content = fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse_bytes(&content)
    }

    /// Parse meteogram content. Same input always yields the same outcome.
    pub fn parse(content: &str) -> Result<ParseOutcome, ParseError> {
        Self::parse_bytes(content.as_bytes())
    }

    /// Parse raw export bytes.
    ///
    /// Lines that are not valid UTF-8 are decoded lossily and reported with
    /// [`WarningKind::InvalidEncoding`]; they are still parsed.
    pub fn parse_bytes(content: &[u8]) -> Result<ParseOutcome, ParseError> {
        let mut state = ParserState::default();

        for (index, raw) in content.split(|b| *b == b'\n').enumerate() {
            let line = index + 1;
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let text = String::from_utf8_lossy(raw);
            if let Cow::Owned(_) = text {
                state.warn(
                    line,
                    WarningKind::InvalidEncoding,
                    "line is not valid UTF-8, undecodable bytes replaced",
                );
            }
            state.process_line(line, &text);
        }

        let outcome = state.finish()?;
        info!(
            "Parsed meteogram: {} locations, {} points ({} warnings)",
            outcome.meteogram.len(),
            outcome.meteogram.point_count(),
            outcome.warnings.len()
        );
        Ok(outcome)
    }
}

/// Location declared in the header, with the points collected for it so far
#[derive(Debug)]
struct DeclaredLocation {
    location: Location,
    line: usize,
    points: Vec<ForecastPoint>,
    seen: HashSet<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy)]
enum Block {
    #[default]
    None,
    Location(usize),
    Ignored,
}

#[derive(Debug, Default)]
struct ParserState {
    reference: Option<DateTime<Utc>>,
    temperature_unit: TemperatureUnit,
    wind_unit: WindUnit,
    locations: Vec<DeclaredLocation>,
    block: Block,
    warnings: Vec<ParseWarning>,
}

impl ParserState {
    fn warn(&mut self, line: usize, kind: WarningKind, message: impl Into<String>) {
        let warning = ParseWarning {
            line,
            kind,
            message: message.into(),
        };
        warn!("Meteogram {}", warning);
        self.warnings.push(warning);
    }

    fn process_line(&mut self, line: usize, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }

        let (keyword, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (trimmed, ""),
        };

        match keyword.to_ascii_uppercase().as_str() {
            "REFERENCE" => self.reference_directive(line, rest),
            "TEMPERATURE_UNIT" => match TemperatureUnit::parse(rest) {
                Some(unit) => self.temperature_unit = unit,
                None => self.warn(
                    line,
                    WarningKind::InvalidDirective,
                    format!("unknown temperature unit '{rest}'"),
                ),
            },
            "WIND_UNIT" => match WindUnit::parse(rest) {
                Some(unit) => self.wind_unit = unit,
                None => self.warn(
                    line,
                    WarningKind::InvalidDirective,
                    format!("unknown wind unit '{rest}'"),
                ),
            },
            "LOCATION" => self.declare_location(line, rest),
            "BLOCK" => self.start_block(line, rest),
            "END" => self.block = Block::None,
            _ if starts_like_row(trimmed) => self.data_row(line, trimmed),
            _ => self.warn(
                line,
                WarningKind::UnknownDirective,
                format!("unrecognized line '{trimmed}'"),
            ),
        }
    }

    fn reference_directive(&mut self, line: usize, rest: &str) {
        match parse_absolute_timestamp(rest) {
            Some(reference) => {
                debug!("Meteogram reference time: {}", reference);
                self.reference = Some(reference);
            }
            None => self.warn(
                line,
                WarningKind::InvalidDirective,
                format!("invalid reference time '{rest}'"),
            ),
        }
    }

    fn declare_location(&mut self, line: usize, rest: &str) {
        let mut tokens = rest.split_whitespace();
        let (Some(id), Some(polygon)) = (tokens.next(), tokens.next()) else {
            self.warn(
                line,
                WarningKind::InvalidDirective,
                "location declaration needs an id and a polygon",
            );
            return;
        };
        let name = tokens.collect::<Vec<_>>().join(" ");
        let name = if name.is_empty() { id.to_string() } else { name };

        if let Some(existing) = self
            .locations
            .iter()
            .find(|d| d.location.id == id || d.location.polygon == polygon)
        {
            let first_line = existing.line;
            self.warn(
                line,
                WarningKind::DuplicateLocation,
                format!("location '{id}' / polygon '{polygon}' already declared on line {first_line}"),
            );
            return;
        }

        self.locations.push(DeclaredLocation {
            location: Location::new(id, polygon, name),
            line,
            points: Vec::new(),
            seen: HashSet::new(),
        });
    }

    fn start_block(&mut self, line: usize, rest: &str) {
        let reference = rest.split_whitespace().next().unwrap_or_default();
        if reference.is_empty() {
            self.block = Block::Ignored;
            self.warn(line, WarningKind::InvalidDirective, "block header without polygon");
            return;
        }

        match self
            .locations
            .iter()
            .position(|d| d.location.matches_reference(reference))
        {
            Some(index) => self.block = Block::Location(index),
            None => {
                self.block = Block::Ignored;
                self.warn(
                    line,
                    WarningKind::UnknownBlock,
                    format!("block for undeclared polygon '{reference}', rows ignored"),
                );
            }
        }
    }

    fn data_row(&mut self, line: usize, row: &str) {
        let index = match self.block {
            Block::Location(index) => index,
            Block::Ignored => return,
            Block::None => {
                self.warn(
                    line,
                    WarningKind::RowOutsideBlock,
                    "data row outside of a location block",
                );
                return;
            }
        };

        let fields = split_row(row);
        if fields.len() != ROW_COLUMNS {
            self.warn(
                line,
                WarningKind::WrongColumnCount,
                format!("expected {ROW_COLUMNS} columns, found {}", fields.len()),
            );
            return;
        }

        let timestamp = match parse_row_timestamp(fields[0], self.reference) {
            Ok(timestamp) => timestamp,
            Err(message) => {
                self.warn(line, WarningKind::InvalidTimestamp, message);
                return;
            }
        };

        if !self.locations[index].seen.insert(timestamp) {
            let id = self.locations[index].location.id.clone();
            self.warn(
                line,
                WarningKind::DuplicateTimestamp,
                format!("duplicate timestamp {timestamp} for '{id}', keeping the first"),
            );
            return;
        }

        let mut point = ForecastPoint::empty(timestamp);
        for (variable, field) in Variable::ALL.into_iter().zip(&fields[1..]) {
            match parse_value(field) {
                Some(value) => point.set(variable, Some(self.normalize(variable, value))),
                None => self.warn(
                    line,
                    WarningKind::InvalidField(variable),
                    format!("{variable} value '{field}' is missing or invalid"),
                ),
            }
        }

        self.locations[index].points.push(point);
    }

    fn normalize(&self, variable: Variable, value: f64) -> f64 {
        match variable {
            Variable::Temperature => self.temperature_unit.to_celsius(value),
            Variable::WindSpeed => self.wind_unit.to_kmh(value),
            Variable::Humidity | Variable::Rainfall => value,
        }
    }

    fn finish(mut self) -> Result<ParseOutcome, ParseError> {
        if self.locations.is_empty() {
            return Err(ParseError::NoLocations);
        }

        let declared = std::mem::take(&mut self.locations);
        let mut series = Vec::with_capacity(declared.len());
        for declaration in declared {
            if declaration.points.is_empty() {
                self.warn(
                    declaration.line,
                    WarningKind::EmptyLocation,
                    format!("location '{}' has no data points", declaration.location.id),
                );
                continue;
            }
            let (location_series, _) =
                ForecastSeries::from_points(declaration.location, declaration.points);
            series.push(location_series);
        }

        if series.is_empty() {
            return Err(ParseError::NoDataPoints);
        }

        Ok(ParseOutcome {
            meteogram: Meteogram::new(series),
            warnings: self.warnings,
        })
    }
}

fn starts_like_row(line: &str) -> bool {
    line.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+')
}

/// Row fields; comma separated, or whitespace separated with the last four
/// tokens as values so timestamps may contain a space
fn split_row(row: &str) -> Vec<&str> {
    if row.contains(',') {
        return row.split(',').map(str::trim).collect();
    }

    let mut rest = row.trim();
    let mut fields = Vec::with_capacity(ROW_COLUMNS);
    for _ in 1..ROW_COLUMNS {
        match rest.rsplit_once(char::is_whitespace) {
            Some((head, value)) => {
                fields.push(value);
                rest = head.trim_end();
            }
            None => break,
        }
    }
    fields.push(rest);
    fields.reverse();
    fields
}

/// Numeric value of a field; `None` for empty, placeholder or unparsable fields
fn parse_value(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field == "-" || field.eq_ignore_ascii_case("na") {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Row timestamp: absolute, or whole seconds after the `REFERENCE` time
fn parse_row_timestamp(
    field: &str,
    reference: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, String> {
    let digits = field.trim_start_matches(['-', '+']);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        let seconds: i64 = field
            .parse()
            .map_err(|_| format!("invalid time offset '{field}'"))?;
        let reference =
            reference.ok_or_else(|| format!("time offset '{field}' without REFERENCE"))?;
        return TimeDelta::try_seconds(seconds)
            .and_then(|delta| reference.checked_add_signed(delta))
            .ok_or_else(|| format!("time offset '{field}' out of range"));
    }

    parse_absolute_timestamp(field).ok_or_else(|| format!("invalid timestamp '{field}'"))
}

/// Absolute UTC timestamp in any of the accepted layouts
fn parse_absolute_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    // run identifier layout, e.g. 2024010100
    if text.len() == 10 && text.chars().all(|c| c.is_ascii_digit()) {
        let date = NaiveDate::parse_from_str(&text[..8], "%Y%m%d").ok()?;
        let hour: u32 = text[8..].parse().ok()?;
        return date.and_hms_opt(hour, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

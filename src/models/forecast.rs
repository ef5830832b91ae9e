//! Forecast series model and the parsed meteogram mapping

use super::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Forecast variables carried by every meteogram row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    Humidity,
    WindSpeed,
    Rainfall,
}

impl Variable {
    /// Fixed evaluation order of the alert checks
    pub const ALL: [Variable; 4] = [
        Variable::Temperature,
        Variable::Humidity,
        Variable::WindSpeed,
        Variable::Rainfall,
    ];

    /// Machine key used in rule tables and event types
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::Humidity => "humidity",
            Variable::WindSpeed => "wind_speed",
            Variable::Rainfall => "rainfall",
        }
    }

    /// Unit of the normalized values
    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            Variable::Temperature => "°C",
            Variable::Humidity => "%",
            Variable::WindSpeed => "km/h",
            Variable::Rainfall => "mm",
        }
    }

    /// Parse a variable name, accepting the common aliases of rule tables
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temp" => Some(Variable::Temperature),
            "humidity" | "relative_humidity" => Some(Variable::Humidity),
            "wind_speed" | "wind" => Some(Variable::WindSpeed),
            "rainfall" | "rain" | "precipitation" => Some(Variable::Rainfall),
            _ => None,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One forecast time step for a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Forecast valid time
    pub timestamp: DateTime<Utc>,
    /// Temperature in Celsius
    pub temperature: Option<f64>,
    /// Relative humidity in percent
    pub humidity: Option<f64>,
    /// Wind speed in km/h
    pub wind_speed: Option<f64>,
    /// Rainfall in mm
    pub rainfall: Option<f64>,
}

impl ForecastPoint {
    /// Create a point with every variable absent
    #[must_use]
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            temperature: None,
            humidity: None,
            wind_speed: None,
            rainfall: None,
        }
    }

    #[must_use]
    pub fn value(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::Temperature => self.temperature,
            Variable::Humidity => self.humidity,
            Variable::WindSpeed => self.wind_speed,
            Variable::Rainfall => self.rainfall,
        }
    }

    pub fn set(&mut self, variable: Variable, value: Option<f64>) {
        match variable {
            Variable::Temperature => self.temperature = value,
            Variable::Humidity => self.humidity = value,
            Variable::WindSpeed => self.wind_speed = value,
            Variable::Rainfall => self.rainfall = value,
        }
    }
}

/// Extreme value of one variable across a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extreme {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Time-ordered forecast points of a single location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    /// Location this series belongs to
    pub location: Location,
    /// Points with strictly increasing timestamps
    points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    /// Build a series from points in source order.
    ///
    /// Points are ordered by timestamp. When a timestamp repeats, the occurrence
    /// that appeared first wins; the discarded duplicates are returned.
    #[must_use]
    pub fn from_points(
        location: Location,
        mut points: Vec<ForecastPoint>,
    ) -> (Self, Vec<ForecastPoint>) {
        // stable sort keeps source order among equal timestamps
        points.sort_by_key(|p| p.timestamp);

        let mut kept: Vec<ForecastPoint> = Vec::with_capacity(points.len());
        let mut duplicates = Vec::new();
        for point in points {
            match kept.last() {
                Some(last) if last.timestamp == point.timestamp => duplicates.push(point),
                _ => kept.push(point),
            }
        }

        (
            Self {
                location,
                points: kept,
            },
            duplicates,
        )
    }

    #[must_use]
    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Highest present value of `variable`, earliest point on ties
    #[must_use]
    pub fn maximum(&self, variable: Variable) -> Option<Extreme> {
        self.extreme(variable, |candidate, best| candidate > best)
    }

    /// Lowest present value of `variable`, earliest point on ties
    #[must_use]
    pub fn minimum(&self, variable: Variable) -> Option<Extreme> {
        self.extreme(variable, |candidate, best| candidate < best)
    }

    fn extreme(&self, variable: Variable, better: impl Fn(f64, f64) -> bool) -> Option<Extreme> {
        self.points.iter().fold(None, |best: Option<Extreme>, point| {
            let Some(value) = point.value(variable) else {
                return best;
            };
            match best {
                Some(current) if !better(value, current.value) => Some(current),
                _ => Some(Extreme {
                    value,
                    timestamp: point.timestamp,
                }),
            }
        })
    }
}

/// Parsed meteogram: one series per location, in header declaration order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meteogram {
    series: Vec<ForecastSeries>,
}

impl Meteogram {
    #[must_use]
    pub fn new(series: Vec<ForecastSeries>) -> Self {
        Self { series }
    }

    /// Series of a location by id
    #[must_use]
    pub fn get(&self, location_id: &str) -> Option<&ForecastSeries> {
        self.series.iter().find(|s| s.location.id == location_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForecastSeries> {
        self.series.iter()
    }

    #[must_use]
    pub fn location_ids(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.location.id.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of points across all locations
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.series.iter().map(ForecastSeries::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn point(hour: u32, temperature: Option<f64>) -> ForecastPoint {
        ForecastPoint {
            temperature,
            ..ForecastPoint::empty(at(hour))
        }
    }

    #[test]
    fn test_series_orders_and_keeps_first_duplicate() {
        let location = Location::new("a", "P1", "Alpha");
        let points = vec![
            point(6, Some(20.0)),
            point(3, Some(18.0)),
            point(6, Some(99.0)),
            point(9, Some(25.0)),
        ];

        let (series, duplicates) = ForecastSeries::from_points(location, points);

        let hours: Vec<_> = series.points().iter().map(|p| p.timestamp).collect();
        assert_eq!(hours, vec![at(3), at(6), at(9)]);
        assert_eq!(series.points()[1].temperature, Some(20.0));
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].temperature, Some(99.0));
    }

    #[test]
    fn test_extremes_skip_absent_values_and_prefer_earliest() {
        let location = Location::new("a", "P1", "Alpha");
        let points = vec![
            point(0, Some(30.0)),
            point(1, None),
            point(2, Some(31.0)),
            point(3, Some(31.0)),
            point(4, Some(12.0)),
        ];
        let (series, _) = ForecastSeries::from_points(location, points);

        let max = series.maximum(Variable::Temperature).unwrap();
        assert_eq!(max.value, 31.0);
        assert_eq!(max.timestamp, at(2));

        let min = series.minimum(Variable::Temperature).unwrap();
        assert_eq!(min.value, 12.0);
        assert_eq!(min.timestamp, at(4));

        assert!(series.maximum(Variable::Rainfall).is_none());
    }

    #[test]
    fn test_variable_aliases() {
        assert_eq!(Variable::parse("Temp"), Some(Variable::Temperature));
        assert_eq!(Variable::parse(" wind "), Some(Variable::WindSpeed));
        assert_eq!(Variable::parse("precipitation"), Some(Variable::Rainfall));
        assert_eq!(Variable::parse("pressure"), None);
    }
}

//! Unit normalization for meteogram values
//!
//! Forecast values are normalized to °C and km/h before they reach the
//! alert engine, whatever units the export declares.

#[must_use]
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

#[must_use]
pub fn ms_to_kmh(speed_ms: f64) -> f64 {
    speed_ms * 3.6
}

/// Temperature unit declared by `TEMPERATURE_UNIT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Kelvin,
}

impl TemperatureUnit {
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "c" | "celsius" | "°c" => Some(TemperatureUnit::Celsius),
            "k" | "kelvin" => Some(TemperatureUnit::Kelvin),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Kelvin => kelvin_to_celsius(value),
        }
    }
}

/// Wind speed unit declared by `WIND_UNIT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindUnit {
    #[default]
    KilometresPerHour,
    MetresPerSecond,
}

impl WindUnit {
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "km/h" | "kmh" | "kph" => Some(WindUnit::KilometresPerHour),
            "m/s" | "ms" | "mps" => Some(WindUnit::MetresPerSecond),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_kmh(self, value: f64) -> f64 {
        match self {
            WindUnit::KilometresPerHour => value,
            WindUnit::MetresPerSecond => ms_to_kmh(value),
        }
    }
}

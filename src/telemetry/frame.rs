//! # Frame Formatter
//!
//! Builds the two pipe-delimited frame strings from a [`SensorSnapshot`]:
//!
//! ```text
//! T|Latitude: ..|Longitude: ..|Lat Dilution: ..|Altitude: ..|Internal Temperature: ..|External Temperature: ..|Pressure: ..
//! D|Altitude: ..|Altitude2: ..|External Temperature: ..|Auxiliary Temperature: ..|Pressure: ..|UVA: ..|UVB: ..
//! ```
//!
//! Every field is always present. A missing value renders as an empty
//! token, so the ground station can split on `|` with a fixed field count.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::sensors::SensorSnapshot;

/// Telemetry frame prefix
pub const TELEMETRY_PREFIX: &str = "T|";

/// Science frame prefix
pub const SCIENCE_PREFIX: &str = "D|";

/// Field separator
pub const FIELD_SEPARATOR: char = '|';

/// How each kind of quantity is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Latitude,
    Longitude,
    Dilution,
    GpsAltitude,
    Temperature,
    Pressure,
    PressureAltitude,
    Uv,
}

impl Quantity {
    /// `(width, precision)` of the rendered number
    pub fn layout(self) -> (usize, usize) {
        match self {
            Quantity::Latitude => (8, 5),
            Quantity::Longitude => (9, 5),
            Quantity::Dilution => (5, 2),
            Quantity::GpsAltitude => (8, 5),
            Quantity::Temperature => (7, 3),
            Quantity::Pressure => (7, 2),
            Quantity::PressureAltitude => (5, 2),
            Quantity::Uv => (0, 4),
        }
    }

    /// Render a value, or the empty token when there is none
    pub fn render(self, value: Option<f64>) -> String {
        let Some(value) = value else {
            return String::new();
        };
        let value = match self {
            Quantity::PressureAltitude => value.abs(),
            _ => value,
        };
        let (width, precision) = self.layout();
        format!("{:width$.precision$}", value, width = width, precision = precision)
    }
}

/// Position and housekeeping frame sent on the telemetry cadence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryFrame {
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub lat_dilution: Option<f64>,
    pub altitude: Option<f64>,
    pub internal_temperature: Option<f64>,
    pub external_temperature: Option<f64>,
    pub pressure: Option<f64>,
}

impl TelemetryFrame {
    pub fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        Self {
            timestamp: snapshot.taken_at,
            latitude: snapshot.gps.latitude_deg,
            longitude: snapshot.gps.longitude_deg,
            lat_dilution: snapshot.gps.hdop,
            altitude: snapshot.gps.altitude_m,
            internal_temperature: snapshot.internal_temperature,
            external_temperature: snapshot.external_temperature,
            pressure: snapshot.pressure_mbar(),
        }
    }

    /// Frame text without the `T|` prefix
    pub fn body(&self) -> String {
        [
            ("Latitude", Quantity::Latitude.render(self.latitude)),
            ("Longitude", Quantity::Longitude.render(self.longitude)),
            ("Lat Dilution", Quantity::Dilution.render(self.lat_dilution)),
            ("Altitude", Quantity::GpsAltitude.render(self.altitude)),
            (
                "Internal Temperature",
                Quantity::Temperature.render(self.internal_temperature),
            ),
            (
                "External Temperature",
                Quantity::Temperature.render(self.external_temperature),
            ),
            ("Pressure", Quantity::Pressure.render(self.pressure)),
        ]
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("|")
    }
}

impl fmt::Display for TelemetryFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TELEMETRY_PREFIX, self.body())
    }
}

/// Science data frame sent on the science cadence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScienceFrame {
    pub altitude: Option<f64>,
    pub pressure_altitude: Option<f64>,
    pub external_temperature: Option<f64>,
    pub auxiliary_temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub uva: Option<f64>,
    pub uvb: Option<f64>,
}

impl ScienceFrame {
    pub fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        Self {
            altitude: snapshot.gps.altitude_m,
            pressure_altitude: snapshot.pressure_altitude(),
            external_temperature: snapshot.external_temperature,
            auxiliary_temperature: snapshot.auxiliary_temperature(),
            pressure: snapshot.pressure_mbar(),
            uva: snapshot.uva(),
            uvb: snapshot.uvb(),
        }
    }

    /// Frame text without the `D|` prefix; this is the radio payload
    pub fn body(&self) -> String {
        [
            ("Altitude", Quantity::GpsAltitude.render(self.altitude)),
            (
                "Altitude2",
                Quantity::PressureAltitude.render(self.pressure_altitude),
            ),
            (
                "External Temperature",
                Quantity::Temperature.render(self.external_temperature),
            ),
            (
                "Auxiliary Temperature",
                Quantity::Temperature.render(self.auxiliary_temperature),
            ),
            ("Pressure", Quantity::Pressure.render(self.pressure)),
            ("UVA", Quantity::Uv.render(self.uva)),
            ("UVB", Quantity::Uv.render(self.uvb)),
        ]
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("|")
    }
}

impl fmt::Display for ScienceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SCIENCE_PREFIX, self.body())
    }
}

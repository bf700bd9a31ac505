//! # NMEA GGA Parser
//!
//! Decodes `$--GGA` fix-data sentences and folds them into [`GpsState`].
//!
//! ## Field layout
//!
//! | # | Field | Example |
//! |---|-------|---------|
//! | 0 | Talker + sentence id | `$GPGGA` |
//! | 1 | UTC time | `123519` |
//! | 2 | Latitude (`ddmm.mmm`) | `4807.038` |
//! | 3 | N/S | `N` |
//! | 4 | Longitude (`dddmm.mmm`) | `01131.000` |
//! | 5 | E/W | `E` |
//! | 6 | Fix quality | `1` |
//! | 7 | Satellites in use | `08` |
//! | 8 | Horizontal dilution | `0.9` |
//! | 9 | Altitude | `545.4` |
//! | 10 | Altitude units | `M` |
//! | 11 | Geoid separation | `46.9` |
//! | 12 | Separation units | `M` |
//! | 13 | Age of differential data | |
//! | 14 | Reference station id | |
//!
//! A sentence is decoded completely before any of it is applied: if one
//! field is malformed the whole sentence is rejected and the state is left
//! exactly as it was.

use std::str::FromStr;
use tracing::warn;

use crate::error::{PayloadError, Result};

/// Number of comma-separated fields in a GGA sentence
pub const GGA_FIELD_COUNT: usize = 15;

/// Sentence id that marks a fix-data sentence
pub const GGA_ID: &str = "GGA";

/// One decoded GGA sentence
#[derive(Debug, Clone, PartialEq)]
pub struct RawFix {
    pub talker: String,
    pub time: String,
    /// Latitude magnitude in `ddmm.mmm` form
    pub latitude: Option<f64>,
    pub latitude_hemisphere: String,
    /// Longitude magnitude in `dddmm.mmm` form
    pub longitude: Option<f64>,
    pub longitude_hemisphere: String,
    pub fix_quality: Option<u8>,
    pub satellites: Option<u8>,
    pub hdop: Option<f64>,
    pub altitude: Option<f64>,
    pub altitude_units: String,
    pub geoid_separation: Option<f64>,
    pub geoid_units: String,
    pub age: Option<f64>,
    pub station_id: String,
}

/// Position state built up from successive GGA sentences
///
/// Every field keeps its last reported value when a newer sentence leaves
/// that field empty.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpsState {
    pub latitude_deg: Option<f64>,
    pub longitude_deg: Option<f64>,
    pub hdop: Option<f64>,
    pub altitude_m: Option<f64>,
}

/// Convert `[d]ddmm.mmm` to decimal degrees
///
/// # Examples
///
/// ```
/// use payload_controller::sensors::gps::nmea::to_decimal_degrees;
///
/// let degrees = to_decimal_degrees(4807.038);
/// assert!((degrees - 48.1173).abs() < 1e-9);
/// ```
pub fn to_decimal_degrees(raw: f64) -> f64 {
    let degrees = (raw / 100.0).floor();
    let minutes = raw - 100.0 * degrees;
    degrees + minutes / 60.0
}

/// Sign applied by a hemisphere letter
///
/// `S` and `W` negate. Any other code, including an empty one, leaves the
/// magnitude positive.
pub fn hemisphere_sign(code: &str) -> f64 {
    match code {
        "S" | "W" => -1.0,
        "N" | "E" => 1.0,
        other => {
            warn!("Unexpected hemisphere code {:?}, treating as N/E", other);
            1.0
        }
    }
}

/// XOR checksum of the characters between `$` and `*`
pub fn nmea_checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

fn optional<T: FromStr>(value: &str, field: &str) -> Result<Option<T>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<T>()
        .map(Some)
        .map_err(|_| PayloadError::Parse(format!("{} is not numeric: {:?}", field, value)))
}

fn optional_float(value: &str, field: &str) -> Result<Option<f64>> {
    match optional::<f64>(value, field)? {
        Some(v) if !v.is_finite() => Err(PayloadError::Parse(format!(
            "{} is not a finite number: {:?}",
            field, value
        ))),
        other => Ok(other),
    }
}

fn coordinate(value: &str, field: &str) -> Result<Option<f64>> {
    match optional_float(value, field)? {
        Some(v) if v < 0.0 => Err(PayloadError::Parse(format!(
            "{} must be unsigned, got {}",
            field, value
        ))),
        other => Ok(other),
    }
}

impl FromStr for RawFix {
    type Err = PayloadError;

    fn from_str(sentence: &str) -> Result<Self> {
        let sentence = sentence.trim();

        let body = match sentence.split_once('*') {
            Some((body, checksum)) => {
                let expected = u8::from_str_radix(checksum.trim(), 16).map_err(|_| {
                    PayloadError::Parse(format!("Invalid checksum field: {:?}", checksum))
                })?;
                let calculated = nmea_checksum(body.trim_start_matches('$'));
                if calculated != expected {
                    return Err(PayloadError::Parse(format!(
                        "Checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
                        expected, calculated
                    )));
                }
                body
            }
            None => sentence,
        };

        let fields: Vec<&str> = body.split(',').collect();
        if fields.len() != GGA_FIELD_COUNT {
            return Err(PayloadError::Parse(format!(
                "GGA sentence has {} fields, expected {}",
                fields.len(),
                GGA_FIELD_COUNT
            )));
        }

        if !fields[0].contains(GGA_ID) {
            return Err(PayloadError::Parse(format!(
                "Not a GGA sentence: {}",
                fields[0]
            )));
        }

        Ok(RawFix {
            talker: fields[0].to_string(),
            time: fields[1].to_string(),
            latitude: coordinate(fields[2], "latitude")?,
            latitude_hemisphere: fields[3].to_string(),
            longitude: coordinate(fields[4], "longitude")?,
            longitude_hemisphere: fields[5].to_string(),
            fix_quality: optional(fields[6], "fix quality")?,
            satellites: optional(fields[7], "satellite count")?,
            hdop: optional_float(fields[8], "horizontal dilution")?,
            altitude: optional_float(fields[9], "altitude")?,
            altitude_units: fields[10].to_string(),
            geoid_separation: optional_float(fields[11], "geoid separation")?,
            geoid_units: fields[12].to_string(),
            age: optional_float(fields[13], "differential age")?,
            station_id: fields[14].to_string(),
        })
    }
}

impl GpsState {
    /// Fold a decoded fix into the state
    pub fn apply(&mut self, fix: &RawFix) {
        if let Some(raw) = fix.latitude {
            self.latitude_deg =
                Some(hemisphere_sign(&fix.latitude_hemisphere) * to_decimal_degrees(raw));
        }
        if let Some(raw) = fix.longitude {
            self.longitude_deg =
                Some(hemisphere_sign(&fix.longitude_hemisphere) * to_decimal_degrees(raw));
        }
        if let Some(hdop) = fix.hdop {
            self.hdop = Some(hdop);
        }
        if let Some(altitude) = fix.altitude {
            self.altitude_m = Some(altitude);
        }
    }

    /// Parse a GGA sentence and fold it into the state
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::Parse` for a malformed sentence, in which case
    /// the state is unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use payload_controller::sensors::gps::nmea::GpsState;
    ///
    /// let mut state = GpsState::default();
    /// state.update("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47")?;
    /// assert_eq!(state.altitude_m, Some(545.4));
    /// # Ok::<(), payload_controller::error::PayloadError>(())
    /// ```
    pub fn update(&mut self, sentence: &str) -> Result<()> {
        let fix: RawFix = sentence.parse()?;
        self.apply(&fix);
        Ok(())
    }
}

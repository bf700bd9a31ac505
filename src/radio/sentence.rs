//! # Downlink Sentences
//!
//! ASCII sentences handed to the radio modem:
//!
//! ```text
//! $$PAYLOAD1,12,123519,-48.11730,11.51667,0.90,545.40000,21.500,-12.250,1000.09*1A2B\n
//! ##PAYLOAD1,3,Altitude: 545.40000|Altitude2: 177.91|...*3C4D\n
//! ```
//!
//! The checksum is CRC16-CCITT over everything between the prefix and
//! `*`, written as four upper-case hex digits.

use super::crc::crc16_ccitt;
use crate::error::{PayloadError, Result};
use crate::telemetry::frame::{Quantity, TelemetryFrame};

/// Telemetry sentence prefix
pub const TELEMETRY_SENTENCE_PREFIX: &str = "$$";

/// Science sentence prefix
pub const SCIENCE_SENTENCE_PREFIX: &str = "##";

/// Separates the sentence body from its checksum
pub const CHECKSUM_DELIMITER: char = '*';

fn seal(prefix: &str, body: &str) -> String {
    format!(
        "{}{}{}{:04X}\n",
        prefix,
        body,
        CHECKSUM_DELIMITER,
        crc16_ccitt(body.as_bytes())
    )
}

fn field(quantity: Quantity, value: Option<f64>) -> String {
    quantity.render(value).trim().to_string()
}

/// Encode a telemetry sentence
pub fn encode_telemetry(callsign: &str, sequence: u16, frame: &TelemetryFrame) -> String {
    let body = [
        callsign.to_string(),
        sequence.to_string(),
        frame.timestamp.format("%H%M%S").to_string(),
        field(Quantity::Latitude, frame.latitude),
        field(Quantity::Longitude, frame.longitude),
        field(Quantity::Dilution, frame.lat_dilution),
        field(Quantity::GpsAltitude, frame.altitude),
        field(Quantity::Temperature, frame.internal_temperature),
        field(Quantity::Temperature, frame.external_temperature),
        field(Quantity::Pressure, frame.pressure),
    ]
    .join(",");

    seal(TELEMETRY_SENTENCE_PREFIX, &body)
}

/// Encode a science sentence around a pre-formatted ASCII payload
pub fn encode_science(callsign: &str, sequence: u16, payload: &[u8]) -> Result<String> {
    let payload = std::str::from_utf8(payload)
        .ok()
        .filter(|text| text.is_ascii())
        .ok_or_else(|| PayloadError::Parse("science payload is not ASCII".to_string()))?;

    if payload.contains(CHECKSUM_DELIMITER) || payload.contains('\n') {
        return Err(PayloadError::Parse(
            "science payload contains a sentence delimiter".to_string(),
        ));
    }

    let body = format!("{},{},{}", callsign, sequence, payload);
    Ok(seal(SCIENCE_SENTENCE_PREFIX, &body))
}

/// Check a received sentence and return its body
pub fn verify(sentence: &str) -> Result<&str> {
    let sentence = sentence.trim_end_matches('\n');
    let unprefixed = sentence
        .strip_prefix(TELEMETRY_SENTENCE_PREFIX)
        .or_else(|| sentence.strip_prefix(SCIENCE_SENTENCE_PREFIX))
        .ok_or_else(|| PayloadError::Parse(format!("unknown sentence prefix: {}", sentence)))?;

    let (body, checksum) = unprefixed
        .rsplit_once(CHECKSUM_DELIMITER)
        .ok_or_else(|| PayloadError::Parse("sentence has no checksum".to_string()))?;

    let expected = u16::from_str_radix(checksum, 16)
        .map_err(|e| PayloadError::Parse(format!("bad checksum '{}': {}", checksum, e)))?;
    let actual = crc16_ccitt(body.as_bytes());
    if actual != expected {
        return Err(PayloadError::Parse(format!(
            "checksum mismatch: expected {:04X}, computed {:04X}",
            expected, actual
        )));
    }
    Ok(body)
}

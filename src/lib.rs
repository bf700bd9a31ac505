//! # Payload Controller Library
//!
//! Flight software for a high-altitude balloon payload.
//!
//! Sensors (GPS, barometer, 1-wire thermometers, UV) are polled by
//! independent background tasks. A scheduler samples their latest values on
//! nested cadences, records every channel to disk, logs formatted frames and
//! sends telemetry and science frames over the radio downlink.

pub mod config;
pub mod error;
pub mod i2c;
pub mod logging;
pub mod payload;
pub mod radio;
pub mod scheduler;
pub mod sensors;
pub mod serial;
pub mod telemetry;

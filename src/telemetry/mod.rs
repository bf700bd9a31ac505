//! # Telemetry Module
//!
//! Turns sensor snapshots into output:
//!
//! - [`frame`] - `T|` telemetry and `D|` science frame strings
//! - [`recorder`] - per-channel append-only data files

pub mod frame;
pub mod recorder;

pub use frame::{ScienceFrame, TelemetryFrame};
pub use recorder::{Channel, ChannelRecorder};

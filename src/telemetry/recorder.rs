//! # Channel Recorder
//!
//! One append-only file per logical channel, opened at start-up and kept
//! for the whole session. Every sample-cadence tick appends one line per
//! channel:
//!
//! ```text
//! 12:35:19.000000Z|-48.11730
//! ```
//!
//! Files are named `<CHANNEL>_<session start>.log`, e.g.
//! `TEMP1_2024-06-01_12-35-19.log`.

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::frame::Quantity;
use crate::error::Result;
use crate::sensors::SensorSnapshot;

/// Line timestamp format
pub const LINE_TIME_FORMAT: &str = "%H:%M:%S%.6fZ";

/// Session timestamp embedded in file names
pub const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Recorded channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Internal temperature probe
    Temp1,
    /// External temperature probe
    Temp2,
    /// Barometer die temperature
    Temp3,
    Pressure,
    /// GPS altitude
    Altitude1,
    /// Pressure-derived altitude
    Altitude2,
    Latitude,
    Longitude,
    LatDilution,
    Uva,
    Uvb,
}

impl Channel {
    pub const ALL: [Channel; 11] = [
        Channel::Temp1,
        Channel::Temp2,
        Channel::Temp3,
        Channel::Pressure,
        Channel::Altitude1,
        Channel::Altitude2,
        Channel::Latitude,
        Channel::Longitude,
        Channel::LatDilution,
        Channel::Uva,
        Channel::Uvb,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Channel::Temp1 => "TEMP1",
            Channel::Temp2 => "TEMP2",
            Channel::Temp3 => "TEMP3",
            Channel::Pressure => "PRESSURE",
            Channel::Altitude1 => "ALTITUDE1",
            Channel::Altitude2 => "ALTITUDE2",
            Channel::Latitude => "LATITUDE",
            Channel::Longitude => "LONGITUDE",
            Channel::LatDilution => "LATDILUTION",
            Channel::Uva => "UVA",
            Channel::Uvb => "UVB",
        }
    }

    fn quantity(self) -> Quantity {
        match self {
            Channel::Temp1 | Channel::Temp2 | Channel::Temp3 => Quantity::Temperature,
            Channel::Pressure => Quantity::Pressure,
            Channel::Altitude1 => Quantity::GpsAltitude,
            Channel::Altitude2 => Quantity::PressureAltitude,
            Channel::Latitude => Quantity::Latitude,
            Channel::Longitude => Quantity::Longitude,
            Channel::LatDilution => Quantity::Dilution,
            Channel::Uva | Channel::Uvb => Quantity::Uv,
        }
    }

    /// This channel's value in a snapshot
    pub fn value(self, snapshot: &SensorSnapshot) -> Option<f64> {
        match self {
            Channel::Temp1 => snapshot.internal_temperature,
            Channel::Temp2 => snapshot.external_temperature,
            Channel::Temp3 => snapshot.auxiliary_temperature(),
            Channel::Pressure => snapshot.pressure_mbar(),
            Channel::Altitude1 => snapshot.gps.altitude_m,
            Channel::Altitude2 => snapshot.pressure_altitude(),
            Channel::Latitude => snapshot.gps.latitude_deg,
            Channel::Longitude => snapshot.gps.longitude_deg,
            Channel::LatDilution => snapshot.gps.hdop,
            Channel::Uva => snapshot.uva(),
            Channel::Uvb => snapshot.uvb(),
        }
    }

    /// Rendered value, empty when missing
    pub fn render(self, snapshot: &SensorSnapshot) -> String {
        self.quantity().render(self.value(snapshot))
    }

    /// `<dir>/<ID>_<session start>.log`
    pub fn file_path(self, dir: &Path, session_start: DateTime<Utc>) -> PathBuf {
        dir.join(format!(
            "{}_{}.log",
            self.id(),
            session_start.format(FILE_TIME_FORMAT)
        ))
    }
}

/// Per-channel writers owned by the scheduler
///
/// Flight files sit behind a `BufWriter`: a sample only copies about 30
/// bytes per channel into memory, and the file sees a write once every
/// few hundred samples. Recording therefore runs inline on the scheduler
/// task. Buffered lines reach the disk at [`ChannelRecorder::close`].
pub struct ChannelRecorder<W: Write> {
    writers: Vec<(Channel, W)>,
}

impl ChannelRecorder<BufWriter<File>> {
    /// Open (append mode) one file per channel under `dir`
    pub fn create(dir: impl AsRef<Path>, session_start: DateTime<Utc>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut writers = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let path = channel.file_path(dir, session_start);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            debug!("Recording {} to {}", channel.id(), path.display());
            writers.push((channel, BufWriter::new(file)));
        }

        info!("Recording {} channels under {}", writers.len(), dir.display());
        Ok(Self { writers })
    }
}

impl<W: Write> ChannelRecorder<W> {
    pub fn from_writers(writers: Vec<(Channel, W)>) -> Self {
        Self { writers }
    }

    /// Append one line per channel; every channel is attempted even if one
    /// write fails, and the first failure is returned
    pub fn record(&mut self, snapshot: &SensorSnapshot) -> Result<()> {
        let timestamp = snapshot.taken_at.format(LINE_TIME_FORMAT).to_string();
        let mut first_error = None;

        for (channel, writer) in &mut self.writers {
            let line = format!("{}|{}\n", timestamp, channel.render(snapshot));
            if let Err(e) = writer.write_all(line.as_bytes()) {
                warn!("Failed to record {}: {}", channel.id(), e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Flush every channel
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for (channel, writer) in &mut self.writers {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush {}: {}", channel.id(), e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn writer(&self, channel: Channel) -> Option<&W> {
        self.writers
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, w)| w)
    }

    pub fn channel_count(&self) -> usize {
        self.writers.len()
    }
}

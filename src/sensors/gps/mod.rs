//! # GPS Receiver
//!
//! Reads NMEA sentences from a u-blox USB receiver and keeps a [`GpsState`]
//! up to date from the GGA sentences among them.

pub mod nmea;
pub mod ubx;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::info;

pub use nmea::{GpsState, RawFix};

use super::task::Acquire;
use crate::config::GpsConfig;
use crate::error::{PayloadError, Result};
use crate::serial::open_port;
use crate::serial::port_trait::{SerialPortIO, TokioSerialPort};

type SentenceReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Longest line read from the receiver in one piece. NMEA 0183 sentences
/// are at most 82 characters; the rest is room for vendor sentences.
pub const MAX_LINE_LEN: u64 = 256;

/// Serial GPS receiver
pub struct GpsReceiver {
    port: String,
    baud_rate: u32,
    airborne_mode: bool,
    reader: Option<SentenceReader>,
    line: String,
    /// Inside an overlong line; drop input up to the next newline
    discarding: bool,
    state: GpsState,
}

impl GpsReceiver {
    pub fn new(config: &GpsConfig) -> Self {
        Self {
            port: config.port.clone(),
            baud_rate: config.baud_rate,
            airborne_mode: config.airborne_mode,
            reader: None,
            line: String::new(),
            discarding: false,
            state: GpsState::default(),
        }
    }

    /// Receiver reading sentences from an already-open stream
    pub fn from_reader(reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        Self {
            port: String::from("<stream>"),
            baud_rate: 0,
            airborne_mode: false,
            reader: Some(Box::new(reader)),
            line: String::new(),
            discarding: false,
            state: GpsState::default(),
        }
    }

    /// Current position state
    pub fn state(&self) -> GpsState {
        self.state
    }

    /// Handle one line from the receiver. Lines that are not GGA sentences
    /// are ignored.
    pub fn process_line(&mut self, line: &str) -> Result<()> {
        if line.contains(nmea::GGA_ID) {
            self.state.update(line)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Acquire for GpsReceiver {
    type Value = GpsState;

    fn name(&self) -> &str {
        "gps"
    }

    async fn setup(&mut self) -> Result<()> {
        if self.reader.is_some() {
            return Ok(());
        }

        let mut port = TokioSerialPort::new(open_port(&self.port, self.baud_rate)?);

        if self.airborne_mode {
            port.send(&ubx::cfg_nav5(ubx::DynamicModel::Airborne1g))
                .await
                .map_err(|e| PayloadError::Serial(format!("GPS configuration failed: {}", e)))?;
            info!("GPS on {} set to airborne dynamic model", self.port);
        }

        self.reader = Some(Box::new(BufReader::new(port.into_inner())));
        Ok(())
    }

    async fn acquire(&mut self) -> Result<GpsState> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| PayloadError::DeviceIo("GPS port is not open".to_string()))?;

        self.line.clear();
        let read = reader
            .take(MAX_LINE_LEN)
            .read_line(&mut self.line)
            .await
            .map_err(|e| PayloadError::DeviceIo(format!("GPS read failed: {}", e)))?;

        if read == 0 {
            return Err(PayloadError::DeviceIo("GPS stream closed".to_string()));
        }

        let complete = self.line.ends_with('\n');
        if self.discarding {
            self.discarding = !complete;
            return Err(PayloadError::Parse(
                "dropped the rest of an overlong GPS line".to_string(),
            ));
        }
        if !complete && read as u64 == MAX_LINE_LEN {
            self.discarding = true;
            return Err(PayloadError::Parse(format!(
                "GPS line longer than {} bytes",
                MAX_LINE_LEN
            )));
        }

        let line = std::mem::take(&mut self.line);
        let result = self.process_line(&line);
        self.line = line;
        result?;

        Ok(self.state)
    }

    async fn teardown(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            info!("GPS port {} closed", self.port);
        }
        Ok(())
    }
}

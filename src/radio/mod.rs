//! # Radio Downlink
//!
//! The scheduler hands frames to a [`RadioLink`]. The flight implementation
//! is [`SerialRadio`], which writes checksummed ASCII sentences to the
//! modem's UART. Each send blocks the scheduler until the bytes are
//! flushed.

pub mod crc;
pub mod sentence;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::RadioConfig;
use crate::error::{PayloadError, Result};
use crate::serial::open_port;
use crate::serial::port_trait::{SerialPortIO, TokioSerialPort};
use crate::telemetry::TelemetryFrame;

/// Downlink used by the scheduler
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RadioLink: Send {
    /// Bring the link up
    async fn start(&mut self) -> Result<()>;

    /// Send a telemetry frame
    async fn send_telemetry(&mut self, frame: &TelemetryFrame) -> Result<()>;

    /// Send a pre-formatted ASCII science payload
    async fn send_science(&mut self, payload: &[u8]) -> Result<()>;

    /// Shut the link down
    async fn stop(&mut self) -> Result<()>;
}

/// Radio modem on a serial port
pub struct SerialRadio<P: SerialPortIO> {
    port: P,
    callsign: String,
    telemetry_sequence: u16,
    science_sequence: u16,
    started: bool,
}

impl SerialRadio<TokioSerialPort> {
    /// Open the modem's port
    pub fn open(config: &RadioConfig) -> Result<Self> {
        let port = open_port(&config.port, config.baud_rate)?;
        info!(
            "Radio opened on {} at {} baud as {}",
            config.port, config.baud_rate, config.callsign
        );
        Ok(Self::new(TokioSerialPort::new(port), &config.callsign))
    }
}

impl<P: SerialPortIO> SerialRadio<P> {
    pub fn new(port: P, callsign: &str) -> Self {
        Self {
            port,
            callsign: callsign.to_string(),
            telemetry_sequence: 0,
            science_sequence: 0,
            started: false,
        }
    }

    async fn transmit(&mut self, sentence: &str) -> Result<()> {
        if !self.started {
            return Err(PayloadError::DeviceIo("radio link is not started".to_string()));
        }
        self.port
            .send(sentence.as_bytes())
            .await
            .map_err(|e| PayloadError::Serial(format!("Radio write failed: {}", e)))?;
        debug!("Radio sent {}", sentence.trim_end());
        Ok(())
    }

    pub fn telemetry_sequence(&self) -> u16 {
        self.telemetry_sequence
    }

    pub fn science_sequence(&self) -> u16 {
        self.science_sequence
    }
}

#[async_trait]
impl<P: SerialPortIO> RadioLink for SerialRadio<P> {
    async fn start(&mut self) -> Result<()> {
        self.started = true;
        info!("Radio link started");
        Ok(())
    }

    async fn send_telemetry(&mut self, frame: &TelemetryFrame) -> Result<()> {
        let sentence =
            sentence::encode_telemetry(&self.callsign, self.telemetry_sequence, frame);
        self.transmit(&sentence).await?;
        self.telemetry_sequence = self.telemetry_sequence.wrapping_add(1);
        Ok(())
    }

    async fn send_science(&mut self, payload: &[u8]) -> Result<()> {
        let sentence = sentence::encode_science(&self.callsign, self.science_sequence, payload)?;
        self.transmit(&sentence).await?;
        self.science_sequence = self.science_sequence.wrapping_add(1);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.port.flush().await?;
        info!(
            "Radio link stopped after {} telemetry and {} science sentences",
            self.telemetry_sequence, self.science_sequence
        );
        Ok(())
    }
}

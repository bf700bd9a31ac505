//! # Serial Communication Module
//!
//! Opens the UART devices used by the payload: the GPS receiver (NMEA in,
//! UBX configuration out) and the radio modem (downlink sentences out).
//! Both run 8N1 without flow control.

pub mod port_trait;

use crate::error::{PayloadError, Result};
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

/// Open a serial port with 8N1 settings
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyACM0")
/// * `baud_rate` - Line speed
///
/// # Returns
///
/// * `Result<SerialStream>` - Opened serial port
///
/// # Examples
///
/// ```no_run
/// use payload_controller::serial::open_port;
///
/// let port = open_port("/dev/ttyACM0", 9600)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    debug!("Opening serial port {} at {} baud", path, baud_rate);

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| PayloadError::Serial(format!("Failed to open {}: {}", path, e)))?;

    Ok(port)
}

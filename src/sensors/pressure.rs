//! # Barometric Pressure Sensor
//!
//! MS5611-style barometer: six factory calibration words in PROM and two
//! 24-bit ADC conversions (D1 = pressure, D2 = temperature). The
//! compensation follows the manufacturer's first-order formulas:
//!
//! ```text
//! dT          = D2 - C5 * 2^8
//! temperature = (2000 + dT * C6 / 2^23) / 100                [°C]
//! OFF         = C2 * 2^16 + (C4 * dT) / 2^7
//! SENS        = C1 * 2^15 + (C3 * dT) / 2^8
//! pressure    = ((D1 * SENS / 2^21) - OFF) / 2^15 / 100      [mbar]
//! ```
//!
//! The calibration words are read again for every measurement cycle.

use async_trait::async_trait;
use std::time::Duration;

use super::task::{Acquire, FailurePolicy};
use crate::config::PressureConfig;
use crate::error::{PayloadError, Result};
use crate::i2c::{open_device, DeviceBus, I2cBus};

/// PROM address of C1; C2..C6 follow at 2-byte steps
pub const PROM_C1_ADDRESS: u8 = 0xA2;

/// Start a D1 (pressure) conversion, OSR 4096
pub const CMD_CONVERT_D1: u8 = 0x48;

/// Start a D2 (temperature) conversion, OSR 4096
pub const CMD_CONVERT_D2: u8 = 0x58;

/// ADC result register
pub const ADC_READ: u8 = 0x00;

/// Wait after a conversion command and after reading the result
pub const CONVERSION_SETTLE: Duration = Duration::from_millis(50);

/// Sea-level reference pressure for [`pressure_altitude`] (hPa)
pub const REFERENCE_PRESSURE_HPA: f64 = 1021.0;

/// Factory calibration words C1..C6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationConstants {
    pub c1: u16,
    pub c2: u16,
    pub c3: u16,
    pub c4: u16,
    pub c5: u16,
    pub c6: u16,
}

/// One calibrated measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReading {
    /// Pressure in millibars
    pub pressure_mbar: f64,
    /// Sensor temperature in °C
    pub temperature_c: f64,
}

impl CalibrationConstants {
    /// Build from the six PROM words, rejecting blank or unpopulated words
    pub fn from_words(words: [u16; 6]) -> Result<Self> {
        if let Some(index) = words.iter().position(|&w| w == 0x0000 || w == 0xFFFF) {
            return Err(PayloadError::Calibration(format!(
                "C{} reads 0x{:04X}",
                index + 1,
                words[index]
            )));
        }
        let [c1, c2, c3, c4, c5, c6] = words;
        Ok(Self { c1, c2, c3, c4, c5, c6 })
    }
}

/// Temperature (°C) and `dT` from a raw D2 sample
pub fn compensate_temperature(d2: u32, cal: &CalibrationConstants) -> (f64, f64) {
    let dt = f64::from(d2) - f64::from(cal.c5) * 2f64.powi(8);
    let temperature = (2000.0 + dt * (f64::from(cal.c6) / 2f64.powi(23))) / 100.0;
    (temperature, dt)
}

/// Pressure (mbar) from a raw D1 sample and the `dT` of the same cycle
pub fn compensate_pressure(d1: u32, dt: f64, cal: &CalibrationConstants) -> f64 {
    let off = f64::from(cal.c2) * 2f64.powi(16) + (f64::from(cal.c4) * dt) / 2f64.powi(7);
    let sens = f64::from(cal.c1) * 2f64.powi(15) + (f64::from(cal.c3) * dt) / 2f64.powi(8);
    ((f64::from(d1) * (sens / 2f64.powi(21))) - off) / 2f64.powi(15) / 100.0
}

/// Full compensation of one D1/D2 pair
pub fn compensate(d1: u32, d2: u32, cal: &CalibrationConstants) -> PressureReading {
    let (temperature_c, dt) = compensate_temperature(d2, cal);
    PressureReading {
        pressure_mbar: compensate_pressure(d1, dt, cal),
        temperature_c,
    }
}

/// Altitude in metres estimated from pressure and temperature
///
/// Uses the hypsometric approximation against a fixed 1021 hPa reference
/// rather than the local sea-level pressure of the day, so it is only a
/// backup for the GPS altitude. The magnitude is returned; `None` when the
/// inputs cannot produce a number.
///
/// # Examples
///
/// ```
/// use payload_controller::sensors::pressure::pressure_altitude;
///
/// assert_eq!(pressure_altitude(1021.0, 15.0), Some(0.0));
/// assert!(pressure_altitude(0.0, 15.0).is_none());
/// ```
pub fn pressure_altitude(pressure_mbar: f64, temperature_c: f64) -> Option<f64> {
    if !(pressure_mbar > 0.0) || !temperature_c.is_finite() {
        return None;
    }
    let altitude = ((REFERENCE_PRESSURE_HPA / pressure_mbar).powf(1.0 / 5.257) - 1.0)
        * (temperature_c + 273.15)
        / 0.0065;
    altitude.is_finite().then(|| altitude.abs())
}

/// Combine three ADC bytes, MSB first
pub fn raw_sample(bytes: &[u8]) -> Result<u32> {
    match bytes {
        [msb, mid, lsb, ..] => Ok(u32::from_be_bytes([0, *msb, *mid, *lsb])),
        _ => Err(PayloadError::DeviceIo(format!(
            "ADC read returned {} bytes, expected 3",
            bytes.len()
        ))),
    }
}

/// Read the six PROM words, MSB first
fn read_prom(bus: &mut dyn I2cBus) -> Result<[u16; 6]> {
    let mut words = [0u16; 6];
    for (i, word) in words.iter_mut().enumerate() {
        let register = PROM_C1_ADDRESS + 2 * i as u8;
        let bytes = bus.read_block(register, 2)?;
        match bytes.as_slice() {
            [msb, lsb, ..] => *word = u16::from_be_bytes([*msb, *lsb]),
            _ => {
                return Err(PayloadError::Calibration(format!(
                    "PROM 0x{:02X} returned {} bytes",
                    register,
                    bytes.len()
                )))
            }
        }
    }
    Ok(words)
}

/// I²C barometer
pub struct Barometer {
    bus_path: String,
    address: u16,
    poll_interval: Duration,
    bus: DeviceBus,
}

impl Barometer {
    pub fn new(config: &PressureConfig) -> Self {
        Self {
            bus_path: config.i2c_bus.clone(),
            address: config.address,
            poll_interval: config.poll_interval(),
            bus: DeviceBus::closed("barometer"),
        }
    }

    /// Barometer on an already-open bus
    pub fn with_bus(bus: Box<dyn I2cBus>) -> Self {
        Self {
            bus_path: String::from("<bus>"),
            address: 0,
            poll_interval: Duration::ZERO,
            bus: DeviceBus::open("barometer", bus),
        }
    }

    /// Read C1..C6 from PROM
    pub async fn read_calibration(&mut self) -> Result<CalibrationConstants> {
        let words = self.bus.transact(read_prom).await?;
        CalibrationConstants::from_words(words)
    }

    /// Run one conversion and return the 24-bit result
    async fn convert(&mut self, command: u8) -> Result<u32> {
        self.bus.transact(move |bus| bus.write_byte(command)).await?;
        tokio::time::sleep(CONVERSION_SETTLE).await;
        let bytes = self.bus.transact(|bus| bus.read_block(ADC_READ, 3)).await?;
        tokio::time::sleep(CONVERSION_SETTLE).await;
        raw_sample(&bytes)
    }

    /// Calibrated temperature and pressure
    ///
    /// The temperature conversion always runs first because the pressure
    /// compensation needs its `dT`.
    pub async fn measure(&mut self) -> Result<PressureReading> {
        let cal = self.read_calibration().await?;
        let d2 = self.convert(CMD_CONVERT_D2).await?;
        let (temperature_c, dt) = compensate_temperature(d2, &cal);
        let d1 = self.convert(CMD_CONVERT_D1).await?;
        Ok(PressureReading {
            pressure_mbar: compensate_pressure(d1, dt, &cal),
            temperature_c,
        })
    }
}

#[async_trait]
impl Acquire for Barometer {
    type Value = PressureReading;

    fn name(&self) -> &str {
        "pressure"
    }

    async fn setup(&mut self) -> Result<()> {
        if !self.bus.is_open() {
            self.bus
                .attach(Box::new(open_device(&self.bus_path, self.address)?));
        }
        Ok(())
    }

    async fn acquire(&mut self) -> Result<PressureReading> {
        self.measure().await
    }

    async fn teardown(&mut self) -> Result<()> {
        self.bus.detach();
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn on_failure(&self) -> FailurePolicy {
        FailurePolicy::Clear
    }
}

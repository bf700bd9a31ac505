//! # UV Sensor
//!
//! VEML6075-style UVA/UVB sensor. Each measurement powers the sensor up with
//! an 800 ms integration time, waits for two conversions, powers it down
//! again and reads the four result words. The UVA and UVB counts are
//! compensated for visible and infrared leakage using the two comparison
//! channels.

use async_trait::async_trait;
use std::time::Duration;

use super::task::Acquire;
use crate::config::UvConfig;
use crate::error::Result;
use crate::i2c::{open_device, DeviceBus, I2cBus};

pub const REG_CONF: u8 = 0x00;
pub const REG_UVA: u8 = 0x07;
pub const REG_UVB: u8 = 0x09;
pub const REG_UVCOMP1: u8 = 0x0A;
pub const REG_UVCOMP2: u8 = 0x0B;

pub const POWER_ON: u8 = 0x00;
pub const POWER_OFF: u8 = 0x01;
pub const HIGH_DYNAMIC: u8 = 0x08;
pub const INTEGRATION_800MS: u8 = 0x40;

/// Time for the ADC to complete two conversions at 800 ms integration
pub const CONVERSION_WAIT: Duration = Duration::from_millis(1920);

/// Raw result words of one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawUv {
    pub uva: u16,
    pub uvb: u16,
    /// Visible-light comparison channel
    pub comp1: u16,
    /// Infrared comparison channel
    pub comp2: u16,
}

/// Compensated UV levels in µW/cm²
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvReading {
    pub uva: f64,
    pub uvb: f64,
}

/// Coefficients from the sensor's calibration report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvCalibration {
    /// Count scaling for high-dynamic mode
    pub divisor: f64,
    /// UVA visible coefficient
    pub a: f64,
    /// UVA infrared coefficient
    pub b: f64,
    /// UVB visible coefficient
    pub c: f64,
    /// UVB infrared coefficient
    pub d: f64,
    pub uva_counts_per_uw_cm2: f64,
    pub uvb_counts_per_uw_cm2: f64,
}

impl Default for UvCalibration {
    fn default() -> Self {
        Self {
            divisor: 16.0,
            a: 2.22,
            b: 1.33,
            c: 3.66,
            d: 1.75,
            uva_counts_per_uw_cm2: 0.93,
            uvb_counts_per_uw_cm2: 2.10,
        }
    }
}

impl UvCalibration {
    /// Convert raw counts to µW/cm²; negative compensated counts clamp to 0
    pub fn compensate(&self, raw: RawUv) -> UvReading {
        let scale = |count: u16| f64::from(count) / self.divisor;
        let (uva, uvb) = (scale(raw.uva), scale(raw.uvb));
        let (comp1, comp2) = (scale(raw.comp1), scale(raw.comp2));

        let uva = (uva - self.a * comp1 - self.b * comp2).max(0.0);
        let uvb = (uvb - self.c * comp1 - self.d * comp2).max(0.0);

        UvReading {
            uva: uva / self.uva_counts_per_uw_cm2,
            uvb: uvb / self.uvb_counts_per_uw_cm2,
        }
    }
}

/// Power down, then read the four result words
fn read_results(bus: &mut dyn I2cBus) -> Result<RawUv> {
    bus.write_byte_data(REG_CONF, POWER_OFF)?;
    Ok(RawUv {
        uva: bus.read_word(REG_UVA)?,
        uvb: bus.read_word(REG_UVB)?,
        comp1: bus.read_word(REG_UVCOMP1)?,
        comp2: bus.read_word(REG_UVCOMP2)?,
    })
}

/// I²C UV sensor
pub struct UvSensor {
    bus_path: String,
    address: u16,
    poll_interval: Duration,
    calibration: UvCalibration,
    bus: DeviceBus,
}

impl UvSensor {
    pub fn new(config: &UvConfig) -> Self {
        Self {
            bus_path: config.i2c_bus.clone(),
            address: config.address,
            poll_interval: config.poll_interval(),
            calibration: UvCalibration::default(),
            bus: DeviceBus::closed("UV sensor"),
        }
    }

    pub fn with_bus(bus: Box<dyn I2cBus>) -> Self {
        Self {
            bus_path: String::from("<bus>"),
            address: 0,
            poll_interval: Duration::ZERO,
            calibration: UvCalibration::default(),
            bus: DeviceBus::open("UV sensor", bus),
        }
    }

    /// Run one power-up / integrate / power-down cycle
    pub async fn read_raw(&mut self) -> Result<RawUv> {
        self.bus
            .transact(|bus| {
                bus.write_byte_data(REG_CONF, INTEGRATION_800MS | HIGH_DYNAMIC | POWER_ON)
            })
            .await?;
        tokio::time::sleep(CONVERSION_WAIT).await;

        self.bus.transact(read_results).await
    }
}

#[async_trait]
impl Acquire for UvSensor {
    type Value = UvReading;

    fn name(&self) -> &str {
        "uv"
    }

    async fn setup(&mut self) -> Result<()> {
        if !self.bus.is_open() {
            self.bus
                .attach(Box::new(open_device(&self.bus_path, self.address)?));
        }
        Ok(())
    }

    async fn acquire(&mut self) -> Result<UvReading> {
        let raw = self.read_raw().await?;
        Ok(self.calibration.compensate(raw))
    }

    /// Power the sensor down and release the bus; the bus is released even
    /// if the power-down write fails
    async fn teardown(&mut self) -> Result<()> {
        if !self.bus.is_open() {
            return Ok(());
        }
        let result = self
            .bus
            .transact(|bus| bus.write_byte_data(REG_CONF, POWER_OFF))
            .await;
        self.bus.detach();
        result
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use crate::i2c::MockI2cBus;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_compensation() {
        let reading = UvCalibration::default().compensate(RawUv {
            uva: 4800,
            uvb: 4000,
            comp1: 320,
            comp2: 160,
        });
        assert_close(reading.uva, 260.5376344086021);
        assert_close(reading.uvb, 75.85714285714286);
    }

    #[test]
    fn test_negative_compensation_clamps_to_zero() {
        let reading = UvCalibration::default().compensate(RawUv {
            uva: 100,
            uvb: 100,
            comp1: 800,
            comp2: 800,
        });
        assert_eq!(reading.uva, 0.0);
        assert_eq!(reading.uvb, 0.0);
    }

    #[test]
    fn test_dark_sensor_reads_zero() {
        let reading = UvCalibration::default().compensate(RawUv {
            uva: 0,
            uvb: 0,
            comp1: 0,
            comp2: 0,
        });
        assert_eq!(reading, UvReading { uva: 0.0, uvb: 0.0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_measurement_cycle() {
        let mut bus = MockI2cBus::new();
        let mut seq = Sequence::new();

        bus.expect_write_byte_data()
            .with(eq(REG_CONF), eq(0x48))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        bus.expect_write_byte_data()
            .with(eq(REG_CONF), eq(POWER_OFF))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        for (register, value) in [
            (REG_UVA, 4800u16),
            (REG_UVB, 4000),
            (REG_UVCOMP1, 320),
            (REG_UVCOMP2, 160),
        ] {
            bus.expect_read_word()
                .with(eq(register))
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Ok(value));
        }

        let mut sensor = UvSensor::with_bus(Box::new(bus));
        let start = tokio::time::Instant::now();
        let reading = sensor.acquire().await.unwrap();

        assert_eq!(start.elapsed(), CONVERSION_WAIT);
        assert_close(reading.uva, 260.5376344086021);
        assert_close(reading.uvb, 75.85714285714286);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_propagates() {
        let mut bus = MockI2cBus::new();
        bus.expect_write_byte_data().returning(|_, _| Ok(()));
        bus.expect_read_word()
            .returning(|_| Err(PayloadError::DeviceIo("NACK".into())));

        let mut sensor = UvSensor::with_bus(Box::new(bus));
        assert!(sensor.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_teardown_powers_down() {
        let mut bus = MockI2cBus::new();
        bus.expect_write_byte_data()
            .with(eq(REG_CONF), eq(POWER_OFF))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut sensor = UvSensor::with_bus(Box::new(bus));
        sensor.teardown().await.unwrap();
        assert!(sensor.read_raw().await.is_err());
        // Nothing left to power down
        sensor.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_releases_bus_when_power_down_fails() {
        let mut bus = MockI2cBus::new();
        bus.expect_write_byte_data()
            .with(eq(REG_CONF), eq(POWER_OFF))
            .times(1)
            .returning(|_, _| Err(PayloadError::DeviceIo("NACK".into())));

        let mut sensor = UvSensor::with_bus(Box::new(bus));
        assert!(matches!(sensor.teardown().await, Err(PayloadError::DeviceIo(_))));

        match sensor.read_raw().await {
            Err(PayloadError::DeviceIo(msg)) => assert!(msg.contains("not open"), "got {}", msg),
            other => panic!("Expected closed bus, got: {:?}", other),
        }
    }
}

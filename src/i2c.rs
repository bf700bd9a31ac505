//! # I²C Bus Module
//!
//! SMBus-style access to the barometer and UV sensor. Devices talk to the
//! bus through [`I2cBus`] so the conversion sequences can be tested against
//! a mock; on the flight computer the trait is implemented by
//! `i2cdev`'s [`LinuxI2CDevice`].
//!
//! SMBus transfers are blocking ioctls. A device owns its bus through a
//! [`DeviceBus`], which runs every transaction on tokio's blocking pool.

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

use crate::error::{PayloadError, Result};

/// Register-level operations used by the payload's I²C sensors
#[cfg_attr(test, mockall::automock)]
pub trait I2cBus: Send {
    /// Send a single command byte
    fn write_byte(&mut self, value: u8) -> Result<()>;

    /// Write one byte to a register
    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<()>;

    /// Read `len` bytes starting at a register
    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>>;

    /// Read a little-endian 16-bit word from a register
    fn read_word(&mut self, register: u8) -> Result<u16>;
}

/// Open the device at `address` on the bus at `bus_path` (e.g. "/dev/i2c-1")
pub fn open_device(bus_path: &str, address: u16) -> Result<LinuxI2CDevice> {
    LinuxI2CDevice::new(bus_path, address).map_err(|e| {
        PayloadError::DeviceIo(format!(
            "Failed to open I2C device 0x{:02X} on {}: {}",
            address, bus_path, e
        ))
    })
}

/// A sensor's handle on the bus
pub struct DeviceBus {
    device: &'static str,
    bus: Option<Box<dyn I2cBus>>,
}

impl DeviceBus {
    /// No bus attached yet
    pub fn closed(device: &'static str) -> Self {
        Self { device, bus: None }
    }

    pub fn open(device: &'static str, bus: Box<dyn I2cBus>) -> Self {
        Self {
            device,
            bus: Some(bus),
        }
    }

    pub fn attach(&mut self, bus: Box<dyn I2cBus>) {
        self.bus = Some(bus);
    }

    /// Release the bus; later transactions fail until one is attached again
    pub fn detach(&mut self) -> Option<Box<dyn I2cBus>> {
        self.bus.take()
    }

    pub fn is_open(&self) -> bool {
        self.bus.is_some()
    }

    /// Run `op` against the bus on the blocking pool
    ///
    /// The bus is handed back after `op` returns, whether or not it
    /// succeeded. It is lost only if `op` panics.
    pub async fn transact<T, F>(&mut self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn I2cBus) -> Result<T> + Send + 'static,
    {
        let mut bus = self
            .bus
            .take()
            .ok_or_else(|| PayloadError::DeviceIo(format!("{} bus is not open", self.device)))?;

        let (bus, result) = tokio::task::spawn_blocking(move || {
            let result = op(bus.as_mut());
            (bus, result)
        })
        .await
        .map_err(|e| {
            PayloadError::DeviceIo(format!("{} bus transaction aborted: {}", self.device, e))
        })?;

        self.bus = Some(bus);
        result
    }
}

fn bus_error(op: &str, err: impl std::fmt::Display) -> PayloadError {
    PayloadError::DeviceIo(format!("I2C {} failed: {}", op, err))
}

impl I2cBus for LinuxI2CDevice {
    fn write_byte(&mut self, value: u8) -> Result<()> {
        self.smbus_write_byte(value)
            .map_err(|e| bus_error("write_byte", e))
    }

    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<()> {
        self.smbus_write_byte_data(register, value)
            .map_err(|e| bus_error("write_byte_data", e))
    }

    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>> {
        let data = self
            .smbus_read_i2c_block_data(register, len)
            .map_err(|e| bus_error("read_block", e))?;

        if data.len() < len as usize {
            return Err(PayloadError::DeviceIo(format!(
                "Short read from register 0x{:02X}: expected {} bytes, got {}",
                register,
                len,
                data.len()
            )));
        }
        Ok(data)
    }

    fn read_word(&mut self, register: u8) -> Result<u16> {
        self.smbus_read_word_data(register)
            .map_err(|e| bus_error("read_word", e))
    }
}

//! 1-wire thermometers read through the kernel's `w1_slave` files.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::task::Acquire;
use crate::error::{PayloadError, Result};

const TEMPERATURE_TOKEN: &str = "t=";

/// Parse the contents of a `w1_slave` file into °C
///
/// The second line carries `t=<millidegrees>`:
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_w1_slave(contents: &str) -> Result<f64> {
    let line = contents
        .lines()
        .nth(1)
        .ok_or_else(|| PayloadError::Parse("w1_slave has no data line".to_string()))?;

    let start = line
        .find(TEMPERATURE_TOKEN)
        .ok_or_else(|| PayloadError::Parse(format!("no t= token in '{}'", line.trim())))?;

    let millidegrees: f64 = line[start + TEMPERATURE_TOKEN.len()..]
        .trim()
        .parse()
        .map_err(|e| PayloadError::Parse(format!("bad temperature in '{}': {}", line.trim(), e)))?;

    Ok(millidegrees / 1000.0)
}

/// A DS18B20-style probe
pub struct Thermometer {
    name: String,
    path: PathBuf,
    poll_interval: Duration,
}

impl Thermometer {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            poll_interval,
        }
    }
}

#[async_trait]
impl Acquire for Thermometer {
    type Value = f64;

    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self) -> Result<()> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Err(PayloadError::DeviceIo(format!(
                "{}: {} not found",
                self.name,
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn acquire(&mut self) -> Result<f64> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PayloadError::DeviceIo(format!("{}: read {} failed: {}", self.name, self.path.display(), e))
        })?;
        parse_w1_slave(&contents)
    }

    async fn teardown(&mut self) -> Result<()> {
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

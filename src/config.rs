//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{PayloadError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gps: GpsConfig,
    pub temperature: TemperatureConfig,
    pub pressure: PressureConfig,
    pub uv: UvConfig,
    pub radio: RadioConfig,
    pub schedule: ScheduleConfig,
    pub storage: StorageConfig,
}

/// GPS receiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GpsConfig {
    #[serde(default = "default_gps_port")]
    pub port: String,

    #[serde(default = "default_gps_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_airborne_mode")]
    pub airborne_mode: bool,
}

/// 1-wire thermometer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TemperatureConfig {
    #[serde(default = "default_internal_path")]
    pub internal_path: String,

    #[serde(default = "default_external_path")]
    pub external_path: String,

    #[serde(default = "default_temperature_poll_ms")]
    pub poll_interval_ms: u64,
}

/// Barometer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PressureConfig {
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: String,

    #[serde(default = "default_pressure_address")]
    pub address: u16,

    #[serde(default = "default_pressure_poll_ms")]
    pub poll_interval_ms: u64,
}

/// UV sensor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UvConfig {
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: String,

    #[serde(default = "default_uv_address")]
    pub address: u16,

    #[serde(default)]
    pub poll_interval_ms: u64,
}

/// Radio link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_radio_port")]
    pub port: String,

    #[serde(default = "default_radio_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_callsign")]
    pub callsign: String,
}

/// Cadence thresholds of the acquisition scheduler
#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,

    #[serde(default = "default_science_interval_ms")]
    pub science_interval_ms: u64,

    #[serde(default = "default_science_settle_ms")]
    pub science_settle_ms: u64,
}

/// Output directories
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

/// Baud rates accepted for the GPS receiver
const GPS_BAUD_RATES: [u32; 6] = [4800, 9600, 19200, 38400, 57600, 115200];

/// Longest callsign the radio accepts
const MAX_CALLSIGN_LEN: usize = 16;

// Default value functions
fn default_gps_port() -> String { "/dev/ttyACM0".to_string() }
fn default_gps_baud_rate() -> u32 { 9600 }
fn default_airborne_mode() -> bool { true }

fn default_internal_path() -> String { "/sys/bus/w1/devices/28-0300a2796d64/w1_slave".to_string() }
fn default_external_path() -> String { "/sys/bus/w1/devices/28-0517c41b75ff/w1_slave".to_string() }
fn default_temperature_poll_ms() -> u64 { 1000 }

fn default_i2c_bus() -> String { "/dev/i2c-1".to_string() }
fn default_pressure_address() -> u16 { 0x77 }
fn default_pressure_poll_ms() -> u64 { 500 }
fn default_uv_address() -> u16 { 0x10 }

fn default_radio_port() -> String { "/dev/ttyAMA0".to_string() }
fn default_radio_baud_rate() -> u32 { 38400 }
fn default_callsign() -> String { "PAYLOAD1".to_string() }

fn default_tick_interval_ms() -> u64 { 100 }
fn default_sample_interval_ms() -> u64 { 2000 }
fn default_log_interval_ms() -> u64 { 5000 }
fn default_telemetry_interval_ms() -> u64 { 17000 }
fn default_science_interval_ms() -> u64 { 27000 }
fn default_science_settle_ms() -> u64 { 3000 }

fn default_data_dir() -> String { "./data".to_string() }
fn default_log_dir() -> String { "./logs".to_string() }

fn invalid(message: impl std::fmt::Display) -> PayloadError {
    PayloadError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use payload_controller::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("gps.port", &self.gps.port),
            ("temperature.internal_path", &self.temperature.internal_path),
            ("temperature.external_path", &self.temperature.external_path),
            ("pressure.i2c_bus", &self.pressure.i2c_bus),
            ("uv.i2c_bus", &self.uv.i2c_bus),
            ("radio.port", &self.radio.port),
            ("storage.data_dir", &self.storage.data_dir),
            ("storage.log_dir", &self.storage.log_dir),
        ] {
            if value.is_empty() {
                return Err(invalid(format!("{} cannot be empty", name)));
            }
        }

        if !GPS_BAUD_RATES.contains(&self.gps.baud_rate) {
            return Err(invalid(
                "gps.baud_rate must be one of: 4800, 9600, 19200, 38400, 57600, 115200",
            ));
        }

        if self.radio.baud_rate == 0 {
            return Err(invalid("radio.baud_rate must be greater than 0"));
        }

        // I2C addresses are 7-bit
        for (name, address) in [
            ("pressure.address", self.pressure.address),
            ("uv.address", self.uv.address),
        ] {
            if address > 0x7F {
                return Err(invalid(format!("{} must be a 7-bit address (0x00-0x7F)", name)));
            }
        }

        let callsign = &self.radio.callsign;
        if callsign.is_empty()
            || callsign.len() > MAX_CALLSIGN_LEN
            || !callsign.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(invalid(format!(
                "radio.callsign must be 1-{} ASCII letters or digits",
                MAX_CALLSIGN_LEN
            )));
        }

        let schedule = &self.schedule;
        for (name, value) in [
            ("sample_interval_ms", schedule.sample_interval_ms),
            ("log_interval_ms", schedule.log_interval_ms),
            ("telemetry_interval_ms", schedule.telemetry_interval_ms),
            ("science_interval_ms", schedule.science_interval_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        // Cadences are nested, each one inside the faster one
        if schedule.sample_interval_ms > schedule.log_interval_ms
            || schedule.log_interval_ms > schedule.telemetry_interval_ms
            || schedule.telemetry_interval_ms > schedule.science_interval_ms
        {
            return Err(invalid(
                "cadence intervals must satisfy sample <= log <= telemetry <= science",
            ));
        }

        if schedule.tick_interval_ms == 0 || schedule.tick_interval_ms > schedule.sample_interval_ms {
            return Err(invalid(
                "tick_interval_ms must be between 1 and sample_interval_ms",
            ));
        }

        if schedule.science_settle_ms > 60000 {
            return Err(invalid("science_settle_ms must be at most 60000"));
        }

        Ok(())
    }
}

impl TemperatureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl PressureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl UvConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ScheduleConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn science_settle(&self) -> Duration {
        Duration::from_millis(self.science_settle_ms)
    }
}

#[cfg(test)]
pub(crate) fn create_valid_config() -> Config {
    Config {
        gps: GpsConfig {
            port: default_gps_port(),
            baud_rate: default_gps_baud_rate(),
            airborne_mode: default_airborne_mode(),
        },
        temperature: TemperatureConfig {
            internal_path: default_internal_path(),
            external_path: default_external_path(),
            poll_interval_ms: default_temperature_poll_ms(),
        },
        pressure: PressureConfig {
            i2c_bus: default_i2c_bus(),
            address: default_pressure_address(),
            poll_interval_ms: default_pressure_poll_ms(),
        },
        uv: UvConfig {
            i2c_bus: default_i2c_bus(),
            address: default_uv_address(),
            poll_interval_ms: 0,
        },
        radio: RadioConfig {
            port: default_radio_port(),
            baud_rate: default_radio_baud_rate(),
            callsign: default_callsign(),
        },
        schedule: ScheduleConfig {
            tick_interval_ms: default_tick_interval_ms(),
            sample_interval_ms: default_sample_interval_ms(),
            log_interval_ms: default_log_interval_ms(),
            telemetry_interval_ms: default_telemetry_interval_ms(),
            science_interval_ms: default_science_interval_ms(),
            science_settle_ms: default_science_settle_ms(),
        },
        storage: StorageConfig {
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[gps]
port = "/dev/ttyUSB0"

[temperature]

[pressure]
address = 0x76

[uv]

[radio]
callsign = "BALLOON7"

[schedule]

[storage]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.gps.port, "/dev/ttyUSB0");
        assert_eq!(config.pressure.address, 0x76);
        assert_eq!(config.uv.address, 0x10);
        assert_eq!(config.radio.callsign, "BALLOON7");
        assert_eq!(config.schedule.science_interval_ms, 27000);
    }

    #[test]
    fn test_load_missing_section_fails() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[gps]\n").unwrap();

        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(PayloadError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Config::load("/nonexistent/payload.toml");
        assert!(matches!(result, Err(PayloadError::Io(_))));
    }

    #[test]
    fn test_empty_gps_port() {
        let mut config = create_valid_config();
        config.gps.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_data_dir() {
        let mut config = create_valid_config();
        config.storage.data_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_gps_baud_rate() {
        let mut config = create_valid_config();
        config.gps.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_gps_baud_rates() {
        for &baud in &GPS_BAUD_RATES {
            let mut config = create_valid_config();
            config.gps.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_address_out_of_range() {
        let mut config = create_valid_config();
        config.pressure.address = 0x80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_callsign_with_punctuation() {
        let mut config = create_valid_config();
        config.radio.callsign = "PAY,LOAD".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_callsign_too_long() {
        let mut config = create_valid_config();
        config.radio.callsign = "A".repeat(17);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_sample_interval() {
        let mut config = create_valid_config();
        config.schedule.sample_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cadences_out_of_order() {
        let mut config = create_valid_config();
        config.schedule.telemetry_interval_ms = 30000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_longer_than_sample() {
        let mut config = create_valid_config();
        config.schedule.tick_interval_ms = 2500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settle_too_long() {
        let mut config = create_valid_config();
        config.schedule.science_settle_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = create_valid_config();
        assert_eq!(config.schedule.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.schedule.science_settle(), Duration::from_secs(3));
        assert_eq!(config.uv.poll_interval(), Duration::ZERO);
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_gps_port(), "/dev/ttyACM0");
        assert_eq!(default_gps_baud_rate(), 9600);
        assert_eq!(default_pressure_address(), 0x77);
        assert_eq!(default_uv_address(), 0x10);
        assert_eq!(default_radio_port(), "/dev/ttyAMA0");
        assert_eq!(default_sample_interval_ms(), 2000);
        assert_eq!(default_log_interval_ms(), 5000);
        assert_eq!(default_telemetry_interval_ms(), 17000);
        assert_eq!(default_science_interval_ms(), 27000);
        assert_eq!(default_science_settle_ms(), 3000);
    }
}

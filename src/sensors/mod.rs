//! # Sensors Module
//!
//! Device drivers and the background machinery that keeps each sensor's
//! latest value available to the scheduler.
//!
//! ## Structure
//!
//! - [`slot`] - last-value store shared between a sensor task and readers
//! - [`task`] - acquisition loop and lifecycle traits
//! - [`gps`] - NMEA GGA receiver
//! - [`pressure`] - barometer and pressure-altitude
//! - [`temperature`] - 1-wire thermometers
//! - [`uv`] - UVA/UVB sensor
//!
//! A [`SensorSuite`] owns every sensor task; [`SensorReaders`] holds the
//! matching slot readers and takes [`SensorSnapshot`]s for the scheduler.

pub mod gps;
pub mod pressure;
pub mod slot;
pub mod task;
pub mod temperature;
pub mod uv;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::Config;
use gps::{GpsReceiver, GpsState};
use pressure::{Barometer, PressureReading};
use slot::SlotReader;
use task::{SensorControl, SensorTask};
use temperature::Thermometer;
use uv::{UvReading, UvSensor};

/// One sensor task of any kind
pub enum Sensor {
    Gps(SensorTask<GpsReceiver>),
    Thermometer(SensorTask<Thermometer>),
    Barometer(SensorTask<Barometer>),
    Uv(SensorTask<UvSensor>),
}

impl Sensor {
    /// Lifecycle controls of the wrapped task
    pub fn control(&mut self) -> &mut dyn SensorControl {
        match self {
            Sensor::Gps(task) => task,
            Sensor::Thermometer(task) => task,
            Sensor::Barometer(task) => task,
            Sensor::Uv(task) => task,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Sensor::Gps(task) => SensorControl::name(task),
            Sensor::Thermometer(task) => SensorControl::name(task),
            Sensor::Barometer(task) => SensorControl::name(task),
            Sensor::Uv(task) => SensorControl::name(task),
        }
    }
}

struct Member {
    sensor: Sensor,
    ready: bool,
}

/// All sensors of the payload
///
/// Every lifecycle step is applied to each sensor independently: one sensor
/// failing to set up or stop never prevents the others from running.
pub struct SensorSuite {
    members: Vec<Member>,
}

impl SensorSuite {
    pub fn new(sensors: Vec<Sensor>) -> Self {
        Self {
            members: sensors
                .into_iter()
                .map(|sensor| Member { sensor, ready: false })
                .collect(),
        }
    }

    /// Build the flight sensor set and the readers for its slots
    pub fn from_config(config: &Config) -> (Self, SensorReaders) {
        let poll = config.temperature.poll_interval();

        let gps = SensorTask::new(GpsReceiver::new(&config.gps));
        let internal = SensorTask::new(Thermometer::new(
            "internal_temperature",
            &config.temperature.internal_path,
            poll,
        ));
        let external = SensorTask::new(Thermometer::new(
            "external_temperature",
            &config.temperature.external_path,
            poll,
        ));
        let barometer = SensorTask::new(Barometer::new(&config.pressure));
        let uv = SensorTask::new(UvSensor::new(&config.uv));

        let readers = SensorReaders {
            gps: gps.reader(),
            internal_temperature: internal.reader(),
            external_temperature: external.reader(),
            pressure: barometer.reader(),
            uv: uv.reader(),
        };

        let suite = Self::new(vec![
            Sensor::Gps(gps),
            Sensor::Thermometer(internal),
            Sensor::Thermometer(external),
            Sensor::Barometer(barometer),
            Sensor::Uv(uv),
        ]);

        (suite, readers)
    }

    /// Set up every sensor; returns how many are ready
    pub async fn setup(&mut self) -> usize {
        for member in &mut self.members {
            let control = member.sensor.control();
            match control.setup().await {
                Ok(()) => {
                    info!("{} ready", control.name());
                    member.ready = true;
                }
                Err(e) => {
                    error!("{} setup failed, sensor disabled: {}", control.name(), e);
                    member.ready = false;
                }
            }
        }
        self.ready_count()
    }

    /// Start background acquisition on every ready sensor
    pub fn start(&mut self) {
        for member in self.members.iter_mut().filter(|m| m.ready) {
            let control = member.sensor.control();
            if let Err(e) = control.start() {
                warn!("{} failed to start: {}", control.name(), e);
            }
        }
    }

    /// Stop every running sensor
    pub async fn stop(&mut self) {
        for member in &mut self.members {
            let control = member.sensor.control();
            if let Err(e) = control.stop().await {
                warn!("{} failed to stop: {}", control.name(), e);
            }
        }
    }

    /// Release every sensor that was set up
    pub async fn teardown(&mut self) {
        for member in self.members.iter_mut().filter(|m| m.ready) {
            let control = member.sensor.control();
            if let Err(e) = control.teardown().await {
                warn!("{} teardown failed: {}", control.name(), e);
            }
            member.ready = false;
        }
    }

    pub fn ready_count(&self) -> usize {
        self.members.iter().filter(|m| m.ready).count()
    }

    pub fn running_count(&mut self) -> usize {
        self.members
            .iter_mut()
            .map(|m| m.sensor.control().is_running())
            .filter(|&running| running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Read handles for every sensor slot
#[derive(Clone)]
pub struct SensorReaders {
    pub gps: SlotReader<GpsState>,
    pub internal_temperature: SlotReader<f64>,
    pub external_temperature: SlotReader<f64>,
    pub pressure: SlotReader<PressureReading>,
    pub uv: SlotReader<UvReading>,
}

impl SensorReaders {
    /// Copy the current value of every slot
    pub fn snapshot(&self, taken_at: DateTime<Utc>) -> SensorSnapshot {
        SensorSnapshot {
            taken_at,
            gps: self.gps.value().unwrap_or_default(),
            internal_temperature: self.internal_temperature.value(),
            external_temperature: self.external_temperature.value(),
            pressure: self.pressure.value(),
            uv: self.uv.value(),
        }
    }
}

/// Sensor values at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSnapshot {
    pub taken_at: DateTime<Utc>,
    pub gps: GpsState,
    pub internal_temperature: Option<f64>,
    pub external_temperature: Option<f64>,
    pub pressure: Option<PressureReading>,
    pub uv: Option<UvReading>,
}

impl SensorSnapshot {
    pub fn pressure_mbar(&self) -> Option<f64> {
        self.pressure.map(|p| p.pressure_mbar)
    }

    /// Barometer die temperature
    pub fn auxiliary_temperature(&self) -> Option<f64> {
        self.pressure.map(|p| p.temperature_c)
    }

    /// Altitude estimated from the barometer
    pub fn pressure_altitude(&self) -> Option<f64> {
        self.pressure
            .and_then(|p| pressure::pressure_altitude(p.pressure_mbar, p.temperature_c))
    }

    pub fn uva(&self) -> Option<f64> {
        self.uv.map(|uv| uv.uva)
    }

    pub fn uvb(&self) -> Option<f64> {
        self.uv.map(|uv| uv.uvb)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use slot::slot;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Snapshot with every value present
    pub(crate) fn full_snapshot() -> SensorSnapshot {
        SensorSnapshot {
            taken_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 35, 19).unwrap(),
            gps: GpsState {
                latitude_deg: Some(-48.1173),
                longitude_deg: Some(11.51667),
                hdop: Some(0.9),
                altitude_m: Some(545.4),
            },
            internal_temperature: Some(21.5),
            external_temperature: Some(-12.25),
            pressure: Some(PressureReading {
                pressure_mbar: 1000.0907021379712,
                temperature_c: 20.07985376358032,
            }),
            uv: Some(UvReading {
                uva: 260.5376344086021,
                uvb: 75.85714285714286,
            }),
        }
    }

    /// Readers whose writers are already gone; every slot stays empty
    pub(crate) fn empty_readers() -> SensorReaders {
        SensorReaders {
            gps: slot().1,
            internal_temperature: slot().1,
            external_temperature: slot().1,
            pressure: slot().1,
            uv: slot().1,
        }
    }

    fn probe_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_readers_give_empty_snapshot() {
        let now = Utc::now();
        let snapshot = empty_readers().snapshot(now);

        assert_eq!(snapshot.taken_at, now);
        assert_eq!(snapshot.gps, GpsState::default());
        assert_eq!(snapshot.pressure_altitude(), None);
        assert_eq!(snapshot.auxiliary_temperature(), None);
        assert_eq!(snapshot.uva(), None);
    }

    #[test]
    fn test_snapshot_reads_slots() {
        let (pressure_tx, pressure) = slot();
        let (uv_tx, uv) = slot();
        let (temp_tx, internal_temperature) = slot();
        let readers = SensorReaders {
            gps: slot().1,
            internal_temperature,
            external_temperature: slot().1,
            pressure,
            uv,
        };

        temp_tx.publish(19.5);
        pressure_tx.publish(PressureReading {
            pressure_mbar: 1000.0907021379712,
            temperature_c: 20.07985376358032,
        });
        uv_tx.publish(UvReading { uva: 1.0, uvb: 2.0 });

        let snapshot = readers.snapshot(Utc::now());
        assert_eq!(snapshot.internal_temperature, Some(19.5));
        assert_eq!(snapshot.external_temperature, None);
        assert_eq!(snapshot.uvb(), Some(2.0));
        assert!((snapshot.pressure_altitude().unwrap() - 177.914).abs() < 0.01);
        assert!((snapshot.auxiliary_temperature().unwrap() - 20.0799).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_suite_isolates_failed_setup() {
        let good = probe_file("aa : crc=01 YES\naa t=18500\n");
        let good_probe = SensorTask::new(Thermometer::new("good", good.path(), Duration::from_millis(10)));
        let good_reader = good_probe.reader();
        let bad_probe = SensorTask::new(Thermometer::new("bad", "/nonexistent/w1_slave", Duration::ZERO));

        let mut suite = SensorSuite::new(vec![
            Sensor::Thermometer(bad_probe),
            Sensor::Thermometer(good_probe),
        ]);

        assert_eq!(suite.setup().await, 1);
        suite.start();
        assert_eq!(suite.running_count(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(good_reader.value(), Some(18.5));

        suite.stop().await;
        assert_eq!(suite.running_count(), 0);
        suite.teardown().await;
        assert_eq!(suite.ready_count(), 0);
        assert_eq!(suite.len(), 2);
    }

    #[test]
    fn test_from_config_builds_flight_set() {
        let (suite, _readers) = SensorSuite::from_config(&crate::config::create_valid_config());
        assert_eq!(suite.len(), 5);
        assert_eq!(suite.ready_count(), 0);

        let names: Vec<&str> = suite.members.iter().map(|m| m.sensor.name()).collect();
        assert_eq!(
            names,
            vec!["gps", "internal_temperature", "external_temperature", "pressure", "uv"]
        );
    }
}

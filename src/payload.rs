//! # Payload Context
//!
//! Owns everything the flight software opens: the sensor tasks, the channel
//! files and the radio link. [`Payload::setup`] acquires them in order,
//! [`Payload::run_until`] drives the scheduler on a fixed tick, and
//! [`Payload::teardown`] releases them again.

use chrono::{DateTime, Utc};
use std::fs::File;
use std::future::Future;
use std::io::{BufWriter, Write};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::radio::{RadioLink, SerialRadio};
use crate::scheduler::{AcquisitionScheduler, TickReport};
use crate::sensors::SensorSuite;
use crate::serial::port_trait::TokioSerialPort;
use crate::telemetry::ChannelRecorder;

/// Counters for one run of the control loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub samples: u64,
    pub telemetry_frames: u64,
    pub science_frames: u64,
    pub stage_failures: u64,
}

impl RunStats {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.samples += u64::from(report.sample.fired());
        self.telemetry_frames += u64::from(report.telemetry.is_completed());
        self.science_frames += u64::from(report.science.is_completed());
        self.stage_failures += report.failure_count() as u64;
    }
}

/// The flight configuration: serial radio and files on disk
pub type FlightPayload = Payload<SerialRadio<TokioSerialPort>, BufWriter<File>>;

pub struct Payload<R: RadioLink, W: Write> {
    sensors: SensorSuite,
    scheduler: AcquisitionScheduler<R, W>,
    tick_interval: Duration,
}

impl FlightPayload {
    /// Open the radio, set up and start the sensors, open the channel files
    ///
    /// The radio and the data directory are required; a sensor that fails to
    /// set up is left out and its fields stay empty.
    pub async fn setup(config: &Config, session_start: DateTime<Utc>) -> Result<Self> {
        let mut radio = SerialRadio::open(&config.radio)?;
        radio.start().await?;

        let recorder = match ChannelRecorder::create(&config.storage.data_dir, session_start) {
            Ok(recorder) => recorder,
            Err(e) => {
                if let Err(stop_err) = radio.stop().await {
                    warn!("Radio stop failed: {}", stop_err);
                }
                return Err(e);
            }
        };

        let (mut sensors, readers) = SensorSuite::from_config(config);
        let ready = sensors.setup().await;
        info!("{} of {} sensors ready", ready, sensors.len());
        sensors.start();

        let scheduler =
            AcquisitionScheduler::from_config(&config.schedule, readers, recorder, radio);

        Ok(Payload::new(
            sensors,
            scheduler,
            config.schedule.tick_interval(),
        ))
    }
}

impl<R: RadioLink, W: Write> Payload<R, W> {
    pub fn new(
        sensors: SensorSuite,
        scheduler: AcquisitionScheduler<R, W>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            sensors,
            scheduler,
            tick_interval,
        }
    }

    /// Tick the scheduler until `shutdown` completes
    ///
    /// A tick in progress is finished before the loop checks for shutdown.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> RunStats {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut stats = RunStats::default();
        info!("Control loop running, tick every {:?}", self.tick_interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.scheduler.tick().await;
                    stats.record(&report);
                }
            }
        }

        info!(
            "Control loop stopped: {} ticks, {} samples, {} telemetry, {} science, {} stage failures",
            stats.ticks,
            stats.samples,
            stats.telemetry_frames,
            stats.science_frames,
            stats.stage_failures
        );
        stats
    }

    /// Stop the sensors, close the files, stop the radio
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned.
    pub async fn teardown(mut self) -> Result<()> {
        let mut first_error = None;

        self.sensors.stop().await;
        self.sensors.teardown().await;
        info!("Sensors shut down");

        if let Err(e) = self.scheduler.recorder_mut().close() {
            warn!("Closing channel files failed: {}", e);
            first_error = Some(e);
        }

        if let Err(e) = self.scheduler.radio_mut().stop().await {
            warn!("Radio stop failed: {}", e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Teardown complete");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use crate::radio::MockRadioLink;
    use crate::sensors::tests::empty_readers;
    use crate::telemetry::Channel;

    fn test_payload(radio: MockRadioLink) -> Payload<MockRadioLink, Vec<u8>> {
        let config = crate::config::create_valid_config();
        let recorder =
            ChannelRecorder::from_writers(Channel::ALL.iter().map(|&c| (c, Vec::new())).collect());
        let scheduler =
            AcquisitionScheduler::from_config(&config.schedule, empty_readers(), recorder, radio);
        Payload::new(
            SensorSuite::new(Vec::new()),
            scheduler,
            config.schedule.tick_interval(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown() {
        let mut radio = MockRadioLink::new();
        radio.expect_send_telemetry().times(2).returning(|_| Ok(()));
        radio.expect_send_science().times(1).returning(|_| Ok(()));
        radio.expect_stop().times(1).returning(|| Ok(()));

        let mut payload = test_payload(radio);
        let stats = payload
            .run_until(tokio::time::sleep(Duration::from_secs(40)))
            .await;

        assert!(stats.ticks > 300, "ticks: {}", stats.ticks);
        assert!(stats.samples >= 18, "samples: {}", stats.samples);
        assert_eq!(stats.telemetry_frames, 2);
        assert_eq!(stats.science_frames, 1);
        assert_eq!(stats.stage_failures, 0);

        payload.teardown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_failures_do_not_stop_the_loop() {
        let mut radio = MockRadioLink::new();
        radio
            .expect_send_telemetry()
            .times(4)
            .returning(|_| Err(PayloadError::Serial("no carrier".into())));
        radio.expect_send_science().never();
        radio.expect_stop().returning(|| Ok(()));

        let mut payload = test_payload(radio);
        let stats = payload
            .run_until(tokio::time::sleep(Duration::from_secs(40)))
            .await;

        // Telemetry is retried on every log firing from 18 s on; science
        // waits for a telemetry frame to go out
        assert!(stats.samples >= 18, "samples: {}", stats.samples);
        assert_eq!(stats.telemetry_frames, 0);
        assert_eq!(stats.stage_failures, 4);
        assert_eq!(stats.science_frames, 0);
        payload.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_reports_radio_failure() {
        let mut radio = MockRadioLink::new();
        radio
            .expect_stop()
            .times(1)
            .returning(|| Err(PayloadError::Serial("stuck".into())));

        let payload = test_payload(radio);
        assert!(matches!(payload.teardown().await, Err(PayloadError::Serial(_))));
    }

    #[tokio::test]
    async fn test_immediate_shutdown() {
        let mut payload = test_payload(MockRadioLink::new());
        let stats = payload.run_until(std::future::ready(())).await;
        assert!(stats.ticks <= 1);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = RunStats::default();
        stats.record(&TickReport::default());
        assert_eq!(
            stats,
            RunStats {
                ticks: 1,
                ..RunStats::default()
            }
        );
    }
}

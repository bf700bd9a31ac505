//! # Acquisition Scheduler
//!
//! The control loop's per-tick work. A tick walks the cadence cascade from
//! [`cadence`]:
//!
//! 1. **Sample** - snapshot every sensor slot, append to the channel files
//! 2. **Log** - format both frames into the session log
//! 3. **Telemetry** - send the telemetry frame
//! 4. **Science** - wait the settle delay, send the science frame
//!
//! Each stage reports a [`StageOutcome`]. A cadence's timer restarts only
//! when its stage completes. A failed stage is logged and ends the tick, so
//! the stages nested inside it are not checked and the failed stage is
//! retried the next time its gate is reached. Nothing that happens inside
//! a tick stops the loop.

pub mod cadence;

use chrono::Utc;
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub use cadence::{Cadence, Firings, ScheduleState};

use crate::config::ScheduleConfig;
use crate::error::{PayloadError, Result};
use crate::radio::RadioLink;
use crate::sensors::{SensorReaders, SensorSnapshot};
use crate::telemetry::{ChannelRecorder, ScienceFrame, TelemetryFrame};

/// Result of one stage on one tick
#[derive(Debug, Default)]
pub enum StageOutcome {
    /// Gate did not fire
    #[default]
    Skipped,
    Completed,
    Failed(PayloadError),
}

impl StageOutcome {
    fn from_result(stage: Cadence, result: Result<()>) -> Self {
        match result {
            Ok(()) => StageOutcome::Completed,
            Err(e) => {
                let err = PayloadError::stage(stage.name(), e);
                warn!("{}", err);
                StageOutcome::Failed(err)
            }
        }
    }

    /// The stage's gate fired this tick
    pub fn fired(&self) -> bool {
        !matches!(self, StageOutcome::Skipped)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

/// Everything that happened on one tick
#[derive(Debug, Default)]
pub struct TickReport {
    pub sample: StageOutcome,
    pub log: StageOutcome,
    pub telemetry: StageOutcome,
    pub science: StageOutcome,
}

impl TickReport {
    pub fn outcome(&self, cadence: Cadence) -> &StageOutcome {
        match cadence {
            Cadence::Sample => &self.sample,
            Cadence::Log => &self.log,
            Cadence::Telemetry => &self.telemetry,
            Cadence::Science => &self.science,
        }
    }

    pub fn firings(&self) -> Firings {
        Firings {
            sample: self.sample.fired(),
            log: self.log.fired(),
            telemetry: self.telemetry.fired(),
            science: self.science.fired(),
        }
    }

    pub fn failure_count(&self) -> usize {
        Cadence::ALL
            .iter()
            .filter(|&&c| self.outcome(c).is_failed())
            .count()
    }
}

/// Runs the cadence cascade against the sensor slots, channel files and radio
pub struct AcquisitionScheduler<R: RadioLink, W: Write> {
    readers: SensorReaders,
    recorder: ChannelRecorder<W>,
    radio: R,
    schedule: ScheduleState,
    science_settle: Duration,
}

impl<R: RadioLink, W: Write> AcquisitionScheduler<R, W> {
    pub fn new(
        readers: SensorReaders,
        recorder: ChannelRecorder<W>,
        radio: R,
        schedule: ScheduleState,
        science_settle: Duration,
    ) -> Self {
        Self {
            readers,
            recorder,
            radio,
            schedule,
            science_settle,
        }
    }

    /// Scheduler whose cadence timers start now
    pub fn from_config(
        config: &ScheduleConfig,
        readers: SensorReaders,
        recorder: ChannelRecorder<W>,
        radio: R,
    ) -> Self {
        Self::new(
            readers,
            recorder,
            radio,
            ScheduleState::from_config(config, Instant::now()),
            config.science_settle(),
        )
    }

    /// Run one pass of the cascade
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if !self.schedule.is_due(Cadence::Sample, Instant::now()) {
            return report;
        }
        let snapshot = self.readers.snapshot(Utc::now());
        let result = self.recorder.record(&snapshot);
        report.sample = self.finish(Cadence::Sample, result);
        if !report.sample.is_completed() || !self.schedule.is_due(Cadence::Log, Instant::now()) {
            return report;
        }

        let telemetry = TelemetryFrame::from_snapshot(&snapshot);
        let science = ScienceFrame::from_snapshot(&snapshot);
        report.log = self.finish(Cadence::Log, log_frames(&telemetry, &science));
        if !report.log.is_completed() || !self.schedule.is_due(Cadence::Telemetry, Instant::now()) {
            return report;
        }

        let result = self.radio.send_telemetry(&telemetry).await;
        report.telemetry = self.finish(Cadence::Telemetry, result);
        if !report.telemetry.is_completed()
            || !self.schedule.is_due(Cadence::Science, Instant::now())
        {
            return report;
        }

        let result = self.send_science(&science).await;
        report.science = self.finish(Cadence::Science, result);

        report
    }

    /// Record a stage result; the cadence's timer restarts only on success
    fn finish(&mut self, cadence: Cadence, result: Result<()>) -> StageOutcome {
        let outcome = StageOutcome::from_result(cadence, result);
        if outcome.is_completed() {
            self.schedule.reset(cadence, Instant::now());
        }
        outcome
    }

    async fn send_science(&mut self, frame: &ScienceFrame) -> Result<()> {
        tokio::time::sleep(self.science_settle).await;
        self.radio.send_science(frame.body().as_bytes()).await?;
        info!("Science frame sent");
        Ok(())
    }

    /// Latest values of every sensor
    pub fn snapshot(&self) -> SensorSnapshot {
        self.readers.snapshot(Utc::now())
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn recorder_mut(&mut self) -> &mut ChannelRecorder<W> {
        &mut self.recorder
    }
}

fn log_frames(telemetry: &TelemetryFrame, science: &ScienceFrame) -> Result<()> {
    for frame in [telemetry.to_string(), science.to_string()] {
        if !frame.is_ascii() {
            return Err(PayloadError::Parse(format!("frame is not ASCII: {}", frame)));
        }
        info!("{}", frame);
    }
    Ok(())
}

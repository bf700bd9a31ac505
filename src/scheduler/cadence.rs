//! # Cadence State Machine
//!
//! Four cadence timers, each gated inside the previous one:
//!
//! ```text
//! sample (2 s) -> log (5 s) -> telemetry (17 s) -> science (27 s)
//! ```
//!
//! A cadence's timer is only inspected on a tick where the cadence it is
//! nested in completed, and it resets only when its own work completes. The slower
//! cadences therefore run on multiples of the faster ones: with the default
//! thresholds and a 1 s tick the log stage fires every 6 s and telemetry
//! every 18 s. Any delay in a faster stage also delays the slower ones.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::ScheduleConfig;

/// The scheduler's cadences, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Snapshot sensors and record channels
    Sample,
    /// Format frames into the session log
    Log,
    /// Send the telemetry frame
    Telemetry,
    /// Send the science frame
    Science,
}

impl Cadence {
    pub const ALL: [Cadence; 4] = [
        Cadence::Sample,
        Cadence::Log,
        Cadence::Telemetry,
        Cadence::Science,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Cadence::Sample => "sample",
            Cadence::Log => "log",
            Cadence::Telemetry => "telemetry",
            Cadence::Science => "science",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Which cadences fired on one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Firings {
    pub sample: bool,
    pub log: bool,
    pub telemetry: bool,
    pub science: bool,
}

/// Cadence thresholds and the instant each timer was last reset
#[derive(Debug, Clone)]
pub struct ScheduleState {
    thresholds: [Duration; 4],
    started: [Instant; 4],
}

impl ScheduleState {
    /// All timers start at `start`
    pub fn new(thresholds: [Duration; 4], start: Instant) -> Self {
        Self {
            thresholds,
            started: [start; 4],
        }
    }

    pub fn from_config(config: &ScheduleConfig, start: Instant) -> Self {
        Self::new(
            [
                Duration::from_millis(config.sample_interval_ms),
                Duration::from_millis(config.log_interval_ms),
                Duration::from_millis(config.telemetry_interval_ms),
                Duration::from_millis(config.science_interval_ms),
            ],
            start,
        )
    }

    pub fn threshold(&self, cadence: Cadence) -> Duration {
        self.thresholds[cadence.index()]
    }

    /// Time since `cadence`'s timer was last reset
    pub fn elapsed(&self, cadence: Cadence, now: Instant) -> Duration {
        now.saturating_duration_since(self.started[cadence.index()])
    }

    /// `cadence`'s threshold has passed
    ///
    /// The caller is responsible for only checking a cadence when the one
    /// it is nested in has completed.
    pub fn is_due(&self, cadence: Cadence, now: Instant) -> bool {
        self.elapsed(cadence, now) >= self.threshold(cadence)
    }

    /// Restart `cadence`'s timer at `now`
    pub fn reset(&mut self, cadence: Cadence, now: Instant) {
        self.started[cadence.index()] = now;
    }

    /// Check one gate and reset its timer when it fires
    pub fn gate(&mut self, cadence: Cadence, now: Instant) -> bool {
        let due = self.is_due(cadence, now);
        if due {
            self.reset(cadence, now);
        }
        due
    }

    /// Run the whole gate cascade at a single instant
    pub fn evaluate(&mut self, now: Instant) -> Firings {
        let mut firings = Firings::default();
        firings.sample = self.gate(Cadence::Sample, now);
        if !firings.sample {
            return firings;
        }
        firings.log = self.gate(Cadence::Log, now);
        if !firings.log {
            return firings;
        }
        firings.telemetry = self.gate(Cadence::Telemetry, now);
        if !firings.telemetry {
            return firings;
        }
        firings.science = self.gate(Cadence::Science, now);
        firings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight_thresholds() -> [Duration; 4] {
        [2, 5, 17, 27].map(Duration::from_secs)
    }

    /// Tick indices (seconds) at which each cadence fired over `ticks` 1 s ticks
    fn simulate(ticks: u64) -> [Vec<u64>; 4] {
        let start = Instant::now();
        let mut state = ScheduleState::new(flight_thresholds(), start);
        let mut fired: [Vec<u64>; 4] = Default::default();

        for t in 1..=ticks {
            let firings = state.evaluate(start + Duration::from_secs(t));
            for (i, did_fire) in [firings.sample, firings.log, firings.telemetry, firings.science]
                .into_iter()
                .enumerate()
            {
                if did_fire {
                    fired[i].push(t);
                }
            }
        }
        fired
    }

    #[test]
    fn test_thirty_ticks() {
        let [sample, log, telemetry, science] = simulate(30);

        assert_eq!(sample, (1..=15).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(log, vec![6, 12, 18, 24, 30]);
        assert_eq!(telemetry, vec![18]);
        assert!(science.is_empty());
    }

    #[test]
    fn test_science_first_fires_at_thirty_six() {
        let [_, log, telemetry, science] = simulate(40);

        assert_eq!(log, vec![6, 12, 18, 24, 30, 36]);
        assert_eq!(telemetry, vec![18, 36]);
        assert_eq!(science, vec![36]);
    }

    #[test]
    fn test_science_never_fires_alone() {
        let start = Instant::now();
        let mut state = ScheduleState::new(flight_thresholds(), start);
        let mut now = start;
        let mut science_count = 0;

        // Irregular tick spacing between 300 ms and 2.9 s
        for step in 0..500u64 {
            now += Duration::from_millis(300 + (step * 7919) % 2600);
            let firings = state.evaluate(now);
            if firings.science {
                assert!(firings.sample && firings.log && firings.telemetry);
                science_count += 1;
            }
            if firings.telemetry {
                assert!(firings.sample && firings.log);
            }
            if firings.log {
                assert!(firings.sample);
            }
        }
        assert!(science_count > 0);
    }

    #[test]
    fn test_gate_resets_only_its_own_timer() {
        let start = Instant::now();
        let mut state = ScheduleState::new(flight_thresholds(), start);
        let later = start + Duration::from_secs(3);

        assert!(state.gate(Cadence::Sample, later));
        assert_eq!(state.elapsed(Cadence::Sample, later), Duration::ZERO);
        assert_eq!(state.elapsed(Cadence::Log, later), Duration::from_secs(3));
        assert!(!state.gate(Cadence::Log, later));
    }

    #[test]
    fn test_due_cadence_stays_due_until_reset() {
        let start = Instant::now();
        let mut state = ScheduleState::new(flight_thresholds(), start);
        let first = start + Duration::from_secs(18);

        assert!(state.is_due(Cadence::Telemetry, first));
        assert!(state.is_due(Cadence::Telemetry, first + Duration::from_secs(6)));

        state.reset(Cadence::Telemetry, first + Duration::from_secs(6));
        assert!(!state.is_due(Cadence::Telemetry, first + Duration::from_secs(12)));
        assert_eq!(
            state.elapsed(Cadence::Telemetry, first + Duration::from_secs(12)),
            Duration::from_secs(6)
        );
    }

    #[test]
    fn test_from_config() {
        let config = crate::config::create_valid_config().schedule;
        let state = ScheduleState::from_config(&config, Instant::now());

        let thresholds: Vec<_> = Cadence::ALL.iter().map(|&c| state.threshold(c)).collect();
        assert_eq!(thresholds, flight_thresholds().to_vec());
        assert_eq!(Cadence::Telemetry.name(), "telemetry");
    }
}

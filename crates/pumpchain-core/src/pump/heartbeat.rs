//! Timed wait that keeps polling the pump

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

use super::{OperatingState, Pump};
use crate::protocol::{PumpError, Result, Transport};

/// How long to wait and how often to poll while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heartbeat {
    #[serde(with = "millis")]
    pub duration: Duration,
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    pub fail_on_stall: bool,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            duration: Duration::ZERO,
            poll_interval: Duration::from_secs(1),
            fail_on_stall: true,
        }
    }
}

impl Heartbeat {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_fail_on_stall(mut self, fail: bool) -> Self {
        self.fail_on_stall = fail;
        self
    }
}

/// What happened during a heartbeat wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub polls: usize,
    pub last_state: OperatingState,
    pub elapsed: Duration,
}

impl<T: Transport> Pump<'_, T> {
    /// Sleep for `heartbeat.duration`, querying the state every poll interval.
    ///
    /// Polling starts immediately and stops once the deadline passes. A stall
    /// aborts the wait with [`PumpError::Stall`] when `fail_on_stall` is set;
    /// on families that cannot report a stall this only logs a warning.
    pub fn wait_with_heartbeat(&mut self, heartbeat: &Heartbeat) -> Result<HeartbeatReport> {
        if heartbeat.poll_interval.is_zero() {
            return Err(PumpError::InvalidArgument(
                "heartbeat poll interval must be positive".to_string(),
            ));
        }
        if heartbeat.fail_on_stall && !self.profile.detects_stall() {
            tracing::warn!(
                pump = %self.name(),
                "{} pumps cannot report a stall, waiting without stall detection",
                self.profile.name
            );
        }

        let started = Instant::now();
        let deadline = started + heartbeat.duration;
        let mut polls = 0;

        let last_state = loop {
            let state = self.get_state()?;
            polls += 1;
            if heartbeat.fail_on_stall && self.profile.is_stalled(state) {
                return Err(PumpError::Stall(self.name().to_string()));
            }

            let now = Instant::now();
            if now >= deadline {
                break state;
            }
            thread::sleep(heartbeat.poll_interval.min(deadline - now));
            if Instant::now() >= deadline {
                break state;
            }
        };

        let report = HeartbeatReport {
            polls,
            last_state,
            elapsed: started.elapsed(),
        };
        tracing::debug!(pump = %self.name(), "heartbeat finished after {} polls", report.polls);
        Ok(report)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Closed,

    /// Closed, but the backlog has reached the warning level.
    Warning,

    /// The backlog has reached the trip level; intake must stall until it drains below the
    /// warning level.
    Tripped,
}

/// Gates intake on the number of blocks waiting to be written.
///
/// The breaker only tracks levels and log cooldowns. Stalling, and the flushes that drain the
/// backlog, are up to the caller.
#[derive(Debug)]
pub struct CircuitBreaker {
    log_ident: String,
    warning_level: usize,
    trip_level: usize,
    stall_interval: Duration,
    log_cooldown_interval: Duration,
    next_warning_log: Option<Instant>,
    next_trip_log: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(log_ident: impl Into<String>, config: &config::CircuitBreaker) -> Self {
        Self {
            log_ident: log_ident.into(),
            warning_level: config.warning_level,
            trip_level: config.trip_level,
            stall_interval: config.stall_interval(),
            log_cooldown_interval: config.log_cooldown_interval(),
            next_warning_log: None,
            next_trip_log: None,
        }
    }

    /// Forget log cooldowns, e.g. when a partition is (re)opened.
    pub fn reset(&mut self, log_ident: impl Into<String>) {
        self.log_ident = log_ident.into();
        self.next_warning_log = None;
        self.next_trip_log = None;
        info!(
            "{}Circuit breaker initialized. Warning level {}, trip level {}, stall interval {:?}, log cooldown interval {:?}",
            self.log_ident,
            self.warning_level,
            self.trip_level,
            self.stall_interval,
            self.log_cooldown_interval
        );
    }

    pub fn stall_interval(&self) -> Duration {
        self.stall_interval
    }

    pub fn evaluate(&mut self, level: usize) -> Verdict {
        if level < self.warning_level {
            debug!("{}Circuit closed. Current level {level}", self.log_ident);
            self.next_warning_log = None;
            return Verdict::Closed;
        }

        let now = Instant::now();
        if level < self.trip_level {
            if self.next_warning_log.map_or(true, |next| next <= now) {
                warn!(
                    "{}Over warning level {}. Current level {level}",
                    self.log_ident, self.warning_level
                );
                self.next_warning_log = Some(now + self.log_cooldown_interval);
            }
            return Verdict::Warning;
        }

        error!(
            "{}Over trip level {}. Circuit broken, current level {level}",
            self.log_ident, self.trip_level
        );
        self.next_trip_log = Some(now + self.log_cooldown_interval);
        Verdict::Tripped
    }

    /// Re-evaluate the backlog while stalled. Returns true once it has drained below the
    /// warning level.
    pub fn check_restored(&mut self, level: usize) -> bool {
        if level < self.warning_level {
            info!(
                "{}Under warning level {}. Processing restored, current level {level}",
                self.log_ident, self.warning_level
            );
            self.next_warning_log = None;
            self.next_trip_log = None;
            return true;
        }

        let now = Instant::now();
        if self.next_trip_log.map_or(true, |next| next <= now) {
            error!(
                "{}Over trip level {}. Circuit broken, current level {level}",
                self.log_ident, self.trip_level
            );
            self.next_trip_log = Some(now + self.log_cooldown_interval);
        } else {
            debug!(
                "{}Stalling for {:?}. Current level {level}",
                self.log_ident, self.stall_interval
            );
        }
        false
    }

    #[cfg(test)]
    fn warning_logged(&self) -> bool {
        self.next_warning_log.is_some()
    }

    #[cfg(test)]
    fn next_trip_log(&self) -> Option<Instant> {
        self.next_trip_log
    }
}

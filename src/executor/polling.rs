use std::time::Duration;

use tokio::time::Instant;

use crate::utils::conf::PollingConf;

/// Decides how long to wait before each status poll, and when to give up.
pub trait PollingStrategy: Send + Sync {
    fn start(&self) -> Box<dyn PollSession>;
}

/// Polling state of a single call.
pub trait PollSession: Send {
    /// Delay before the next poll, or `None` once the call has run out of attempts or time.
    fn next_delay(&mut self) -> Option<Duration>;
}

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_attempts: Option<u32>,
    pub timeout: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.4,
            max_interval: Duration::from_secs(1),
            max_attempts: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl From<&PollingConf> for ExponentialBackoff {
    fn from(conf: &PollingConf) -> Self {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(conf.initial_interval_ms),
            multiplier: conf.multiplier,
            max_interval: Duration::from_millis(conf.max_interval_ms),
            max_attempts: conf.max_attempts,
            timeout: Duration::from_millis(conf.timeout_ms),
        }
    }
}

impl PollingStrategy for ExponentialBackoff {
    fn start(&self) -> Box<dyn PollSession> {
        Box::new(BackoffSession {
            next_interval: self.initial_interval.min(self.max_interval),
            attempts: 0,
            deadline: Instant::now() + self.timeout,
            config: self.clone(),
        })
    }
}

struct BackoffSession {
    next_interval: Duration,
    attempts: u32,
    deadline: Instant,
    config: ExponentialBackoff,
}

impl PollSession for BackoffSession {
    fn next_delay(&mut self) -> Option<Duration> {
        if self
            .config
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
        {
            return None;
        }
        let remaining = self.deadline.checked_duration_since(Instant::now())?;
        if remaining.is_zero() {
            return None;
        }
        self.attempts += 1;

        let delay = self.next_interval.min(remaining);
        // Overflowing or non-finite growth saturates at the cap.
        let grown = self.next_interval.as_secs_f64() * self.config.multiplier.max(1.0);
        self.next_interval = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.config.max_interval)
            .min(self.config.max_interval);
        Some(delay)
    }
}

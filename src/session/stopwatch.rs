use std::time::{Duration, Instant};

/// Monotonic stopwatch with pause/resume.
///
/// Time only accumulates while running; `suspend` banks the running span
/// and `resume` continues without resetting.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
    started: bool,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset and start running.
    pub fn start(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(Instant::now());
        self.started = true;
    }

    pub fn suspend(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    /// Continue timing; starts the stopwatch on first use.
    pub fn resume(&mut self) {
        if !self.started {
            self.start();
        } else if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map_or(Duration::ZERO, |since| since.elapsed())
    }
}

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAYS_MS: [u64; 3] = [1000, 2000, 4000];

/// Bounded exponential backoff for the live transport.
///
/// The counter only moves when a scheduled attempt actually fires, so the
/// delay for the n-th attempt is `delays[n - 1]` (the last entry repeats).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delays: Vec<Duration>,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delays_ms: &[u64]) -> Self {
        let delays = if delays_ms.is_empty() {
            DEFAULT_DELAYS_MS.iter().copied().map(Duration::from_millis).collect()
        } else {
            delays_ms.iter().copied().map(Duration::from_millis).collect()
        };

        Self {
            max_attempts,
            delays,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        Some(self.delay_for(self.attempts))
    }

    /// Called when the scheduled timer fires.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    fn delay_for(&self, index: u32) -> Duration {
        let index = (index as usize).min(self.delays.len() - 1);
        self.delays[index]
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, &DEFAULT_DELAYS_MS)
    }
}

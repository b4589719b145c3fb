//! Bounded reconnection accounting.
//!
//! Broker-level errors are retried at a fixed delay up to a ceiling; the
//! counter resets on every successful connect. The policy only counts —
//! scheduling lives with the session, and transport-level failures never
//! touch it.

/// Attempt counter with a fixed ceiling.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempts: u32,
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Policy allowing at most `max_attempts` reconnections.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    /// Claim the next attempt. Returns the 1-based attempt number, or
    /// `None` once the ceiling is reached — at which point the failure is
    /// terminal.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    /// Reset the counter after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts claimed since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the ceiling has been reached.
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

//! Bounds the re-login loop a stale session can trigger.

/// Attempt bookkeeping for 421-triggered re-authentication.
///
/// Every stale-session recovery consumes one attempt via [`can_retry`];
/// a fully successful request cycle gives the budget back via [`reset`].
/// Once the ceiling is hit the operation must fail terminally instead of
/// attempting another silent login.
///
/// [`can_retry`]: ReconnectPolicy::can_retry
/// [`reset`]: ReconnectPolicy::reset
#[derive(Debug)]
pub struct ReconnectPolicy {
    attempts: u32,
    ceiling: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    /// Re-authentication attempts allowed before giving up.
    pub const DEFAULT_CEILING: u32 = 5;

    pub fn new() -> Self {
        Self::with_ceiling(Self::DEFAULT_CEILING)
    }

    pub fn with_ceiling(ceiling: u32) -> Self {
        Self {
            attempts: 0,
            ceiling,
        }
    }

    /// Consumes one attempt and reports whether the count is still under
    /// the ceiling.
    pub fn can_retry(&mut self) -> bool {
        self.attempts += 1;
        self.attempts < self.ceiling
    }

    /// Returns the whole budget after a successful cycle.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

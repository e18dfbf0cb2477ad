//! Incrementally maintained unread counter.

use tracing::error;

/// Counter change for one transition.
///
/// `prior` and `next` are the record's `read` flag before and after the
/// transition; `None` means no record. An unread record contributes one.
///
/// | prior  | next   | delta |
/// |--------|--------|-------|
/// | none   | unread | +1    |
/// | none   | read   | 0     |
/// | unread | read   | -1    |
/// | read   | unread | +1    |
/// | same   | same   | 0     |
/// | unread | none   | -1    |
/// | read   | none   | 0     |
/// | none   | none   | 0     |
pub fn unread_delta(prior: Option<bool>, next: Option<bool>) -> i64 {
    let weight = |flag: Option<bool>| match flag {
        Some(false) => 1,
        _ => 0,
    };
    weight(next) - weight(prior)
}

/// Number of unread records in the session.
#[derive(Debug, Default)]
pub struct UnreadCounter {
    value: u64,
    /// Times a delta would have driven the counter below zero.
    breaches: u64,
}

impl UnreadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.value
    }

    /// Apply a transition delta, clamping at zero.
    ///
    /// A clamp means the caller's bookkeeping is wrong; it is counted and
    /// logged rather than silently absorbed.
    pub fn apply(&mut self, delta: i64) -> u64 {
        let next = self.value as i64 + delta;
        if next < 0 {
            self.breaches += 1;
            error!(
                counter = self.value,
                delta, "unread counter would go negative, clamping to zero"
            );
            self.value = 0;
        } else {
            self.value = next as u64;
        }
        self.value
    }

    /// Record that the counter disagreed with a scan of `scanned` unread.
    pub fn report_drift(&mut self, scanned: u64) {
        self.breaches += 1;
        error!(
            counter = self.value,
            scanned, "unread counter disagreed with store"
        );
    }

    /// Overwrite the value. Used by resync and mark-all-read only.
    pub fn reset(&mut self, value: u64) {
        self.value = value;
    }

    pub fn breaches(&self) -> u64 {
        self.breaches
    }
}

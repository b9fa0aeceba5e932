//! Write-with-confirmation for 16-bit shared fields.
//!
//! The peer can write adjacent shared state at any moment and there is no
//! cross-processor atomicity beyond single word accesses, so every write to
//! a pointer, mailbox or handshake field is read back. A mismatch is retried
//! after a fixed delay; once the retry budget is spent the caller gets a
//! [`ConfirmError`] and is expected to treat the link as desynchronised.

use core::fmt;
use core::time::Duration;

use crate::access::ShmAccess;

/// Retries after the initial attempt before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 100;

/// Delay between a mismatching read-back and the next attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_micros(100);

/// How hard [`write16_confirmed`] tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    /// Retries after the first attempt. `max_retries + 1` mismatches fail.
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl ConfirmPolicy {
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// A confirmed write whose read-back never matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmError {
    /// Offset of the field.
    pub offset: usize,
    /// Value we tried to store.
    pub expected: u16,
    /// Last value read back.
    pub observed: u16,
    /// Total write attempts made.
    pub attempts: u32,
}

impl fmt::Display for ConfirmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "write of {:#06x} at offset {:#x} not confirmed after {} attempts (read back {:#06x})",
            self.expected, self.offset, self.attempts, self.observed
        )
    }
}

impl core::error::Error for ConfirmError {}

/// Write `value` at `offset`, read it back, and retry until they agree.
///
/// Returns the number of retries that were needed (0 when the first
/// read-back matched, which includes the case where `value` was already
/// present).
pub fn write16_confirmed<M: ShmAccess + ?Sized>(
    mem: &M,
    offset: usize,
    value: u16,
    policy: &ConfirmPolicy,
) -> Result<u32, ConfirmError> {
    mem.write16(offset, value);
    let mut observed = mem.read16(offset);
    if observed == value {
        return Ok(0);
    }

    for retry in 1..=policy.max_retries {
        pause(policy.delay);
        mem.write16(offset, value);
        observed = mem.read16(offset);
        if observed == value {
            return Ok(retry);
        }
    }

    Err(ConfirmError {
        offset,
        expected: value,
        observed,
        attempts: policy.max_retries + 1,
    })
}

fn pause(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    #[cfg(feature = "std")]
    std::thread::sleep(delay);
    #[cfg(not(feature = "std"))]
    for _ in 0..delay.as_micros() {
        core::hint::spin_loop();
    }
}

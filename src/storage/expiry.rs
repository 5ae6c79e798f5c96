//! Expiry Policy and Sweep Schedule
//!
//! Expirations are absolute Unix timestamps in seconds, with `0` meaning the
//! entry never expires. The policy is applied in three places:
//!
//! 1. **Write time**: a write whose expiration is already in the past is
//!    dropped without touching storage.
//! 2. **Read time**: every query carries the live predicate, so expired rows
//!    read as absent even while they are still on disk.
//! 3. **Sweep**: expired rows are physically deleted by a sweep that writes
//!    trigger at most once per cleanup interval.
//!
//! ## Why Sweep At All?
//!
//! Filtering alone keeps reads correct, but a key that expires and is never
//! written again would stay on disk forever. The sweep reclaims that space
//! without putting a delete on every read path.

use std::time::Duration;

use crate::config::DEFAULT_CLEANUP_INTERVAL;

/// Expiration sentinel for entries that never expire.
pub const NEVER_EXPIRES: i64 = 0;

/// SQL statement removing expired rows. Binds the current time as `?1`.
pub const SWEEP_SQL: &str = "DELETE FROM kv WHERE ttl > 0 AND ttl < ?1";

/// Returns true if a write with this expiration must be dropped.
#[inline]
pub fn is_rejected(expires_at: i64, now: i64) -> bool {
    expires_at != NEVER_EXPIRES && expires_at < now
}

/// Returns true if an entry with this expiration is visible at `now`.
#[inline]
pub fn is_live(expires_at: i64, now: i64) -> bool {
    expires_at == NEVER_EXPIRES || expires_at >= now
}

/// Throttle for expiry sweeps.
///
/// A sweep is due once `now` reaches `next_sweep`; taking it pushes
/// `next_sweep` one interval into the future. The first check is always due,
/// so a freshly opened store cleans up rows left behind by earlier runs on
/// its first write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSchedule {
    interval: i64,
    next_sweep: i64,
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_CLEANUP_INTERVAL)
    }
}

impl SweepSchedule {
    /// Creates a schedule with the given interval, clamped to at least one second.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: i64::try_from(interval.as_secs())
                .unwrap_or(i64::MAX)
                .max(1),
            next_sweep: 0,
        }
    }

    /// Interval between sweeps, in seconds.
    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Earliest time the next sweep may run.
    pub fn next_sweep(&self) -> i64 {
        self.next_sweep
    }

    /// Changes the interval.
    ///
    /// Non-positive intervals are ignored and `false` is returned. With
    /// `reset_now`, the next sweep is pushed to `now + seconds`.
    pub fn set_interval(&mut self, seconds: i64, reset_now: bool, now: i64) -> bool {
        if seconds <= 0 {
            return false;
        }
        self.interval = seconds;
        if reset_now {
            self.reschedule(now);
        }
        true
    }

    /// Pushes the next sweep one interval past `now`.
    pub fn reschedule(&mut self, now: i64) {
        self.next_sweep = now.saturating_add(self.interval);
    }

    /// Returns true and reschedules if a sweep is due at `now`.
    pub fn take_due(&mut self, now: i64) -> bool {
        if now >= self.next_sweep {
            self.reschedule(now);
            true
        } else {
            false
        }
    }
}

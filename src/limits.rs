// Limits on request, store and log entry sizes.

use std::sync::atomic::{AtomicUsize, Ordering};

pub const MAX_SLOTS_PER_ASSIGNMENT: usize = 64;
pub const MAX_ROOM_LABEL_LEN: usize = 128;
pub const MAX_ROOMS: usize = 10_000;
pub const MAX_ASSIGNMENTS: usize = 500_000;

/// Largest WAL payload replay will allocate for. A longer length prefix is
/// treated as corruption and ends the log.
pub const MAX_WAL_ENTRY_LEN: usize = 1 << 20;

/// Capacity given to rooms created on first use.
pub const DEFAULT_ROOM_CAPACITY: u32 = 30;

/// Lock acquisitions a mutation may redo when a concurrent update moved the
/// record to different resources while it waited.
pub const MAX_LOCK_RETRIES: usize = 8;

/// Cap on a store that grows through concurrent inserts. Each insert holds a
/// [`QuotaPermit`] from before its checks until after it is applied, so
/// inserts in flight count against the limit and it is never overshot.
#[derive(Debug)]
pub struct Quota {
    limit: usize,
    in_flight: AtomicUsize,
}

impl Quota {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// `None` when `stored` plus the inserts already in flight reach the limit.
    pub fn reserve(&self, stored: usize) -> Option<QuotaPermit<'_>> {
        let ahead = self.in_flight.fetch_add(1, Ordering::SeqCst);
        let permit = QuotaPermit(&self.in_flight);
        (stored.saturating_add(ahead) < self.limit).then_some(permit)
    }
}

/// Releases its reservation on drop.
#[must_use]
pub struct QuotaPermit<'a>(&'a AtomicUsize);

impl Drop for QuotaPermit<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_in_flight_count_against_the_limit() {
        let quota = Quota::new(2);
        let first = quota.reserve(0).unwrap();
        let second = quota.reserve(0).unwrap();
        assert!(quota.reserve(0).is_none());
        drop(first);
        assert!(quota.reserve(1).is_none());
        drop(second);
        assert!(quota.reserve(1).is_some());
        assert!(quota.reserve(2).is_none());
    }
}

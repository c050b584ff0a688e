//! Per-bidder rate gate for the Bid Admission Service (C3).
//!
//! One token per bidder, live for a fixed TTL, global across every auction —
//! `ratelimit:bid:{bidderId}`. Implemented as a put-if-absent entry in a
//! `DashMap` rather than a token bucket — the spec only asks for "no more
//! than one admitted bid attempt per bidder within the window", not a
//! sustained-rate limiter.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub struct RateGate {
    ttl: Duration,
    entries: DashMap<Uuid, Instant>,
}

impl RateGate {
    pub fn new(ttl_secs: u32) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs.max(1) as u64),
            entries: DashMap::new(),
        }
    }

    /// Returns `true` if this bidder is newly admitted (token acquired),
    /// `false` if they're still inside the window from a previous attempt on
    /// any auction.
    pub fn try_acquire(&self, bidder_id: Uuid) -> bool {
        let now = Instant::now();
        match self.entries.get(&bidder_id) {
            Some(expiry) if *expiry > now => false,
            _ => {
                self.entries.insert(bidder_id, now + self.ttl);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_in_window_is_admitted() {
        let gate = RateGate::new(1);
        assert!(gate.try_acquire(Uuid::new_v4()));
    }

    #[test]
    fn second_attempt_within_window_is_rejected() {
        let gate = RateGate::new(5);
        let bidder_id = Uuid::new_v4();
        assert!(gate.try_acquire(bidder_id));
        assert!(!gate.try_acquire(bidder_id));
    }

    #[test]
    fn different_bidders_do_not_share_a_token() {
        let gate = RateGate::new(5);
        assert!(gate.try_acquire(Uuid::new_v4()));
        assert!(gate.try_acquire(Uuid::new_v4()));
    }

    #[test]
    fn token_is_global_across_auctions_for_the_same_bidder() {
        let gate = RateGate::new(5);
        let bidder_id = Uuid::new_v4();
        assert!(gate.try_acquire(bidder_id));
        // Same bidder, different auction: still throttled, the token has no
        // auction dimension.
        assert!(!gate.try_acquire(bidder_id));
    }
}

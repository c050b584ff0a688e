//! Auction entity.
//!
//! Mirrors the fields kept hot while `status = active` and persisted to the
//! cold `auctions` table the rest of the time. Only the classic ascending
//! (English) format is modeled — Dutch/reverse/sealed-bid formats and proxy
//! bidding are out of scope.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Draft,
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    pub fn is_active(self) -> bool {
        matches!(self, AuctionStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AuctionStatus::Ended | AuctionStatus::Cancelled)
    }
}

/// Authoritative auction record. The same shape lives in the hot store (as
/// the live source of truth while active) and is mirrored into the cold
/// store for browsing and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: Uuid,

    // Immutable for the life of the auction.
    pub seller_id: Uuid,
    pub starting_price: Decimal,
    pub bid_increment: Decimal,
    pub reserve_price: Option<Decimal>,
    pub start_time: DateTime<Utc>,
    pub original_end_time: DateTime<Utc>,

    // Mutated only through the hot-store primitives (P1/P2/P3).
    pub current_bid: Decimal,
    pub highest_bidder_id: Option<Uuid>,
    pub total_bids: i64,
    pub end_time: DateTime<Utc>,
    pub status: AuctionStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auction {
    /// A brand-new auction has no bids yet: `current_bid` tracks
    /// `starting_price` until the first accepted bid.
    pub fn new_scheduled(
        id: Uuid,
        seller_id: Uuid,
        starting_price: Decimal,
        bid_increment: Decimal,
        reserve_price: Option<Decimal>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            seller_id,
            starting_price,
            bid_increment,
            reserve_price,
            start_time,
            original_end_time: end_time,
            current_bid: starting_price,
            highest_bidder_id: None,
            total_bids: 0,
            end_time,
            status: AuctionStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_first_bid(&self) -> bool {
        self.highest_bidder_id.is_none()
    }

    /// Minimum amount a new bid must meet or exceed, given an optional
    /// caller-supplied increment override (used only by P1's `incrementHint`).
    pub fn minimum_bid(&self, increment_hint: Option<Decimal>) -> Decimal {
        if self.is_first_bid() {
            return self.starting_price;
        }
        let effective_increment = increment_hint
            .filter(|inc| *inc > Decimal::ZERO)
            .unwrap_or(self.bid_increment);
        self.current_bid + effective_increment
    }

    pub fn reserve_met(&self) -> bool {
        match self.reserve_price {
            Some(reserve) => !self.is_first_bid() && self.current_bid >= reserve,
            None => true,
        }
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.end_time - now).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_auction() -> Auction {
        let now = Utc::now();
        Auction::new_scheduled(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(100.00),
            dec!(5.00),
            None,
            now,
            now + chrono::Duration::hours(1),
            now,
        )
    }

    #[test]
    fn first_bid_minimum_is_starting_price() {
        let auction = sample_auction();
        assert!(auction.is_first_bid());
        assert_eq!(auction.minimum_bid(None), dec!(100.00));
    }

    #[test]
    fn subsequent_minimum_uses_stored_increment_by_default() {
        let mut auction = sample_auction();
        auction.current_bid = dec!(100.00);
        auction.highest_bidder_id = Some(Uuid::new_v4());
        assert_eq!(auction.minimum_bid(None), dec!(105.00));
    }

    #[test]
    fn increment_hint_overrides_stored_increment_when_positive() {
        let mut auction = sample_auction();
        auction.current_bid = dec!(100.00);
        auction.highest_bidder_id = Some(Uuid::new_v4());
        assert_eq!(auction.minimum_bid(Some(dec!(10.00))), dec!(110.00));
        // A non-positive hint falls back to the stored increment.
        assert_eq!(auction.minimum_bid(Some(dec!(0.00))), dec!(105.00));
    }
}

//! Hot-State Store (C1).
//!
//! Holds the authoritative live state of every `active` auction and exposes
//! three atomic primitives (P1 `place_bid`, P2 `extend`, P3 `finalize`). All
//! mutation of auction state MUST go through these primitives.
//!
//! Linearizability per `auctionId` is provided by giving every entry its own
//! `parking_lot::Mutex` — operations on different auctions run fully
//! concurrently, operations on the same auction are serialized. This is the
//! source system's "stored procedure executed by the hot store" requirement,
//! emulated in-process with a per-key lock rather than an external scripting
//! facility (see SPEC_FULL.md §9).

pub mod errors;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{Auction, AuctionStatus};
use errors::{ExtendError, FinalizeError, PlaceBidError, TooLowDetails};

/// One bid as retained in the in-memory history for an auction, ordered by
/// commit order (which is also ascending by amount, per the monotonic-price
/// invariant).
#[derive(Debug, Clone)]
pub struct BidHistoryEntry {
    pub bidder_id: Uuid,
    pub amount: Decimal,
    pub server_time: DateTime<Utc>,
    pub previous_bid: Decimal,
}

struct Entry {
    auction: Auction,
    history: Vec<BidHistoryEntry>,
    /// Set once `status` becomes `Ended`; drives the retention sweep.
    retain_until: Option<DateTime<Utc>>,
}

pub struct PlaceBidOutcome {
    pub previous_bid: Decimal,
    pub previous_bidder_id: Option<Uuid>,
    pub total_bids: i64,
}

pub struct ExtendOutcome {
    pub extended: bool,
    pub old_end_time: DateTime<Utc>,
    pub new_end_time: DateTime<Utc>,
    pub extended_by_secs: i64,
    pub time_remaining_secs: i64,
}

pub struct FinalizeOutcome {
    pub winner_id: Option<Uuid>,
    pub winning_bid: Option<Decimal>,
    pub total_bids: i64,
    pub end_time: DateTime<Utc>,
}

/// In-process authoritative store, addressable by `auctionId`.
pub struct HotStore {
    entries: DashMap<Uuid, Arc<Mutex<Entry>>>,
    active_index: Mutex<BTreeSet<(DateTime<Utc>, Uuid)>>,
    retention: chrono::Duration,
    expiry_tx: mpsc::UnboundedSender<Uuid>,
}

impl HotStore {
    /// `expiry_tx` receives an `auctionId` whenever that auction's retention
    /// window lapses (Trigger B for the Finalization Coordinator).
    pub fn new(retention_secs: i64, expiry_tx: mpsc::UnboundedSender<Uuid>) -> Self {
        Self {
            entries: DashMap::new(),
            active_index: Mutex::new(BTreeSet::new()),
            retention: chrono::Duration::seconds(retention_secs),
            expiry_tx,
        }
    }

    /// Install an auction if no entry exists for its id yet (put-if-absent).
    /// Returns `true` if this call installed the record, `false` if a racing
    /// hydrator already won. Used both for fresh auctions and lazy hydration.
    pub fn insert_if_absent(&self, auction: Auction) -> bool {
        use dashmap::mapref::entry::Entry as DashEntry;
        match self.entries.entry(auction.id) {
            DashEntry::Occupied(_) => false,
            DashEntry::Vacant(slot) => {
                if auction.status.is_active() {
                    self.active_index.lock().insert((auction.end_time, auction.id));
                }
                slot.insert(Arc::new(Mutex::new(Entry {
                    auction,
                    history: Vec::new(),
                    retain_until: None,
                })));
                true
            }
        }
    }

    pub fn get(&self, auction_id: Uuid) -> Option<Auction> {
        self.entries.get(&auction_id).map(|e| e.lock().auction.clone())
    }

    pub fn bid_history(&self, auction_id: Uuid) -> Option<Vec<BidHistoryEntry>> {
        self.entries.get(&auction_id).map(|e| e.lock().history.clone())
    }

    /// Auction ids whose `end_time` is at or before `horizon`, oldest first.
    pub fn active_ending_by(&self, horizon: DateTime<Utc>) -> Vec<Uuid> {
        self.active_index
            .lock()
            .range(..(horizon, Uuid::max()))
            .map(|(_, id)| *id)
            .collect()
    }

    /// P1 — placeBid.
    #[instrument(skip(self), fields(auction_id = %auction_id, bidder_id = %bidder_id))]
    pub fn place_bid(
        &self,
        auction_id: Uuid,
        amount: Decimal,
        bidder_id: Uuid,
        server_time: DateTime<Utc>,
        increment_hint: Option<Decimal>,
    ) -> Result<PlaceBidOutcome, PlaceBidError> {
        let entry_arc = self.entries.get(&auction_id).ok_or(PlaceBidError::NotFound)?.clone();
        let mut entry = entry_arc.lock();

        if amount <= Decimal::ZERO || !crate::money::is_valid_amount(amount) {
            return Err(PlaceBidError::InvalidAmount);
        }
        if !entry.auction.status.is_active() {
            return Err(PlaceBidError::NotActive);
        }
        if server_time >= entry.auction.end_time {
            return Err(PlaceBidError::Ended);
        }
        if bidder_id == entry.auction.seller_id {
            return Err(PlaceBidError::SellerCannotBid);
        }

        let is_first_bid = entry.auction.is_first_bid();
        let minimum_bid = entry.auction.minimum_bid(increment_hint);
        if amount < minimum_bid {
            return Err(PlaceBidError::TooLow(TooLowDetails {
                current_bid: entry.auction.current_bid,
                minimum_bid,
                your_bid: amount,
                is_first_bid,
            }));
        }

        let previous_bid = entry.auction.current_bid;
        let previous_bidder_id = entry.auction.highest_bidder_id;

        entry.auction.current_bid = amount;
        entry.auction.highest_bidder_id = Some(bidder_id);
        entry.auction.total_bids += 1;
        entry.auction.updated_at = server_time;
        entry.history.push(BidHistoryEntry {
            bidder_id,
            amount,
            server_time,
            previous_bid,
        });

        debug!(total_bids = entry.auction.total_bids, %amount, "bid admitted");

        Ok(PlaceBidOutcome {
            previous_bid,
            previous_bidder_id,
            total_bids: entry.auction.total_bids,
        })
    }

    /// P2 — extend (anti-snipe).
    #[instrument(skip(self), fields(auction_id = %auction_id))]
    pub fn extend(
        &self,
        auction_id: Uuid,
        server_time: DateTime<Utc>,
        threshold_secs: i64,
        duration_secs: i64,
    ) -> Result<ExtendOutcome, ExtendError> {
        let entry_arc = self.entries.get(&auction_id).ok_or(ExtendError::NotFound)?.clone();
        let mut entry = entry_arc.lock();

        if !entry.auction.status.is_active() {
            return Err(ExtendError::NotActive);
        }

        let remaining = (entry.auction.end_time - server_time).num_seconds();
        if remaining > 0 && remaining <= threshold_secs {
            let old_end_time = entry.auction.end_time;
            let new_end_time = old_end_time + chrono::Duration::seconds(duration_secs);
            entry.auction.end_time = new_end_time;
            entry.auction.updated_at = server_time;

            let mut index = self.active_index.lock();
            index.remove(&(old_end_time, auction_id));
            index.insert((new_end_time, auction_id));

            Ok(ExtendOutcome {
                extended: true,
                old_end_time,
                new_end_time,
                extended_by_secs: duration_secs,
                time_remaining_secs: (new_end_time - server_time).num_seconds(),
            })
        } else {
            Ok(ExtendOutcome {
                extended: false,
                old_end_time: entry.auction.end_time,
                new_end_time: entry.auction.end_time,
                extended_by_secs: 0,
                time_remaining_secs: remaining.max(0),
            })
        }
    }

    /// P3 — finalize. Idempotent: every call after the first winning one
    /// observes `AlreadyFinal`.
    #[instrument(skip(self), fields(auction_id = %auction_id))]
    pub fn finalize(&self, auction_id: Uuid, server_time: DateTime<Utc>) -> Result<FinalizeOutcome, FinalizeError> {
        let entry_arc = self.entries.get(&auction_id).ok_or(FinalizeError::NotFound)?.clone();
        let mut entry = entry_arc.lock();

        if entry.auction.status.is_terminal() {
            return Err(FinalizeError::AlreadyFinal);
        }
        if server_time < entry.auction.end_time {
            return Err(FinalizeError::NotEnded);
        }

        entry.auction.status = AuctionStatus::Ended;
        entry.auction.updated_at = server_time;
        self.active_index.lock().remove(&(entry.auction.end_time, auction_id));
        entry.retain_until = Some(server_time + self.retention);

        let outcome = FinalizeOutcome {
            winner_id: entry.auction.highest_bidder_id,
            winning_bid: (entry.auction.total_bids > 0).then_some(entry.auction.current_bid),
            total_bids: entry.auction.total_bids,
            end_time: entry.auction.end_time,
        };

        self.schedule_retention_sweep(auction_id, entry.retain_until.unwrap());
        Ok(outcome)
    }

    /// Spawns the one-shot sweep that evicts a finalized auction's hot
    /// record after its retention window and notifies the expiry channel
    /// (Trigger B). `HotStore` itself holds no runtime handle, so the caller
    /// is expected to run on a Tokio context (true for every primitive call
    /// in this service).
    fn schedule_retention_sweep(&self, auction_id: Uuid, retain_until: DateTime<Utc>) {
        let entries = self.entries.clone();
        let expiry_tx = self.expiry_tx.clone();
        tokio::spawn(async move {
            let now = Utc::now();
            let delay = (retain_until - now).to_std().unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(delay).await;
            entries.remove(&auction_id);
            let _ = expiry_tx.send(auction_id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store() -> (HotStore, mpsc::UnboundedReceiver<Uuid>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HotStore::new(86_400, tx), rx)
    }

    fn auction(seller: Uuid, end_time: DateTime<Utc>) -> Auction {
        let now = Utc::now();
        let mut a = Auction::new_scheduled(Uuid::new_v4(), seller, dec!(100.00), dec!(5.00), None, now, end_time, now);
        a.status = AuctionStatus::Active;
        a
    }

    #[test]
    fn not_found_before_insert() {
        let (store, _rx) = store();
        let err = store
            .place_bid(Uuid::new_v4(), dec!(100.00), Uuid::new_v4(), Utc::now(), None)
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::NotFound));
    }

    #[test]
    fn first_bid_at_starting_price_is_accepted() {
        let (store, _rx) = store();
        let seller = Uuid::new_v4();
        let end_time = Utc::now() + chrono::Duration::hours(1);
        let a = auction(seller, end_time);
        let id = a.id;
        store.insert_if_absent(a);

        let bidder = Uuid::new_v4();
        let outcome = store.place_bid(id, dec!(100.00), bidder, Utc::now(), None).unwrap();
        assert_eq!(outcome.total_bids, 1);
        assert_eq!(outcome.previous_bid, dec!(100.00));
        assert_eq!(store.get(id).unwrap().current_bid, dec!(100.00));
    }

    #[test]
    fn strict_increment_rejects_equal_amount() {
        let (store, _rx) = store();
        let seller = Uuid::new_v4();
        let end_time = Utc::now() + chrono::Duration::hours(1);
        let a = auction(seller, end_time);
        let id = a.id;
        store.insert_if_absent(a);

        store.place_bid(id, dec!(100.00), Uuid::new_v4(), Utc::now(), None).unwrap();
        let err = store
            .place_bid(id, dec!(100.00), Uuid::new_v4(), Utc::now(), None)
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::TooLow(_)));

        // Exactly current + increment is accepted.
        let ok = store.place_bid(id, dec!(105.00), Uuid::new_v4(), Utc::now(), None).unwrap();
        assert_eq!(ok.total_bids, 2);

        // One cent below current + increment is rejected.
        let err = store
            .place_bid(id, dec!(109.99), Uuid::new_v4(), Utc::now(), None)
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::TooLow(_)));
    }

    #[test]
    fn seller_cannot_bid_on_own_auction() {
        let (store, _rx) = store();
        let seller = Uuid::new_v4();
        let end_time = Utc::now() + chrono::Duration::hours(1);
        let a = auction(seller, end_time);
        let id = a.id;
        store.insert_if_absent(a);

        let err = store.place_bid(id, dec!(100.00), seller, Utc::now(), None).unwrap_err();
        assert!(matches!(err, PlaceBidError::SellerCannotBid));
    }

    #[test]
    fn bid_at_or_after_end_time_is_rejected() {
        let (store, _rx) = store();
        let seller = Uuid::new_v4();
        let end_time = Utc::now() + chrono::Duration::seconds(10);
        let a = auction(seller, end_time);
        let id = a.id;
        store.insert_if_absent(a);

        let err = store.place_bid(id, dec!(100.00), Uuid::new_v4(), end_time, None).unwrap_err();
        assert!(matches!(err, PlaceBidError::Ended));
    }

    #[test]
    fn extension_pushes_end_time_and_reschedules_index() {
        let (store, _rx) = store();
        let seller = Uuid::new_v4();
        let now = Utc::now();
        let end_time = now + chrono::Duration::seconds(20);
        let a = auction(seller, end_time);
        let id = a.id;
        store.insert_if_absent(a);

        let outcome = store.extend(id, now, 30, 30).unwrap();
        assert!(outcome.extended);
        assert_eq!(outcome.new_end_time, end_time + chrono::Duration::seconds(30));
        assert_eq!(store.get(id).unwrap().end_time, outcome.new_end_time);
    }

    #[test]
    fn extension_is_a_noop_outside_threshold() {
        let (store, _rx) = store();
        let seller = Uuid::new_v4();
        let now = Utc::now();
        let end_time = now + chrono::Duration::hours(1);
        let a = auction(seller, end_time);
        let id = a.id;
        store.insert_if_absent(a);

        let outcome = store.extend(id, now, 30, 30).unwrap();
        assert!(!outcome.extended);
        assert_eq!(outcome.new_end_time, end_time);
    }

    #[test]
    fn finalize_is_exactly_once() {
        let (store, _rx) = store();
        let seller = Uuid::new_v4();
        let end_time = Utc::now();
        let a = auction(seller, end_time);
        let id = a.id;
        store.insert_if_absent(a);

        let outcome = store.finalize(id, end_time).unwrap();
        assert_eq!(outcome.total_bids, 0);
        assert_eq!(outcome.winner_id, None);

        let err = store.finalize(id, end_time).unwrap_err();
        assert!(matches!(err, FinalizeError::AlreadyFinal));
    }

    #[test]
    fn finalize_before_end_time_is_rejected() {
        let (store, _rx) = store();
        let seller = Uuid::new_v4();
        let end_time = Utc::now() + chrono::Duration::hours(1);
        let a = auction(seller, end_time);
        let id = a.id;
        store.insert_if_absent(a);

        let err = store.finalize(id, Utc::now()).unwrap_err();
        assert!(matches!(err, FinalizeError::NotEnded));
    }

    #[test]
    fn insert_if_absent_put_if_absent_semantics() {
        let (store, _rx) = store();
        let a1 = auction(Uuid::new_v4(), Utc::now() + chrono::Duration::hours(1));
        let id = a1.id;
        assert!(store.insert_if_absent(a1));

        let mut a2 = auction(Uuid::new_v4(), Utc::now() + chrono::Duration::hours(2));
        a2.id = id;
        assert!(!store.insert_if_absent(a2));
    }
}

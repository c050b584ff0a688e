//! Fan-out Bus (C6).
//!
//! One broadcast channel per auction "room". Publishers never block on slow
//! subscribers — `tokio::sync::broadcast` drops the oldest frame for a lagging
//! receiver rather than backing up the whole auction, which is the right
//! trade for a best-effort live feed sitting on top of an authoritative poll
//! path (the gateway always re-fetches `HotStore::get` on join).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const ROOM_CAPACITY: usize = 256;

/// The bid fields carried by a room-broadcast `UpdateBid` event, matching
/// the `bid:{amount, bidderId, bidderUsername, timestamp, totalBids}`
/// nested shape the gateway renders onto the wire.
#[derive(Debug, Clone, Serialize)]
pub struct BidFields {
    pub amount: Decimal,
    pub bidder_id: Uuid,
    pub bidder_username: String,
    pub timestamp: DateTime<Utc>,
    pub total_bids: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    UpdateBid {
        auction_id: Uuid,
        bid: BidFields,
    },
    AuctionExtended {
        auction_id: Uuid,
        old_end_time: DateTime<Utc>,
        new_end_time: DateTime<Utc>,
    },
    AuctionEnded {
        auction_id: Uuid,
        winner_id: Option<Uuid>,
        winning_bid: Option<Decimal>,
    },
}

impl Event {
    pub fn auction_id(&self) -> Uuid {
        match self {
            Event::UpdateBid { auction_id, .. } => *auction_id,
            Event::AuctionExtended { auction_id, .. } => *auction_id,
            Event::AuctionEnded { auction_id, .. } => *auction_id,
        }
    }
}

/// Per-auction publish/subscribe rooms, created lazily on first use and
/// reaped once the last handle to a room drops.
pub struct FanoutBus {
    rooms: DashMap<Uuid, broadcast::Sender<Event>>,
}

impl Default for FanoutBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutBus {
    pub fn new() -> Self {
        Self { rooms: DashMap::new() }
    }

    pub fn subscribe(&self, auction_id: Uuid) -> broadcast::Receiver<Event> {
        self.rooms
            .entry(auction_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Publish is a no-op when nobody is listening: `send` only fails when
    /// the receiver count is zero, which is an expected steady state between
    /// bids on a quiet auction.
    pub fn publish(&self, event: Event) {
        if let Some(sender) = self.rooms.get(&event.auction_id()) {
            let _ = sender.send(event);
        }
    }

    /// Drop the room once an auction is finalized; any joiner afterward gets
    /// a fresh empty room rather than replaying stale history.
    pub fn close_room(&self, auction_id: Uuid) {
        self.rooms.remove(&auction_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = FanoutBus::new();
        bus.publish(Event::UpdateBid {
            auction_id: Uuid::new_v4(),
            bid: BidFields {
                amount: Decimal::new(100, 0),
                bidder_id: Uuid::new_v4(),
                bidder_username: "alice".into(),
                timestamp: Utc::now(),
                total_bids: 1,
            },
        });
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = FanoutBus::new();
        let auction_id = Uuid::new_v4();
        let mut rx = bus.subscribe(auction_id);
        bus.publish(Event::AuctionExtended {
            auction_id,
            old_end_time: Utc::now(),
            new_end_time: Utc::now(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.auction_id(), auction_id);
    }

    #[tokio::test]
    async fn events_for_other_rooms_are_not_delivered() {
        let bus = FanoutBus::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx = bus.subscribe(a);
        bus.publish(Event::AuctionExtended {
            auction_id: b,
            old_end_time: Utc::now(),
            new_end_time: Utc::now(),
        });
        assert!(rx.try_recv().is_err());
    }
}

//! Wire message shapes for the `/ws` gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WireError;
use crate::fanout::Event as FanoutEvent;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    AuctionJoin { auction_id: Uuid },
    AuctionLeave { auction_id: Uuid },
    BidPlaced { auction_id: Uuid, amount: Decimal },
}

/// The nested bid payload carried by both `BID_ACCEPTED` and `UPDATE_BID`.
/// Field names match the wire contract exactly, independent of the Rust
/// naming used elsewhere in this enum.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidInfo {
    pub amount: Decimal,
    pub bidder_id: Uuid,
    pub bidder_username: String,
    pub timestamp: DateTime<Utc>,
    pub total_bids: i64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    ServerTime { now: DateTime<Utc> },
    AuctionJoined { auction_id: Uuid },
    BidAccepted { auction_id: Uuid, bid: BidInfo },
    BidRejected { auction_id: Uuid, error: WireError },
    UpdateBid { auction_id: Uuid, bid: BidInfo },
    AuctionExtended { auction_id: Uuid, old_end_time: DateTime<Utc>, new_end_time: DateTime<Utc> },
    AuctionEnded { auction_id: Uuid, winner_id: Option<Uuid>, winning_bid: Option<Decimal> },
    Error { error: WireError },
}

impl From<FanoutEvent> for ServerMessage {
    fn from(event: FanoutEvent) -> Self {
        match event {
            FanoutEvent::UpdateBid { auction_id, bid } => ServerMessage::UpdateBid {
                auction_id,
                bid: BidInfo {
                    amount: bid.amount,
                    bidder_id: bid.bidder_id,
                    bidder_username: bid.bidder_username,
                    timestamp: bid.timestamp,
                    total_bids: bid.total_bids,
                },
            },
            FanoutEvent::AuctionExtended { auction_id, old_end_time, new_end_time } => {
                ServerMessage::AuctionExtended { auction_id, old_end_time, new_end_time }
            }
            FanoutEvent::AuctionEnded { auction_id, winner_id, winning_bid } => {
                ServerMessage::AuctionEnded { auction_id, winner_id, winning_bid }
            }
        }
    }
}

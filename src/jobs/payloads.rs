//! JSON payload shapes stored in `jobs.payload`. Kept separate from the
//! handlers so the wire shape of a queued job is easy to audit without
//! reading the execution logic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistBidPayload {
    pub bid_id: Uuid,
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: Decimal,
    pub previous_bid: Decimal,
    pub bid_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateMirrorPayload {
    pub auction_id: Uuid,
    pub current_bid: Decimal,
    pub highest_bidder_id: Option<Uuid>,
    pub total_bids: i64,
    pub end_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FinalizePayload {
    pub auction_id: Uuid,
    pub current_bid: Decimal,
    pub highest_bidder_id: Option<Uuid>,
    pub total_bids: i64,
    pub end_time: DateTime<Utc>,
}

//! `sqlx::FromRow` projections of the cold-store tables.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::auction::AuctionStatus;
use crate::models::Auction;

#[derive(Debug, sqlx::FromRow)]
pub struct AuctionRow {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub starting_price: Decimal,
    pub bid_increment: Decimal,
    pub reserve_price: Option<Decimal>,
    pub current_bid: Decimal,
    pub highest_bidder_id: Option<Uuid>,
    pub total_bids: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub original_end_time: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuctionRow {
    pub fn into_auction(self) -> Auction {
        Auction {
            id: self.id,
            seller_id: self.seller_id,
            starting_price: self.starting_price,
            bid_increment: self.bid_increment,
            reserve_price: self.reserve_price,
            current_bid: self.current_bid,
            highest_bidder_id: self.highest_bidder_id,
            total_bids: self.total_bids,
            start_time: self.start_time,
            end_time: self.end_time,
            original_end_time: self.original_end_time,
            status: parse_status(&self.status),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub fn parse_status(s: &str) -> AuctionStatus {
    match s {
        "draft" => AuctionStatus::Draft,
        "scheduled" => AuctionStatus::Scheduled,
        "active" => AuctionStatus::Active,
        "ended" => AuctionStatus::Ended,
        "cancelled" => AuctionStatus::Cancelled,
        other => unreachable!("unknown auction status persisted: {other}"),
    }
}

pub fn status_str(status: AuctionStatus) -> &'static str {
    match status {
        AuctionStatus::Draft => "draft",
        AuctionStatus::Scheduled => "scheduled",
        AuctionStatus::Active => "active",
        AuctionStatus::Ended => "ended",
        AuctionStatus::Cancelled => "cancelled",
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct BidRow {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: Decimal,
    pub bid_time: DateTime<Utc>,
    pub previous_bid: Decimal,
    pub is_winning: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

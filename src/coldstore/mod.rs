//! Cold Store Adapter (C2).
//!
//! Append-only bid log plus mirrored auction rows in PostgreSQL. The `bids`
//! table is never updated or deleted from this adapter; mirror writes to
//! `auctions` are conditional on `status = 'active'` except the finalize
//! write, which performs the `active -> ended` transition itself.

pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ToWireError;
use crate::models::auction::AuctionStatus;
use crate::models::Auction;
use schema::{status_str, AuctionRow, BidRow};

/// The cold-store read surface the Finalization Coordinator (crash-recovery)
/// and Bid Admission Service (lazy hydration) depend on. Factored out as a
/// trait, matching the teacher's `PaymentGateway`-style seam, so those two
/// call sites can be exercised against an in-memory fake instead of a live
/// Postgres instance.
#[async_trait]
pub trait AuctionSource: Send + Sync {
    async fn load_auction(&self, auction_id: Uuid) -> Result<Option<Auction>, ColdStoreError>;
    async fn load_active_auctions(&self) -> Result<Vec<Auction>, ColdStoreError>;
}

#[async_trait]
impl AuctionSource for ColdStore {
    async fn load_auction(&self, auction_id: Uuid) -> Result<Option<Auction>, ColdStoreError> {
        ColdStore::load_auction(self, auction_id).await
    }

    async fn load_active_auctions(&self) -> Result<Vec<Auction>, ColdStoreError> {
        ColdStore::load_active_auctions(self).await
    }
}

#[derive(Debug, Error)]
pub enum ColdStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ToWireError for ColdStoreError {
    fn wire_code(&self) -> &'static str {
        "STORAGE_ERROR"
    }
}

pub struct ColdStore {
    pool: PgPool,
}

impl ColdStore {
    pub async fn connect(connection_string: &str) -> Result<Self, ColdStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[tracing::instrument(skip(self, auction))]
    pub async fn insert_auction(&self, auction: &Auction) -> Result<(), ColdStoreError> {
        sqlx::query(
            r#"
            INSERT INTO auctions (
                id, seller_id, starting_price, bid_increment, reserve_price,
                current_bid, highest_bidder_id, total_bids,
                start_time, end_time, original_end_time, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(auction.id)
        .bind(auction.seller_id)
        .bind(auction.starting_price)
        .bind(auction.bid_increment)
        .bind(auction.reserve_price)
        .bind(auction.current_bid)
        .bind(auction.highest_bidder_id)
        .bind(auction.total_bids)
        .bind(auction.start_time)
        .bind(auction.end_time)
        .bind(auction.original_end_time)
        .bind(status_str(auction.status))
        .bind(auction.created_at)
        .bind(auction.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_auction(&self, auction_id: Uuid) -> Result<Option<Auction>, ColdStoreError> {
        let row = sqlx::query_as::<_, AuctionRow>("SELECT * FROM auctions WHERE id = $1")
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AuctionRow::into_auction))
    }

    /// Every auction still `status = 'active'` as of the last cold-store
    /// write, used by the Finalization Coordinator's crash-recovery sweep.
    #[tracing::instrument(skip(self))]
    pub async fn load_active_auctions(&self) -> Result<Vec<Auction>, ColdStoreError> {
        let rows = sqlx::query_as::<_, AuctionRow>("SELECT * FROM auctions WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AuctionRow::into_auction).collect())
    }

    /// Idempotent append. A duplicate primary key (redelivery of the same
    /// `persist-bid` job) is treated as success, not an error.
    #[tracing::instrument(skip(self, bid))]
    pub async fn insert_bid(&self, bid: &BidRow) -> Result<(), ColdStoreError> {
        sqlx::query(
            r#"
            INSERT INTO bids (
                id, auction_id, bidder_id, amount, bid_time, previous_bid,
                is_winning, ip_address, user_agent
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(bid.id)
        .bind(bid.auction_id)
        .bind(bid.bidder_id)
        .bind(bid.amount)
        .bind(bid.bid_time)
        .bind(bid.previous_bid)
        .bind(bid.is_winning)
        .bind(&bid.ip_address)
        .bind(&bid.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn bid_count(&self, auction_id: Uuid) -> Result<i64, ColdStoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bids WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Mirror a live bid outcome into the `auctions` row. Guarded so an
    /// ended auction is never resurrected by a stale, reordered job.
    #[tracing::instrument(skip(self))]
    pub async fn update_auction_mirror(
        &self,
        auction_id: Uuid,
        current_bid: Decimal,
        highest_bidder_id: Option<Uuid>,
        total_bids: i64,
        end_time: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ColdStoreError> {
        sqlx::query(
            r#"
            UPDATE auctions
            SET current_bid = $2, highest_bidder_id = $3, total_bids = $4,
                end_time = $5, updated_at = $6
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(auction_id)
        .bind(current_bid)
        .bind(highest_bidder_id)
        .bind(total_bids)
        .bind(end_time)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The finalization write: the one mirror update allowed to move an
    /// auction out of `active`. Idempotent — redelivery leaves the same row.
    #[tracing::instrument(skip(self))]
    pub async fn finalize_mirror(
        &self,
        auction_id: Uuid,
        current_bid: Decimal,
        highest_bidder_id: Option<Uuid>,
        total_bids: i64,
        end_time: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ColdStoreError> {
        sqlx::query(
            r#"
            UPDATE auctions
            SET status = $2, current_bid = $3, highest_bidder_id = $4,
                total_bids = $5, end_time = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(auction_id)
        .bind(status_str(AuctionStatus::Ended))
        .bind(current_bid)
        .bind(highest_bidder_id)
        .bind(total_bids)
        .bind(end_time)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_auctions(&self, status: Option<AuctionStatus>, page: i64, per_page: i64) -> Result<Vec<Auction>, ColdStoreError> {
        let offset = page.max(0) * per_page.max(1);
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, AuctionRow>(
                    "SELECT * FROM auctions WHERE status = $1 ORDER BY end_time ASC LIMIT $2 OFFSET $3",
                )
                .bind(status_str(status))
                .bind(per_page)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, AuctionRow>("SELECT * FROM auctions ORDER BY end_time ASC LIMIT $1 OFFSET $2")
                    .bind(per_page)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(AuctionRow::into_auction).collect())
    }
}

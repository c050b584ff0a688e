//! Handlers for the three job queues. Each is idempotent against redelivery:
//! `persist-bid` and `finalize-auction` rely on the cold store's
//! `ON CONFLICT` / unconditional-overwrite semantics, `update-auction-mirror`
//! is guarded so a stale write can never resurrect an ended auction.

use async_trait::async_trait;
use std::sync::Arc;

use crate::coldstore::schema::BidRow;
use crate::coldstore::ColdStore;
use crate::models::job::Job;

use super::payloads::{FinalizePayload, PersistBidPayload, UpdateMirrorPayload};
use super::{JobError, JobHandler};

pub struct PersistBidHandler {
    pub cold: Arc<ColdStore>,
}

#[async_trait]
impl JobHandler for PersistBidHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let payload: PersistBidPayload = serde_json::from_value(job.payload.clone())?;
        let row = BidRow {
            id: payload.bid_id,
            auction_id: payload.auction_id,
            bidder_id: payload.bidder_id,
            amount: payload.amount,
            bid_time: payload.bid_time,
            previous_bid: payload.previous_bid,
            is_winning: true,
            ip_address: payload.ip_address,
            user_agent: payload.user_agent,
        };
        self.cold.insert_bid(&row).await?;
        Ok(())
    }
}

pub struct UpdateMirrorHandler {
    pub cold: Arc<ColdStore>,
}

#[async_trait]
impl JobHandler for UpdateMirrorHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let payload: UpdateMirrorPayload = serde_json::from_value(job.payload.clone())?;
        self.cold
            .update_auction_mirror(
                payload.auction_id,
                payload.current_bid,
                payload.highest_bidder_id,
                payload.total_bids,
                payload.end_time,
                payload.updated_at,
            )
            .await?;
        Ok(())
    }
}

pub struct FinalizeHandler {
    pub cold: Arc<ColdStore>,
}

#[async_trait]
impl JobHandler for FinalizeHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let payload: FinalizePayload = serde_json::from_value(job.payload.clone())?;
        self.cold
            .finalize_mirror(
                payload.auction_id,
                payload.current_bid,
                payload.highest_bidder_id,
                payload.total_bids,
                payload.end_time,
                payload.end_time,
            )
            .await?;
        Ok(())
    }
}

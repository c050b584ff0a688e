//! Bid Admission Service (C3).
//!
//! The single entry point a bid takes on its way into the system: rate gate,
//! the atomic hot-store placement (P1), lazy hydration of a cold auction the
//! hot store hasn't seen yet, the anti-sniping extension policy (C4), durable
//! write-down (C8), and publication to the fan-out bus (C6). Everything here
//! is orchestration — the only state mutation is `HotStore::place_bid`.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::coldstore::AuctionSource;
use crate::error::ToWireError;
use crate::extension::ExtensionPolicy;
use crate::fanout::{BidFields, Event, FanoutBus};
use crate::finalization::FinalizationCoordinator;
use crate::hotstore::errors::PlaceBidError;
use crate::hotstore::{HotStore, PlaceBidOutcome};
use crate::jobs::{job_key_for_bid, job_key_for_mirror, JobRunner};
use crate::models::job::{Job, JobQueue};
use crate::ratelimit::RateGate;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("bid rate exceeded for this bidder on this auction")]
    RateLimited,
    #[error(transparent)]
    PlaceBid(#[from] PlaceBidError),
}

impl ToWireError for AdmissionError {
    fn wire_code(&self) -> &'static str {
        match self {
            AdmissionError::RateLimited => "RATE_LIMITED",
            AdmissionError::PlaceBid(err) => err.wire_code(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AdmissionError::RateLimited => None,
            AdmissionError::PlaceBid(err) => err.details(),
        }
    }
}

pub struct BidAttempt {
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub bidder_username: String,
    pub amount: Decimal,
    pub server_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct BidAdmissionService {
    hot: Arc<HotStore>,
    cold: Arc<dyn AuctionSource>,
    jobs: Arc<JobRunner>,
    fanout: Arc<FanoutBus>,
    finalization: Arc<FinalizationCoordinator>,
    rate_gate: RateGate,
    extension_policy: ExtensionPolicy,
}

impl BidAdmissionService {
    pub fn new(
        hot: Arc<HotStore>,
        cold: Arc<dyn AuctionSource>,
        jobs: Arc<JobRunner>,
        fanout: Arc<FanoutBus>,
        finalization: Arc<FinalizationCoordinator>,
        rate_gate: RateGate,
        extension_policy: ExtensionPolicy,
    ) -> Self {
        Self {
            hot,
            cold,
            jobs,
            fanout,
            finalization,
            rate_gate,
            extension_policy,
        }
    }

    #[tracing::instrument(skip(self, attempt), fields(auction_id = %attempt.auction_id, bidder_id = %attempt.bidder_id))]
    pub async fn place_bid(&self, attempt: BidAttempt) -> Result<PlaceBidOutcome, AdmissionError> {
        if !self.rate_gate.try_acquire(attempt.bidder_id) {
            return Err(AdmissionError::RateLimited);
        }

        let outcome = match self.try_place(&attempt).await {
            Ok(outcome) => outcome,
            Err(PlaceBidError::NotFound) => {
                self.hydrate_from_cold(attempt.auction_id).await?;
                self.try_place(&attempt).await?
            }
            Err(other) => return Err(other.into()),
        };

        self.write_down_and_publish(&attempt, &outcome).await;
        Ok(outcome)
    }

    async fn try_place(&self, attempt: &BidAttempt) -> Result<PlaceBidOutcome, PlaceBidError> {
        self.hot.place_bid(attempt.auction_id, attempt.amount, attempt.bidder_id, attempt.server_time, None)
    }

    /// One-shot lazy hydration: an auction the admission-policy/catalogue
    /// layer created in the cold store may not have reached the hot store's
    /// in-memory index yet (e.g. after a restart, before crash-recovery gets
    /// to it). Pull it in once and let the caller retry.
    async fn hydrate_from_cold(&self, auction_id: Uuid) -> Result<(), AdmissionError> {
        let auction = self
            .cold
            .load_auction(auction_id)
            .await
            .map_err(|_| AdmissionError::PlaceBid(PlaceBidError::NotFound))?;
        match auction {
            Some(auction) if auction.status.is_active() => {
                let end_time = auction.end_time;
                self.hot.insert_if_absent(auction);
                FinalizationCoordinator::schedule(&self.finalization, auction_id, end_time);
                Ok(())
            }
            _ => Err(AdmissionError::PlaceBid(PlaceBidError::NotFound)),
        }
    }

    async fn write_down_and_publish(&self, attempt: &BidAttempt, outcome: &PlaceBidOutcome) {
        let bid_id = Uuid::new_v4();
        let persist_payload = serde_json::json!({
            "bid_id": bid_id,
            "auction_id": attempt.auction_id,
            "bidder_id": attempt.bidder_id,
            "amount": attempt.amount,
            "previous_bid": outcome.previous_bid,
            "bid_time": attempt.server_time,
            "ip_address": attempt.ip_address,
            "user_agent": attempt.user_agent,
        });
        let persist_job = Job::new(
            job_key_for_bid(attempt.auction_id, attempt.bidder_id, attempt.server_time),
            JobQueue::PersistBid,
            persist_payload,
            attempt.server_time,
        );
        if let Err(err) = self.jobs.enqueue(persist_job).await {
            warn!(?err, "failed to enqueue persist-bid job");
        }

        let extend_outcome = self.extension_policy.apply(&self.hot, attempt.auction_id, attempt.server_time).ok();
        let extended = extend_outcome.as_ref().map(|e| e.extended).unwrap_or(false);

        let Some(current) = self.hot.get(attempt.auction_id) else {
            return;
        };

        let mirror_payload = serde_json::json!({
            "auction_id": attempt.auction_id,
            "current_bid": current.current_bid,
            "highest_bidder_id": current.highest_bidder_id,
            "total_bids": current.total_bids,
            "end_time": current.end_time,
            "updated_at": current.updated_at,
        });
        let mirror_job = Job::new(
            job_key_for_mirror(attempt.auction_id, outcome.total_bids),
            JobQueue::UpdateAuctionMirror,
            mirror_payload,
            attempt.server_time,
        );
        if let Err(err) = self.jobs.enqueue(mirror_job).await {
            warn!(?err, "failed to enqueue update-auction-mirror job");
        }

        self.fanout.publish(Event::UpdateBid {
            auction_id: attempt.auction_id,
            bid: BidFields {
                amount: attempt.amount,
                bidder_id: attempt.bidder_id,
                bidder_username: attempt.bidder_username.clone(),
                timestamp: attempt.server_time,
                total_bids: current.total_bids,
            },
        });

        if extended {
            if let Some(extend_outcome) = extend_outcome {
                self.fanout.publish(Event::AuctionExtended {
                    auction_id: attempt.auction_id,
                    old_end_time: extend_outcome.old_end_time,
                    new_end_time: extend_outcome.new_end_time,
                });
                FinalizationCoordinator::schedule(&self.finalization, attempt.auction_id, extend_outcome.new_end_time);
                info!(auction_id = %attempt.auction_id, new_end_time = %extend_outcome.new_end_time, "auction extended by anti-sniping policy");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuctionSettings;
    use crate::coldstore::ColdStoreError;
    use crate::models::AuctionStatus;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct FakeColdStore {
        auctions: Mutex<Vec<crate::models::Auction>>,
    }

    #[async_trait::async_trait]
    impl AuctionSource for FakeColdStore {
        async fn load_auction(&self, auction_id: Uuid) -> Result<Option<crate::models::Auction>, ColdStoreError> {
            Ok(self.auctions.lock().unwrap().iter().find(|a| a.id == auction_id).cloned())
        }

        async fn load_active_auctions(&self) -> Result<Vec<crate::models::Auction>, ColdStoreError> {
            Ok(self.auctions.lock().unwrap().iter().filter(|a| a.status.is_active()).cloned().collect())
        }
    }

    fn unreachable_job_runner() -> Arc<JobRunner> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://127.0.0.1:1/liveauction_test_fixture")
            .expect("lazy pool construction never connects eagerly");
        Arc::new(JobRunner::new(pool))
    }

    fn cold_only_active_auction() -> (crate::models::Auction, Uuid, DateTime<Utc>) {
        let now = Utc::now();
        let end_time = now + chrono::Duration::hours(1);
        let mut auction =
            crate::models::Auction::new_scheduled(Uuid::new_v4(), Uuid::new_v4(), dec!(100.00), dec!(5.00), None, now, end_time, now);
        auction.status = AuctionStatus::Active;
        let id = auction.id;
        (auction, id, now)
    }

    fn build_service(auction: crate::models::Auction) -> (Arc<BidAdmissionService>, Arc<HotStore>, Arc<FanoutBus>) {
        let cold: Arc<dyn AuctionSource> = Arc::new(FakeColdStore { auctions: Mutex::new(vec![auction]) });
        let (expiry_tx, _expiry_rx) = tokio::sync::mpsc::unbounded_channel();
        let hot = Arc::new(HotStore::new(86_400, expiry_tx));
        let fanout = Arc::new(FanoutBus::new());
        let jobs = unreachable_job_runner();
        let finalization = Arc::new(FinalizationCoordinator::new(hot.clone(), cold.clone(), fanout.clone(), jobs.clone()));
        let service = Arc::new(BidAdmissionService::new(
            hot.clone(),
            cold,
            jobs,
            fanout.clone(),
            finalization,
            RateGate::new(1),
            ExtensionPolicy::from_settings(&AuctionSettings::default()),
        ));
        (service, hot, fanout)
    }

    #[tokio::test]
    async fn lazy_hydration_admits_a_bid_the_hot_store_has_not_seen_yet() {
        let (auction, auction_id, now) = cold_only_active_auction();
        let (service, hot, _fanout) = build_service(auction);

        assert!(hot.get(auction_id).is_none(), "hot store must start without this auction");

        let attempt = BidAttempt {
            auction_id,
            bidder_id: Uuid::new_v4(),
            bidder_username: "alice".into(),
            amount: dec!(100.00),
            server_time: now,
            ip_address: None,
            user_agent: None,
        };
        let outcome = service.place_bid(attempt).await.expect("NOT_FOUND must hydrate and retry once, then succeed");
        assert_eq!(outcome.total_bids, 1);
        assert!(hot.get(auction_id).is_some(), "hydration must leave the auction resident in the hot store");
    }

    #[tokio::test]
    async fn concurrent_hydration_race_has_exactly_one_winner_and_no_spurious_not_found() {
        let (auction, auction_id, now) = cold_only_active_auction();
        let (service, hot, _fanout) = build_service(auction);

        let svc_a = service.clone();
        let svc_b = service.clone();
        let attempt_a = BidAttempt {
            auction_id,
            bidder_id: Uuid::new_v4(),
            bidder_username: "alice".into(),
            amount: dec!(100.00),
            server_time: now,
            ip_address: None,
            user_agent: None,
        };
        let attempt_b = BidAttempt {
            auction_id,
            bidder_id: Uuid::new_v4(),
            bidder_username: "bob".into(),
            amount: dec!(200.00),
            server_time: now,
            ip_address: None,
            user_agent: None,
        };

        let (result_a, result_b) = tokio::join!(svc_a.place_bid(attempt_a), svc_b.place_bid(attempt_b));

        // Both bids must have reached P1 past hydration: neither is allowed to
        // still see NOT_FOUND. Whichever lands second may legitimately lose on
        // price (monotonic-price invariant), never on a failed hydration.
        for result in [&result_a, &result_b] {
            if let Err(err) = result {
                assert!(
                    matches!(err, AdmissionError::PlaceBid(PlaceBidError::TooLow(_))),
                    "a race loser must fail on price, not on hydration: {err:?}"
                );
            }
        }
        let accepted = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
        assert!(accepted >= 1);

        // insert_if_absent put-if-absent semantics: exactly one hydrated copy
        // ever lands in the hot store, never two racing inserts.
        let final_state = hot.get(auction_id).expect("hydration must have installed the auction exactly once");
        assert_eq!(final_state.total_bids as usize, accepted);
    }
}

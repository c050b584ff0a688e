//! Finalization Coordinator (C5).
//!
//! Drives every auction to its terminal state exactly once, observably,
//! through two independent triggers that both call the same idempotent
//! `HotStore::finalize`:
//!
//! - Trigger A: a scheduled timer set for `end_time` when the auction is
//!   admitted (or recovered after a restart).
//! - Trigger B: the hot store's own retention sweep, which fires
//!   `expiry_tx` once an entry ages out — a backstop for the case where
//!   Trigger A's task was lost (e.g. process restarted between schedule and
//!   fire, before crash-recovery re-armed it).
//!
//! Crash-recovery on startup re-arms Trigger A for every auction the cold
//! store still shows as `active`; any whose `end_time` has already passed
//! finalizes immediately instead of sleeping.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::coldstore::AuctionSource;
use crate::fanout::{Event, FanoutBus};
use crate::hotstore::HotStore;
use crate::jobs::{job_key_for_finalize, JobRunner};
use crate::models::job::{Job, JobQueue};

pub struct FinalizationCoordinator {
    hot: Arc<HotStore>,
    cold: Arc<dyn AuctionSource>,
    fanout: Arc<FanoutBus>,
    jobs: Arc<JobRunner>,
}

impl FinalizationCoordinator {
    pub fn new(hot: Arc<HotStore>, cold: Arc<dyn AuctionSource>, fanout: Arc<FanoutBus>, jobs: Arc<JobRunner>) -> Self {
        Self { hot, cold, fanout, jobs }
    }

    /// Trigger A. Sleeps until `end_time`, then finalizes. Safe to call more
    /// than once for the same auction — `finalize` is idempotent. Takes an
    /// explicit `Arc` handle (rather than `&self`) since the scheduled task
    /// must outlive the caller's borrow.
    pub fn schedule(coordinator: &Arc<Self>, auction_id: Uuid, end_time: chrono::DateTime<chrono::Utc>) {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let now = chrono::Utc::now();
            if end_time > now {
                let delay = (end_time - now).to_std().unwrap_or(std::time::Duration::ZERO);
                tokio::time::sleep(delay).await;
            }
            coordinator.finalize_auction(auction_id).await;
        });
    }

    /// Trigger B. Consumes the hot store's expiry channel for as long as the
    /// process runs.
    pub fn spawn_expiry_listener(coordinator: &Arc<Self>, mut expiry_rx: mpsc::UnboundedReceiver<Uuid>) {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            while let Some(auction_id) = expiry_rx.recv().await {
                warn!(%auction_id, "hot-store retention sweep fired before scheduled timer; finalizing via backstop");
                coordinator.finalize_auction(auction_id).await;
            }
        });
    }

    #[tracing::instrument(skip(self))]
    pub async fn finalize_auction(&self, auction_id: Uuid) {
        let server_time = chrono::Utc::now();
        let outcome = match self.hot.finalize(auction_id, server_time) {
            Ok(outcome) => outcome,
            Err(crate::hotstore::errors::FinalizeError::AlreadyFinal) => return,
            Err(crate::hotstore::errors::FinalizeError::NotFound) => {
                warn!(%auction_id, "finalize triggered for an auction no longer in the hot store");
                return;
            }
            Err(crate::hotstore::errors::FinalizeError::NotEnded) => {
                error!(%auction_id, "finalize triggered before end_time; rescheduling");
                return;
            }
        };

        self.fanout.publish(Event::AuctionEnded {
            auction_id,
            winner_id: outcome.winner_id,
            winning_bid: outcome.winning_bid,
        });
        self.fanout.close_room(auction_id);

        let current_bid = self.hot.get(auction_id).map(|a| a.current_bid).unwrap_or_default();
        let payload = serde_json::json!({
            "auction_id": auction_id,
            "current_bid": current_bid,
            "highest_bidder_id": outcome.winner_id,
            "total_bids": outcome.total_bids,
            "end_time": outcome.end_time,
        });
        let job = Job::new(job_key_for_finalize(auction_id), JobQueue::FinalizeAuction, payload, server_time);
        if let Err(err) = self.jobs.enqueue(job).await {
            error!(?err, %auction_id, "failed to enqueue finalize-auction job");
        }

        info!(%auction_id, winner_id = ?outcome.winner_id, winning_bid = ?outcome.winning_bid, "auction finalized");
    }

    /// Re-arm every auction the cold store still shows as active. Called
    /// once at startup, before the gateway starts accepting connections.
    #[tracing::instrument(skip(coordinator))]
    pub async fn recover_on_startup(coordinator: &Arc<Self>) -> Result<usize, crate::coldstore::ColdStoreError> {
        let active = coordinator.cold.load_active_auctions().await?;
        let count = active.len();
        for auction in active {
            let end_time = auction.end_time;
            let auction_id = auction.id;
            coordinator.hot.insert_if_absent(auction);
            Self::schedule(coordinator, auction_id, end_time);
        }
        info!(recovered = count, "finalization coordinator recovered active auctions");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coldstore::ColdStoreError;
    use crate::models::{Auction, AuctionStatus};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct FakeColdStore {
        auctions: Mutex<Vec<Auction>>,
    }

    #[async_trait]
    impl AuctionSource for FakeColdStore {
        async fn load_auction(&self, auction_id: Uuid) -> Result<Option<Auction>, ColdStoreError> {
            Ok(self.auctions.lock().unwrap().iter().find(|a| a.id == auction_id).cloned())
        }

        async fn load_active_auctions(&self) -> Result<Vec<Auction>, ColdStoreError> {
            Ok(self.auctions.lock().unwrap().iter().filter(|a| a.status.is_active()).cloned().collect())
        }
    }

    /// A pool that never actually connects. Job-enqueue calls made against it
    /// fail fast and are logged, never block the test — `JobRunner` is not
    /// what these tests are exercising.
    fn unreachable_job_runner() -> Arc<JobRunner> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://127.0.0.1:1/liveauction_test_fixture")
            .expect("lazy pool construction never connects eagerly");
        Arc::new(JobRunner::new(pool))
    }

    #[tokio::test]
    async fn crash_recovery_finalizes_exactly_once_despite_dual_triggers() {
        let now = chrono::Utc::now();
        let end_time = now + chrono::Duration::milliseconds(120);
        let mut auction =
            Auction::new_scheduled(Uuid::new_v4(), Uuid::new_v4(), dec!(100.00), dec!(5.00), None, now, end_time, now);
        auction.status = AuctionStatus::Active;
        let auction_id = auction.id;

        let cold: Arc<dyn AuctionSource> = Arc::new(FakeColdStore { auctions: Mutex::new(vec![auction]) });
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        // Retention shorter than the margin below, so the hot store's own
        // retention sweep (Trigger B) also fires shortly after the scheduled
        // timer (Trigger A) finalizes — the two triggers race on purpose.
        let hot = Arc::new(HotStore::new(0, expiry_tx));
        let fanout = Arc::new(FanoutBus::new());
        let jobs = unreachable_job_runner();

        let coordinator = Arc::new(FinalizationCoordinator::new(hot.clone(), cold, fanout.clone(), jobs));
        let mut room = fanout.subscribe(auction_id);
        FinalizationCoordinator::spawn_expiry_listener(&coordinator, expiry_rx);

        let recovered = FinalizationCoordinator::recover_on_startup(&coordinator).await.unwrap();
        assert_eq!(recovered, 1);
        assert!(hot.get(auction_id).is_some(), "crash recovery must re-hydrate the active auction into the hot store");

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let first = room.try_recv().expect("expected exactly one AuctionEnded event");
        assert!(matches!(first, Event::AuctionEnded { auction_id: id, .. } if id == auction_id));
        assert!(
            room.try_recv().is_err(),
            "finalize must fire exactly once even though both triggers were armed for this auction"
        );
    }

    #[tokio::test]
    async fn recover_on_startup_finalizes_immediately_when_end_time_has_already_passed() {
        let now = chrono::Utc::now();
        let end_time = now - chrono::Duration::seconds(5);
        let mut auction =
            Auction::new_scheduled(Uuid::new_v4(), Uuid::new_v4(), dec!(100.00), dec!(5.00), None, now, end_time, now);
        auction.status = AuctionStatus::Active;
        let auction_id = auction.id;

        let cold: Arc<dyn AuctionSource> = Arc::new(FakeColdStore { auctions: Mutex::new(vec![auction]) });
        let (expiry_tx, _expiry_rx) = mpsc::unbounded_channel();
        let hot = Arc::new(HotStore::new(86_400, expiry_tx));
        let fanout = Arc::new(FanoutBus::new());
        let jobs = unreachable_job_runner();

        let coordinator = Arc::new(FinalizationCoordinator::new(hot.clone(), cold, fanout.clone(), jobs));
        let mut room = fanout.subscribe(auction_id);

        FinalizationCoordinator::recover_on_startup(&coordinator).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let event = room.try_recv().expect("an already-past end_time must finalize right away, not sleep first");
        assert!(matches!(event, Event::AuctionEnded { auction_id: id, .. } if id == auction_id));
    }
}

//! Binary entry point: loads configuration, wires the hot store, cold store,
//! fan-out bus, finalization coordinator, job runner, and gateway together,
//! runs crash-recovery, then serves the HTTP/WebSocket surface.

use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use liveauction::admission::BidAdmissionService;
use liveauction::catalogue::{self, CatalogueState};
use liveauction::coldstore::ColdStore;
use liveauction::config::Settings;
use liveauction::extension::ExtensionPolicy;
use liveauction::fanout::FanoutBus;
use liveauction::finalization::FinalizationCoordinator;
use liveauction::gateway::{self, GatewayState};
use liveauction::hotstore::HotStore;
use liveauction::jobs::handlers::{FinalizeHandler, PersistBidHandler, UpdateMirrorHandler};
use liveauction::jobs::JobRunner;
use liveauction::models::job::JobQueue;
use liveauction::ratelimit::RateGate;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load()?;
    info!(bind_addr = %settings.gateway.bind_addr, "starting liveauction");

    let cold = Arc::new(ColdStore::connect(&settings.cold.connection_string).await?);
    sqlx::migrate!("./migrations").run(cold.pool()).await?;

    let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
    let hot = Arc::new(HotStore::new(settings.auction.retention_sec, expiry_tx));
    let fanout = Arc::new(FanoutBus::new());
    let jobs = Arc::new(JobRunner::new(cold.pool().clone()));

    jobs.clone().spawn_worker(JobQueue::PersistBid, Arc::new(PersistBidHandler { cold: cold.clone() }));
    jobs.clone().spawn_worker(JobQueue::UpdateAuctionMirror, Arc::new(UpdateMirrorHandler { cold: cold.clone() }));
    jobs.clone().spawn_worker(JobQueue::FinalizeAuction, Arc::new(FinalizeHandler { cold: cold.clone() }));

    let finalization = Arc::new(FinalizationCoordinator::new(hot.clone(), cold.clone(), fanout.clone(), jobs.clone()));
    FinalizationCoordinator::spawn_expiry_listener(&finalization, expiry_rx);
    FinalizationCoordinator::recover_on_startup(&finalization).await?;

    let rate_gate = RateGate::new(settings.bid.rate_limit_per_sec);
    let extension_policy = ExtensionPolicy::from_settings(&settings.auction);
    let admission = Arc::new(BidAdmissionService::new(
        hot.clone(),
        cold.clone(),
        jobs.clone(),
        fanout.clone(),
        finalization.clone(),
        rate_gate,
        extension_policy,
    ));

    let gateway_state = GatewayState {
        admission,
        hot: hot.clone(),
        fanout: fanout.clone(),
        auth: Arc::new(gateway::auth::CredentialVerifier::new()),
    };
    let catalogue_state = CatalogueState { cold: cold.clone(), hot: hot.clone(), finalization: finalization.clone() };

    let app = axum::Router::new()
        .merge(gateway::router(gateway_state))
        .merge(catalogue::router(catalogue_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&settings.gateway.bind_addr).await?;
    info!(addr = %settings.gateway.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

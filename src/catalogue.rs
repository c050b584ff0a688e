//! Catalogue Stub (C12).
//!
//! Minimal REST surface for creating and listing auctions, so the gateway
//! and test suites have a way to seed auctions without going straight to SQL.
//! Deliberately thin: no search, no images, no category tree — the spec's
//! Non-goals exclude a full marketplace catalogue, this exists only to stand
//! the bidding engine up end to end.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::coldstore::ColdStore;
use crate::finalization::FinalizationCoordinator;
use crate::hotstore::HotStore;
use crate::models::auction::{Auction, AuctionStatus};

#[derive(Clone)]
pub struct CatalogueState {
    pub cold: Arc<ColdStore>,
    pub hot: Arc<HotStore>,
    pub finalization: Arc<FinalizationCoordinator>,
}

pub fn router(state: CatalogueState) -> Router {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/:id", get(get_item))
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    pub seller_id: Uuid,
    #[validate(custom = "validate_positive_amount")]
    pub starting_price: Decimal,
    #[validate(custom = "validate_positive_amount")]
    pub bid_increment: Decimal,
    pub reserve_price: Option<Decimal>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

fn validate_positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if crate::money::is_valid_amount(*value) {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_a_positive_two_decimal_amount"))
    }
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
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
    pub status: &'static str,
}

impl From<Auction> for ItemResponse {
    fn from(auction: Auction) -> Self {
        Self {
            id: auction.id,
            seller_id: auction.seller_id,
            starting_price: auction.starting_price,
            bid_increment: auction.bid_increment,
            reserve_price: auction.reserve_price,
            current_bid: auction.current_bid,
            highest_bidder_id: auction.highest_bidder_id,
            total_bids: auction.total_bids,
            start_time: auction.start_time,
            end_time: auction.end_time,
            status: crate::coldstore::schema::status_str(auction.status),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

async fn create_item(State(state): State<CatalogueState>, Json(request): Json<CreateItemRequest>) -> Result<Json<ItemResponse>, StatusCode> {
    request.validate().map_err(|_| StatusCode::BAD_REQUEST)?;
    if request.end_time <= request.start_time {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut auction = Auction::new_scheduled(
        Uuid::new_v4(),
        request.seller_id,
        request.starting_price,
        request.bid_increment,
        request.reserve_price,
        request.start_time,
        request.end_time,
        Utc::now(),
    );
    // This endpoint is the only auction-creation path in the repo and there
    // is no separate scheduled-to-active promoter, so an auction goes
    // straight to active on load into hot state, per "on loading an auction
    // into hot state (creation or server restart), schedule finalize".
    auction.status = AuctionStatus::Active;
    state.cold.insert_auction(&auction).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    state.hot.insert_if_absent(auction.clone());
    FinalizationCoordinator::schedule(&state.finalization, auction.id, auction.end_time);
    Ok(Json(auction.into()))
}

async fn get_item(State(state): State<CatalogueState>, Path(id): Path<Uuid>) -> Result<Json<ItemResponse>, StatusCode> {
    let auction = state.cold.load_auction(id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    auction.map(|a| Json(a.into())).ok_or(StatusCode::NOT_FOUND)
}

async fn list_items(State(state): State<CatalogueState>, Query(query): Query<ListQuery>) -> Result<Json<Vec<ItemResponse>>, StatusCode> {
    let status = query.status.as_deref().map(parse_status_query).transpose()?;
    let page = query.page.unwrap_or(0);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let auctions = state
        .cold
        .list_auctions(status, page, per_page)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(auctions.into_iter().map(ItemResponse::from).collect()))
}

fn parse_status_query(s: &str) -> Result<AuctionStatus, StatusCode> {
    match s {
        "draft" => Ok(AuctionStatus::Draft),
        "scheduled" => Ok(AuctionStatus::Scheduled),
        "active" => Ok(AuctionStatus::Active),
        "ended" => Ok(AuctionStatus::Ended),
        "cancelled" => Ok(AuctionStatus::Cancelled),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

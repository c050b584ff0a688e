//! Error kinds returned by the hot-store primitives (P1/P2/P3).

use crate::error::ToWireError;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use thiserror::Error;

/// Structured payload for a `TOO_LOW` rejection.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TooLowDetails {
    pub current_bid: Decimal,
    pub minimum_bid: Decimal,
    pub your_bid: Decimal,
    pub is_first_bid: bool,
}

#[derive(Debug, Error)]
pub enum PlaceBidError {
    #[error("auction not found")]
    NotFound,
    #[error("bid amount is not a valid positive two-decimal amount")]
    InvalidAmount,
    #[error("auction is not active")]
    NotActive,
    #[error("auction has ended")]
    Ended,
    #[error("seller cannot bid on their own auction")]
    SellerCannotBid,
    #[error("bid of {} is below the minimum of {}", .0.your_bid, .0.minimum_bid)]
    TooLow(TooLowDetails),
}

impl ToWireError for PlaceBidError {
    fn wire_code(&self) -> &'static str {
        match self {
            PlaceBidError::NotFound => "AUCTION_NOT_FOUND",
            PlaceBidError::InvalidAmount => "INVALID_BID_AMOUNT",
            PlaceBidError::NotActive => "AUCTION_NOT_ACTIVE",
            PlaceBidError::Ended => "AUCTION_ENDED",
            PlaceBidError::SellerCannotBid => "SELLER_CANNOT_BID",
            PlaceBidError::TooLow(_) => "BID_TOO_LOW",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            PlaceBidError::TooLow(d) => Some(json!({
                "current_bid": d.current_bid,
                "minimum_bid": d.minimum_bid,
                "your_bid": d.your_bid,
                "is_first_bid": d.is_first_bid,
            })),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtendError {
    #[error("auction not found")]
    NotFound,
    #[error("auction is not active")]
    NotActive,
}

impl ToWireError for ExtendError {
    fn wire_code(&self) -> &'static str {
        match self {
            ExtendError::NotFound => "AUCTION_NOT_FOUND",
            ExtendError::NotActive => "AUCTION_NOT_ACTIVE",
        }
    }
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("auction not found")]
    NotFound,
    #[error("auction has not reached its end time")]
    NotEnded,
    #[error("auction is already final")]
    AlreadyFinal,
}

impl ToWireError for FinalizeError {
    fn wire_code(&self) -> &'static str {
        match self {
            FinalizeError::NotFound => "AUCTION_NOT_FOUND",
            FinalizeError::NotEnded => "AUCTION_NOT_ENDED",
            FinalizeError::AlreadyFinal => "AUCTION_ALREADY_FINAL",
        }
    }
}

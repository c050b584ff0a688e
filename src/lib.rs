//! liveauction - a real-time auction bidding engine.
//!
//! Holds the authoritative state of every live auction in memory for
//! low-latency bid admission, mirrors it durably to Postgres, and pushes
//! live updates to connected bidders over WebSockets.
//!
//! # Architecture
//!
//! - **Hot store** (`hotstore`): in-process, authoritative while an auction
//!   is active. Exposes the three atomic primitives bid placement, extension,
//!   and finalization are built from.
//! - **Cold store** (`coldstore`): durable Postgres mirror and append-only
//!   bid log.
//! - **Admission** (`admission`): the service a bid actually goes through —
//!   rate gate, hot-store placement, lazy hydration, write-down, fan-out.
//! - **Finalization** (`finalization`): drives every auction to its terminal
//!   state exactly once, via two independent triggers.
//! - **Fan-out** (`fanout`): per-auction broadcast rooms.
//! - **Gateway** (`gateway`): the WebSocket surface bidders connect to.
//! - **Jobs** (`jobs`): durable background write-down queue.
//! - **Catalogue** (`catalogue`): minimal REST surface for creating/listing
//!   auctions.

pub mod admission;
pub mod catalogue;
pub mod coldstore;
pub mod config;
pub mod error;
pub mod extension;
pub mod fanout;
pub mod finalization;
pub mod gateway;
pub mod hotstore;
pub mod jobs;
pub mod models;
pub mod money;
pub mod ratelimit;

/// Crate version, exposed for health/diagnostics endpoints.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

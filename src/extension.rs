//! Anti-sniping extension policy (C4).
//!
//! A thin, config-driven wrapper around `HotStore::extend` (P2). Kept as its
//! own type so the threshold/duration pair is a named, testable unit instead
//! of two loose config reads scattered through the admission path.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AuctionSettings;
use crate::hotstore::{errors::ExtendError, ExtendOutcome, HotStore};

#[derive(Debug, Clone, Copy)]
pub struct ExtensionPolicy {
    threshold_secs: i64,
    duration_secs: i64,
}

impl ExtensionPolicy {
    pub fn from_settings(settings: &AuctionSettings) -> Self {
        Self {
            threshold_secs: settings.extension_threshold_sec,
            duration_secs: settings.extension_duration_sec,
        }
    }

    pub fn apply(&self, hot: &HotStore, auction_id: Uuid, server_time: DateTime<Utc>) -> Result<ExtendOutcome, ExtendError> {
        hot.extend(auction_id, server_time, self.threshold_secs, self.duration_secs)
    }
}

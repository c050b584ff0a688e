//! Layered configuration (§4.9 of SPEC_FULL.md).
//!
//! Compiled-in defaults, overridden by an optional `config/*.toml` file,
//! overridden by `AUCTION_`-prefixed environment variables. `.env` is loaded
//! into the process environment first via `dotenvy`, matching the bootstrap
//! idiom used across the example pack's standalone services.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BidSettings {
    pub rate_limit_per_sec: u32,
}

impl Default for BidSettings {
    fn default() -> Self {
        Self { rate_limit_per_sec: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuctionSettings {
    pub extension_threshold_sec: i64,
    pub extension_duration_sec: i64,
    pub retention_sec: i64,
}

impl Default for AuctionSettings {
    fn default() -> Self {
        Self {
            extension_threshold_sec: 30,
            extension_duration_sec: 30,
            retention_sec: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FinalizationSettings {
    pub max_attempts: u32,
}

impl Default for FinalizationSettings {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HotSettings {
    pub tls: bool,
}

impl Default for HotSettings {
    fn default() -> Self {
        Self { tls: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColdSettings {
    pub connection_string: String,
}

impl Default for ColdSettings {
    fn default() -> Self {
        Self {
            connection_string: "postgres://localhost/liveauction".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub bind_addr: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub bid: BidSettings,
    pub auction: AuctionSettings,
    pub finalization: FinalizationSettings,
    pub hot: HotSettings,
    pub cold: ColdSettings,
    pub gateway: GatewaySettings,
}

impl Settings {
    /// Load defaults, an optional `config/settings.toml`, then environment
    /// overrides (`AUCTION__SECTION__KEY`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/settings").required(false))
            .add_source(config::Environment::with_prefix("AUCTION").separator("__"));

        builder.build()?.try_deserialize()
    }
}

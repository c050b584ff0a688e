//! Error taxonomy for the bidding engine.
//!
//! Every layer gets its own closed error enum (`thiserror`). Each error knows
//! how to render itself as the wire-level `{code, message, details?}` shape
//! consumed by the Gateway — never via string matching on a `Display` impl.

use serde::Serialize;
use serde_json::Value;

/// A wire-level error as sent to a client.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Implemented by every layer's error enum so the Gateway can render any of
/// them uniformly.
pub trait ToWireError {
    fn wire_code(&self) -> &'static str;
    fn details(&self) -> Option<Value> {
        None
    }
}

impl<E: ToWireError + std::fmt::Display> From<&E> for WireError {
    fn from(err: &E) -> Self {
        WireError {
            code: err.wire_code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

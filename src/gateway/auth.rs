//! Bearer-credential authentication for the gateway's WebSocket upgrade.
//!
//! Credentials are opaque bearer tokens; only their SHA-256 digest is ever
//! held in memory, matching the "never log or store raw credentials" rule
//! the teacher's payment gateway code follows for card data.

use axum::http::HeaderMap;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A verified identity attached to a connection on a successful handshake.
#[derive(Debug, Clone)]
pub struct Identity {
    pub bidder_id: Uuid,
    pub username: String,
}

pub struct CredentialVerifier {
    tokens: DashMap<String, Identity>,
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialVerifier {
    pub fn new() -> Self {
        Self { tokens: DashMap::new() }
    }

    /// Registers a bearer token for a bidder. Intended for test/demo
    /// seeding; a production deployment would back this with a proper
    /// identity provider, out of scope here.
    pub fn issue(&self, raw_token: &str, bidder_id: Uuid, username: impl Into<String>) {
        self.tokens.insert(digest(raw_token), Identity { bidder_id, username: username.into() });
    }

    pub fn verify(&self, raw_token: &str) -> Option<Identity> {
        self.tokens.get(&digest(raw_token)).map(|entry| entry.clone())
    }
}

fn digest(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_the_same_bidder() {
        let verifier = CredentialVerifier::new();
        let bidder_id = Uuid::new_v4();
        verifier.issue("token-abc", bidder_id, "alice");
        let identity = verifier.verify("token-abc").unwrap();
        assert_eq!(identity.bidder_id, bidder_id);
        assert_eq!(identity.username, "alice");
    }

    #[test]
    fn unknown_token_does_not_verify() {
        let verifier = CredentialVerifier::new();
        assert_eq!(verifier.verify("unknown"), None);
    }
}

//! Auth token manager -- challenge/response proof of key ownership.
//!
//! 1. `begin_challenge`: random nonce sealed to the peer's public key.
//! 2. The peer decrypts it and sends the nonce back.
//! 3. `verify_challenge`: on a byte-exact match the nonce becomes a bearer
//!    token bound to that peer.
//!
//! At most one outstanding challenge per peer. Any verification attempt
//! consumes it.

use squadlink_crypto::{generate_nonce, ChallengeSealer};
use squadlink_protocol::PeerId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{HubError, Result};

#[derive(Default)]
struct AuthState {
    /// peer id → outstanding nonce
    pending: HashMap<PeerId, String>,
    /// verified token → peer id
    valid: HashMap<String, PeerId>,
}

pub struct AuthTokenManager {
    state: Mutex<AuthState>,
    sealer: Arc<dyn ChallengeSealer>,
}

impl AuthTokenManager {
    pub fn new(sealer: Arc<dyn ChallengeSealer>) -> Self {
        Self {
            state: Mutex::new(AuthState::default()),
            sealer,
        }
    }

    /// Issue a challenge for `peer_id`. Returns the sealed nonce.
    pub async fn begin_challenge(&self, peer_id: &str, public_key: &str) -> Result<String> {
        let nonce = generate_nonce();
        {
            let mut state = self.state.lock().await;
            if state.pending.contains_key(peer_id) {
                return Err(HubError::AlreadyPending(peer_id.to_string()));
            }
            state.pending.insert(peer_id.to_string(), nonce.clone());
        }

        match self.sealer.seal(public_key, &nonce) {
            Ok(sealed) => {
                tracing::debug!(peer = %peer_id, "auth: challenge issued");
                Ok(sealed)
            }
            Err(e) => {
                self.state.lock().await.pending.remove(peer_id);
                tracing::warn!(peer = %peer_id, error = %e, "auth: sealing failed");
                Err(e.into())
            }
        }
    }

    /// Check `proof` against the outstanding nonce. The challenge is cleared
    /// whether or not it matches.
    pub async fn verify_challenge(&self, peer_id: &str, proof: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let nonce = state
            .pending
            .remove(peer_id)
            .ok_or_else(|| HubError::NoPendingChallenge(peer_id.to_string()))?;

        if nonce.as_bytes() != proof.as_bytes() {
            tracing::info!(peer = %peer_id, "auth: challenge failed");
            return Err(HubError::AuthMismatch);
        }

        state.valid.insert(proof.to_string(), peer_id.to_string());
        tracing::info!(peer = %peer_id, "auth: peer verified");
        Ok(())
    }

    /// True only if `token` was verified for exactly `claimed`.
    pub async fn check_ownership(&self, token: &str, claimed: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        self.state
            .lock()
            .await
            .valid
            .get(token)
            .is_some_and(|owner| owner == claimed)
    }

    pub async fn is_pending(&self, peer_id: &str) -> bool {
        self.state.lock().await.pending.contains_key(peer_id)
    }
}

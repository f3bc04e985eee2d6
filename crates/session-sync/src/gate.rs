//! Sync gate state machine.
//!
//! ```text
//! Unsynced --evaluate--> Syncing(key) --ok--> Synced(key)
//!                             |
//!                             +--err--> Unsynced
//! ```
//!
//! The gate is marked `Syncing` before the exchange is awaited, and the key
//! is recorded (in memory and in the durable store) only after the exchange
//! succeeded. A key equal to the recorded one never triggers another
//! exchange.
//!
//! Every sync attempt and every logout takes a new attempt number. An
//! exchange result is only applied while its attempt number is current, so
//! a logout that lands during an in-flight exchange cannot be undone by it.

use crate::client::{SessionExchange, SyncError};
use crate::key::{IdentityToken, SyncKey};
use crate::store::KeyStore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Unsynced,
    Syncing(SyncKey),
    Synced(SyncKey),
}

/// Result of [`SessionSync::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No token to sync.
    NotAuthenticated,
    /// The current (token, exp) pair is already synced.
    AlreadySynced,
    /// Another evaluation is exchanging a token.
    InProgress,
    /// The exchange succeeded and the refresh signal was bumped.
    Established,
    /// The exchange failed; the next evaluation tries again.
    Failed(SyncError),
    /// A logout ran while the exchange was in flight. The result was
    /// discarded and the session torn down again.
    Superseded,
}

#[derive(Debug)]
struct Slot {
    state: SyncState,
    attempt: u64,
}

/// Deduplicating session sync.
pub struct SessionSync {
    exchange: Arc<dyn SessionExchange>,
    store: Arc<dyn KeyStore>,
    slot: Mutex<Slot>,
    refresh: watch::Sender<u64>,
}

impl SessionSync {
    /// Build the gate, reconciling a persisted key into memory.
    pub fn new(exchange: Arc<dyn SessionExchange>, store: Arc<dyn KeyStore>) -> Self {
        let state = match store.load() {
            Ok(Some(key)) => {
                tracing::debug!(target: "sync.gate", "Restored synced key from store");
                SyncState::Synced(key)
            }
            Ok(None) => SyncState::Unsynced,
            Err(e) => {
                tracing::warn!(target: "sync.gate", error = %e, "Failed to read sync store, starting unsynced");
                SyncState::Unsynced
            }
        };

        let (refresh, _) = watch::channel(0);

        Self {
            exchange,
            store,
            slot: Mutex::new(Slot { state, attempt: 0 }),
            refresh,
        }
    }

    pub fn state(&self) -> SyncState {
        self.lock_slot().state.clone()
    }

    /// Generation counter bumped after every established session and every
    /// logout. Subscribers re-render state that depends on the cookie.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.refresh.subscribe()
    }

    /// Sync `identity` with the gateway unless already done.
    #[instrument(skip_all, name = "sync.gate.evaluate")]
    pub async fn evaluate(&self, identity: Option<&IdentityToken>) -> SyncOutcome {
        let Some(identity) = identity.filter(|i| !i.is_empty()) else {
            return SyncOutcome::NotAuthenticated;
        };
        let key = identity.sync_key();

        let attempt = {
            let mut slot = self.lock_slot();
            match &slot.state {
                SyncState::Synced(current) if *current == key => {
                    return SyncOutcome::AlreadySynced;
                }
                SyncState::Syncing(_) => return SyncOutcome::InProgress,
                _ => {}
            }

            if self.stored_key().as_ref() == Some(&key) {
                slot.state = SyncState::Synced(key);
                return SyncOutcome::AlreadySynced;
            }

            slot.attempt += 1;
            slot.state = SyncState::Syncing(key.clone());
            slot.attempt
        };

        tracing::info!(target: "sync.gate", exp = ?identity.exp(), "Session sync starting");

        let result = self.exchange.establish(identity.token()).await;

        let current = {
            let mut slot = self.lock_slot();
            let current = slot.attempt == attempt;
            if current {
                match &result {
                    Ok(()) => {
                        slot.state = SyncState::Synced(key.clone());
                        if let Err(e) = self.store.save(&key) {
                            tracing::warn!(target: "sync.gate", error = %e, "Failed to persist sync key");
                        }
                    }
                    Err(_) => slot.state = SyncState::Unsynced,
                }
            }
            current
        };

        match result {
            Ok(()) if current => {
                self.refresh.send_modify(|generation| *generation += 1);
                tracing::info!(target: "sync.gate", "Session cookie set, refresh signalled");
                SyncOutcome::Established
            }
            Ok(()) => {
                tracing::warn!(target: "sync.gate", "Logged out during session sync, tearing down late session");
                if let Err(e) = self.exchange.teardown().await {
                    tracing::warn!(target: "sync.gate", error = %e, "Late session teardown failed");
                }
                SyncOutcome::Superseded
            }
            Err(e) => {
                tracing::error!(target: "sync.gate", error = %e, "Failed to establish server session");
                SyncOutcome::Failed(e)
            }
        }
    }

    /// End the server session and forget the synced key.
    ///
    /// Local state is cleared before the teardown call and stays cleared
    /// when it fails. An exchange still in flight is discarded.
    #[instrument(skip_all, name = "sync.gate.logout")]
    pub async fn logout(&self) -> Result<(), SyncError> {
        {
            let mut slot = self.lock_slot();
            slot.attempt += 1;
            slot.state = SyncState::Unsynced;
            if let Err(e) = self.store.clear() {
                tracing::warn!(target: "sync.gate", error = %e, "Failed to clear sync store");
            }
        }
        self.refresh.send_modify(|generation| *generation += 1);

        let result = self.exchange.teardown().await;
        if let Err(e) = &result {
            tracing::warn!(target: "sync.gate", error = %e, "Session teardown failed");
        }

        result
    }

    fn stored_key(&self) -> Option<SyncKey> {
        self.store.load().unwrap_or_else(|e| {
            tracing::warn!(target: "sync.gate", error = %e, "Failed to read sync store");
            None
        })
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

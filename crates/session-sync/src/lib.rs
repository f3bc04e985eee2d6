//! Session Sync
//!
//! Client-side gate that exchanges an identity token for the gateway's
//! `bsw_access` session cookie at most once per (token, expiry) pair,
//! across repeated evaluations and process restarts.
//!
//! # Modules
//!
//! - `key` - Identity token and the derived sync key
//! - `store` - Volatile and file-backed sync key stores
//! - `client` - Session exchange trait and its HTTP implementation
//! - `gate` - The sync state machine
//!
//! # Example
//!
//! ```rust,ignore
//! use session_sync::{FileStore, HttpSessionClient, IdentityToken, SessionSync};
//! use std::sync::Arc;
//!
//! let exchange = Arc::new(HttpSessionClient::new("http://localhost:3000")?);
//! let store = Arc::new(FileStore::new(state_dir.join("bsw_session_synced")));
//! let sync = SessionSync::new(exchange.clone(), store);
//!
//! let identity = IdentityToken::from_jwt(access_token);
//! sync.evaluate(Some(&identity)).await;
//!
//! // Downstream requests share the jar holding `bsw_access`
//! let api = reqwest::Client::builder()
//!     .cookie_provider(exchange.cookie_jar())
//!     .build()?;
//! ```

pub mod client;
pub mod gate;
pub mod key;
pub mod store;

pub use client::{HttpSessionClient, SessionExchange, SyncError, SESSION_COOKIE_NAME};
pub use gate::{SessionSync, SyncOutcome, SyncState};
pub use key::{IdentityToken, SyncKey};
pub use store::{FileStore, KeyStore, MemoryStore, StoreError};

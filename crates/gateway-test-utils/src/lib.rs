//! # Gateway Test Utilities
//!
//! Shared test utilities for the session gateway.
//!
//! This crate provides:
//! - Deterministic Ed25519 keypairs that sign tokens and publish JWKs
//! - A fluent builder for identity provider token claims
//! - `MockKeycloak` and `TestGatewayServer` for E2E tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let keycloak = MockKeycloak::start().await;
//!     let server = TestGatewayServer::spawn(&keycloak).await?;
//!     let token = keycloak.sign(&TestTokenBuilder::new().for_user("alice").build());
//!
//!     let response = reqwest::Client::new()
//!         .post(format!("{}/api/session", server.url()))
//!         .json(&serde_json::json!({ "token": token }))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 204);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use server_harness::*;
pub use token_builders::*;

//! Common utilities shared by the BSW session gateway and its clients.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, header and payload inspection)
pub mod jwt;

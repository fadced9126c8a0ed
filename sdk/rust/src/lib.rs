//! Client SDK for the admin gateway.
//!
//! Adds the credentials a route may demand: API key, app id, nonce,
//! timestamp, HMAC body signature and bearer token.

pub mod client;

pub use client::{AppCredentials, Envelope, GatewayClient, PreparedRequest, SdkError};

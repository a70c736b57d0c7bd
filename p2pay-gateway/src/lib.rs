//! Trusted backend for fiat settlement.
//!
//! Holds the verifier credential on the server side and exposes the two
//! checks a payer or merchant cannot safely perform on their own: signing an
//! intent descriptor and confirming a direct payment on chain.
//!
//! # Modules
//!
//! - [`handlers`] - Axum route handlers and router builder
//! - [`error`] - Gateway error responses
//! - [`config`] - Server configuration with environment variable expansion

pub mod config;
pub mod error;
pub mod handlers;

pub use handlers::{Gateway, GatewayState, gateway_router};

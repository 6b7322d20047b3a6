//! x402 facilitator: verifies EIP-3009 authorizations and settles them on chain.
//!
//! Resource servers call `/verify` and `/settle` (optionally HMAC-signed).
//! Verification and settlement logic live in the core [`x402`] crate; this
//! crate provides the HTTP server, configuration and state.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (health, supported, verify, settle, metrics)
//! - [`state`]: Shared [`AppState`](state::AppState) (also used by the resource server's embedded mode)
//! - [`bootstrap`]: Build an [`AppState`](state::AppState) from [`FacilitatorConfig`](config::FacilitatorConfig)
//! - [`metrics`]: Prometheus metrics for verification and settlement

pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;

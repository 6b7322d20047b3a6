//! x402 resource server: content behind an HTTP 402 payment gate.
//!
//! `GET /api/content/{hash}` answers 402 with a
//! [`PaymentRequirements`](x402::PaymentRequirements) challenge until the
//! client presents a signed authorization in `X-PAYMENT`. The gate verifies
//! it, settles it exactly once, and only then releases the record together
//! with the settlement receipt in `X-PAYMENT-RESPONSE`.
//!
//! # Modules
//!
//! - [`gate`]: The [`Gate`](gate::Gate) state machine and its facilitator backends
//! - [`content`]: [`ContentStore`](content::ContentStore) lookups (JSON seed or read-only SQLite)
//! - [`routes`]: HTTP endpoints (content, health, metrics)
//! - [`config`]: [`GateConfig`](config::GateConfig) from the environment
//! - [`error`]: [`GateError`](error::GateError) and its HTTP mapping
//! - [`metrics`]: Prometheus metrics per gate state

pub mod config;
pub mod content;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::GateConfig;
pub use error::GateError;
pub use gate::{FacilitatorBackend, Gate, GateState, Grant};
pub use state::ServerState;

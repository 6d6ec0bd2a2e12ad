//! Webhook server module
//!
//! Receives charting-platform alerts and turns them into reconciled orders:
//! - `POST /webhook/tradingview` (and the `/webhook` alias)
//! - `GET /health`, `GET /`
//!
//! Alerts may carry the shared secret in the body (`secret`/`passphrase`) or
//! in the `X-Webhook-Secret` header.

mod server;
pub mod handlers;
mod types;

pub use server::{create_router, WebhookServer};
pub use types::{ApiResponse, HealthResponse, WebhookPayload};

//! Venue adapters module
//!
//! Two seams, one per external collaborator:
//! - [`MarketData`]: prices and instrument metadata (public, unsigned)
//! - [`ExchangeGateway`]: positions, orders and leverage (account scoped, signed)

pub mod types;
pub mod hyperliquid;
pub mod paper;

#[cfg(test)]
pub mod mock;

use crate::error::{AppError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use types::*;

/// Market data and metadata provider
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Metadata for a canonical symbol, `None` when the venue does not list it
    async fn instrument_meta(&self, symbol: &str) -> Result<Option<InstrumentMeta>>;

    /// Last traded (or mark) price
    async fn last_price(&self, symbol: &str) -> Result<Option<Decimal>>;

    /// Order-book midpoint, used when no trade price is available
    async fn book_mid(&self, symbol: &str) -> Result<Option<Decimal>>;
}

/// Order submission gateway; owns signing and auth
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Gateway display name
    fn name(&self) -> &'static str;

    /// Raw position row for a symbol, `None` when the account holds nothing.
    ///
    /// The shape is gateway-owned; `PositionService` normalizes it.
    async fn position_row(&self, symbol: &str) -> Result<Option<serde_json::Value>>;

    /// Submit one order
    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck>;

    /// Set cross leverage for a symbol
    async fn update_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Withdrawable account balance in quote currency
    async fn account_balance(&self) -> Result<Decimal>;
}

/// Message fragments the venue uses for rejections that can clear on a fresh price
const TRANSIENT_REJECTIONS: &[&str] = &[
    "could not immediately match",
    "no immediate match",
    "away from the reference price",
    "reference price",
    "price moved",
    "too far from",
];

/// Classify a gateway rejection message into the retryable or permanent class
pub fn classify_rejection(message: &str) -> AppError {
    let lower = message.to_lowercase();
    if TRANSIENT_REJECTIONS.iter().any(|p| lower.contains(p)) {
        AppError::TransientGateway(message.to_string())
    } else {
        AppError::PermanentGateway(message.to_string())
    }
}

//! Quotes Service
//!
//! Reference prices for sizing and for anchoring market-equivalent orders.

use crate::error::{AppError, Result};
use crate::state::AppState;
use rust_decimal::Decimal;
use tracing::{debug, warn};

pub struct QuotesService;

impl QuotesService {
    /// Last trade/mark price, falling back to the order-book midpoint
    pub async fn reference_price(state: &AppState, symbol: &str) -> Result<Decimal> {
        match state.market.last_price(symbol).await {
            Ok(Some(px)) if px > Decimal::ZERO => return Ok(px),
            Ok(_) => debug!("No last price for {}, trying book mid", symbol),
            Err(e) => warn!("Last price lookup for {} failed: {}", symbol, e),
        }

        match state.market.book_mid(symbol).await {
            Ok(Some(mid)) if mid > Decimal::ZERO => Ok(mid),
            Ok(_) => Err(AppError::PriceUnavailable(symbol.to_string())),
            Err(e) => {
                warn!("Book mid lookup for {} failed: {}", symbol, e);
                Err(AppError::PriceUnavailable(symbol.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::mock::{state_with, MockMarket};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_prefers_last_price() {
        let market = MockMarket::new()
            .with_instrument("ETH", dec!(0.001), dec!(0.001), dec!(3000))
            .with_mid("ETH", dec!(2999.5));
        let state = state_with(Arc::new(market), None);
        assert_eq!(QuotesService::reference_price(&state, "ETH").await.unwrap(), dec!(3000));
    }

    #[tokio::test]
    async fn test_falls_back_to_mid() {
        let market = MockMarket::new()
            .with_instrument("ETH", dec!(0.001), dec!(0.001), dec!(3000))
            .without_last_price("ETH")
            .with_mid("ETH", dec!(2999.5));
        let state = state_with(Arc::new(market), None);
        assert_eq!(QuotesService::reference_price(&state, "ETH").await.unwrap(), dec!(2999.5));
    }

    #[tokio::test]
    async fn test_no_price_at_all() {
        let market = MockMarket::new()
            .with_instrument("ETH", dec!(0.001), dec!(0.001), dec!(3000))
            .without_last_price("ETH");
        let state = state_with(Arc::new(market), None);
        assert!(matches!(
            QuotesService::reference_price(&state, "ETH").await,
            Err(AppError::PriceUnavailable(_))
        ));
    }
}

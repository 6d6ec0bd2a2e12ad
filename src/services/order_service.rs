//! Order Service
//!
//! Submits market-equivalent orders (aggressive limit + time in force) and
//! retries the rejections that a fresh reference price can clear.

use crate::brokers::types::{FillStatus, OrderRequest, OrderSide, TimeInForce};
use crate::error::{AppError, Result};
use crate::services::{QuotesService, SizingService};
use crate::state::AppState;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of one accepted order
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedOrder {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
    #[serde(with = "rust_decimal::serde::float")]
    pub reference_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub limit_price: Decimal,
    pub client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub fill: FillStatus,
    pub attempts: u32,
    /// Raw gateway response
    pub response: serde_json::Value,
}

pub struct OrderService;

impl OrderService {
    /// Submit one market-equivalent order.
    ///
    /// Each attempt re-reads the reference price. Transient rejections are retried
    /// up to `ORDER_MAX_ATTEMPTS` with a linear backoff; anything else fails
    /// immediately.
    pub async fn submit_market_order(
        state: &AppState,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        time_in_force: TimeInForce,
        reduce_only: bool,
    ) -> Result<SubmittedOrder> {
        let exchange = state
            .exchange
            .as_ref()
            .ok_or_else(|| AppError::Internal("No order gateway configured".to_string()))?;

        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Refusing to submit {} {} with non-positive amount {}",
                side, symbol, amount
            )));
        }

        let rules = SizingService::rules(state, symbol).await?;
        let trading = &state.config.trading;
        let max_attempts = trading.max_order_attempts.max(1);

        info!(
            "OrderService::submit_market_order - {} {} {} reduce_only={} tif={} via {}",
            side, amount, symbol, reduce_only, time_in_force, exchange.name()
        );

        let mut attempt = 0;
        loop {
            attempt += 1;

            let reference_price = QuotesService::reference_price(state, symbol).await?;
            let limit_price =
                SizingService::limit_price(&rules, side, reference_price, trading.slippage)?;
            let client_order_id = new_client_order_id();

            let request = OrderRequest {
                symbol: symbol.to_string(),
                side,
                amount,
                limit_price,
                reduce_only,
                time_in_force,
                client_order_id: Some(client_order_id.clone()),
            };

            match exchange.place_order(request).await {
                Ok(ack) => {
                    info!(
                        "Order accepted: {} {} {} (attempt {}, oid {:?})",
                        side, amount, symbol, attempt, ack.order_id
                    );
                    return Ok(SubmittedOrder {
                        symbol: symbol.to_string(),
                        side,
                        amount,
                        reduce_only,
                        time_in_force,
                        reference_price,
                        limit_price,
                        client_order_id,
                        order_id: ack.order_id,
                        fill: ack.status,
                        attempts: attempt,
                        response: ack.raw,
                    });
                }
                Err(AppError::TransientGateway(msg)) if attempt < max_attempts => {
                    let backoff = trading.retry_backoff * attempt;
                    warn!(
                        "Transient rejection for {} {} (attempt {}/{}): {}; retrying in {:?}",
                        side, symbol, attempt, max_attempts, msg, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(
                        "Order rejected: {} {} {} after {} attempt(s): {}",
                        side, amount, symbol, attempt, e
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// 128-bit client order id in the venue's `0x`-hex form
fn new_client_order_id() -> String {
    format!("0x{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::mock::{state_with, MockExchange, MockMarket};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn setup() -> (Arc<MockExchange>, AppState) {
        let market = MockMarket::new().with_instrument("ETH", dec!(0.001), dec!(0.001), dec!(2000));
        let exchange = Arc::new(MockExchange::new());
        let state = state_with(Arc::new(market), Some(exchange.clone()));
        (exchange, state)
    }

    #[tokio::test]
    async fn test_submits_with_price_anchor() {
        let (exchange, state) = setup();
        let order = OrderService::submit_market_order(
            &state, "ETH", OrderSide::Buy, dec!(1.5), TimeInForce::Ioc, false,
        )
        .await
        .unwrap();

        assert_eq!(order.attempts, 1);
        assert_eq!(order.reference_price, dec!(2000));
        assert_eq!(order.limit_price, dec!(2100));

        let sent = exchange.orders();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].limit_price, dec!(2100));
        let cloid = sent[0].client_order_id.clone().unwrap();
        assert_eq!(cloid.len(), 34);
        assert!(cloid.starts_with("0x"));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let (exchange, state) = setup();
        exchange.fail_next(AppError::TransientGateway("could not immediately match".into()));
        exchange.fail_next(AppError::TransientGateway("price moved".into()));

        let order = OrderService::submit_market_order(
            &state, "ETH", OrderSide::Sell, dec!(1), TimeInForce::Ioc, true,
        )
        .await
        .unwrap();

        assert_eq!(order.attempts, 3);
        let sent = exchange.orders();
        assert_eq!(sent.len(), 3);
        // each attempt carries its own client id
        assert_ne!(sent[0].client_order_id, sent[1].client_order_id);
    }

    #[tokio::test]
    async fn test_transient_exhausts_bound() {
        let (exchange, state) = setup();
        for _ in 0..5 {
            exchange.fail_next(AppError::TransientGateway("could not immediately match".into()));
        }

        let err = OrderService::submit_market_order(
            &state, "ETH", OrderSide::Buy, dec!(1), TimeInForce::Ioc, false,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::TransientGateway(_)));
        assert_eq!(exchange.orders().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_fails_without_retry() {
        let (exchange, state) = setup();
        exchange.fail_next(AppError::PermanentGateway("Insufficient margin".into()));

        let err = OrderService::submit_market_order(
            &state, "ETH", OrderSide::Buy, dec!(1), TimeInForce::Ioc, false,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::PermanentGateway(_)));
        assert_eq!(exchange.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_amount_never_submitted() {
        let (exchange, state) = setup();
        let err = OrderService::submit_market_order(
            &state, "ETH", OrderSide::Buy, Decimal::ZERO, TimeInForce::Ioc, false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(exchange.orders().is_empty());
    }
}

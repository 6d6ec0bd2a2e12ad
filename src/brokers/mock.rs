//! Scriptable in-memory collaborators for unit tests

use super::types::*;
use super::{ExchangeGateway, MarketData};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::state::AppState;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Config with millisecond-scale waits so reconcile tests run fast
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.trading.retry_backoff = Duration::from_millis(1);
    config.trading.flat_poll_interval = Duration::from_millis(1);
    config.trading.flat_poll_timeout = Duration::from_millis(5);
    config
}

/// State over mock collaborators; pass `None` for demo mode
pub fn state_with(market: Arc<MockMarket>, exchange: Option<Arc<MockExchange>>) -> AppState {
    AppState::new(
        fast_config(),
        market,
        exchange.map(|e| e as Arc<dyn ExchangeGateway>),
    )
}

#[derive(Default)]
pub struct MockMarket {
    metas: HashMap<String, InstrumentMeta>,
    last: Mutex<HashMap<String, Decimal>>,
    mids: HashMap<String, Decimal>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instrument(
        mut self,
        symbol: &str,
        amount_step: Decimal,
        min_amount: Decimal,
        last_price: Decimal,
    ) -> Self {
        self.metas.insert(
            symbol.to_string(),
            InstrumentMeta {
                symbol: symbol.to_string(),
                asset_index: Some(self.metas.len() as u32),
                amount_step: Some(amount_step),
                min_amount: Some(min_amount),
                price_step: Some(Decimal::new(1, 2)),
                max_leverage: Some(50),
            },
        );
        self.last.lock().insert(symbol.to_string(), last_price);
        self
    }

    pub fn with_mid(mut self, symbol: &str, mid: Decimal) -> Self {
        self.mids.insert(symbol.to_string(), mid);
        self
    }

    pub fn without_last_price(self, symbol: &str) -> Self {
        self.last.lock().remove(symbol);
        self
    }
}

#[async_trait]
impl MarketData for MockMarket {
    async fn instrument_meta(&self, symbol: &str) -> Result<Option<InstrumentMeta>> {
        Ok(self.metas.get(symbol).cloned())
    }

    async fn last_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        Ok(self.last.lock().get(symbol).copied())
    }

    async fn book_mid(&self, symbol: &str) -> Result<Option<Decimal>> {
        Ok(self.mids.get(symbol).copied())
    }
}

/// Exchange mock holding signed positions; filled orders move the position
/// unless the position is pinned.
#[derive(Default)]
pub struct MockExchange {
    positions: Mutex<HashMap<String, Decimal>>,
    pinned: Mutex<bool>,
    failures: Mutex<VecDeque<AppError>>,
    scripted: Mutex<HashMap<usize, AppError>>,
    orders: Mutex<Vec<OrderRequest>>,
    leverage_calls: Mutex<Vec<(String, u32)>>,
    reject_leverage: bool,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(self, symbol: &str, signed: Decimal) -> Self {
        self.positions.lock().insert(symbol.to_string(), signed);
        self
    }

    /// Keep the reported position unchanged regardless of fills
    pub fn pinned(self) -> Self {
        *self.pinned.lock() = true;
        self
    }

    pub fn rejecting_leverage(mut self) -> Self {
        self.reject_leverage = true;
        self
    }

    /// Queue an error returned by the next `place_order` call
    pub fn fail_next(&self, err: AppError) {
        self.failures.lock().push_back(err);
    }

    /// Fail the `n`th order (1-based) with `err`
    pub fn fail_order(&self, n: usize, err: AppError) {
        self.scripted.lock().insert(n, err);
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.leverage_calls.lock().clone()
    }

    pub fn signed_position(&self, symbol: &str) -> Decimal {
        self.positions
            .lock()
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl ExchangeGateway for MockExchange {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn position_row(&self, symbol: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .positions
            .lock()
            .get(symbol)
            .filter(|szi| !szi.is_zero())
            .map(|szi| json!({ "coin": symbol, "szi": szi.to_string() })))
    }

    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck> {
        let n = {
            let mut orders = self.orders.lock();
            orders.push(order.clone());
            orders.len()
        };

        if let Some(err) = self.scripted.lock().remove(&n) {
            return Err(err);
        }
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }

        if !*self.pinned.lock() {
            let delta = if order.side.is_buy() {
                order.amount
            } else {
                -order.amount
            };
            *self
                .positions
                .lock()
                .entry(order.symbol.clone())
                .or_insert(Decimal::ZERO) += delta;
        }

        Ok(OrderAck {
            order_id: Some(format!("mock-{}", n)),
            status: FillStatus::Filled {
                total_size: order.amount,
                avg_price: order.limit_price,
            },
            raw: json!({ "status": "ok" }),
        })
    }

    async fn update_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.leverage_calls.lock().push((symbol.to_string(), leverage));
        if self.reject_leverage {
            return Err(AppError::PermanentGateway("leverage rejected".to_string()));
        }
        Ok(())
    }

    async fn account_balance(&self) -> Result<Decimal> {
        Ok(Decimal::new(1000, 0))
    }
}

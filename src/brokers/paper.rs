//! Paper trading gateway
//!
//! Fills market-equivalent orders in-process at the live reference price so the
//! full reconcile path can run without touching an account.

use super::types::*;
use super::{classify_rejection, ExchangeGateway, MarketData};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
struct PaperPosition {
    /// Positive long, negative short
    signed: Decimal,
    entry_price: Decimal,
}

struct Book {
    balance: Decimal,
    positions: HashMap<String, PaperPosition>,
    leverage: HashMap<String, u32>,
    next_order_id: u64,
}

pub struct PaperExchange {
    market: Arc<dyn MarketData>,
    book: Mutex<Book>,
}

impl PaperExchange {
    pub fn new(market: Arc<dyn MarketData>, balance: Decimal) -> Self {
        info!("Paper trading gateway initialized with ${}", balance);

        Self {
            market,
            book: Mutex::new(Book {
                balance,
                positions: HashMap::new(),
                leverage: HashMap::new(),
                next_order_id: 1,
            }),
        }
    }

    async fn fill_price(&self, symbol: &str) -> Result<Decimal> {
        if let Some(px) = self.market.last_price(symbol).await? {
            return Ok(px);
        }
        self.market
            .book_mid(symbol)
            .await?
            .ok_or_else(|| AppError::PriceUnavailable(symbol.to_string()))
    }
}

/// Apply a fill to a position, returning the new position and realized PnL.
/// `None` when the fill does not fit in a decimal.
fn apply_fill(pos: PaperPosition, delta: Decimal, price: Decimal) -> Option<(PaperPosition, Decimal)> {
    let signed = pos.signed.checked_add(delta)?;

    // opening or adding: blend entry price
    if pos.signed.is_zero() || pos.signed.is_sign_positive() == delta.is_sign_positive() {
        let held = pos.entry_price.checked_mul(pos.signed.abs())?;
        let added = price.checked_mul(delta.abs())?;
        let entry = held.checked_add(added)?.checked_div(signed.abs())?;
        return Some((PaperPosition { signed, entry_price: entry }, Decimal::ZERO));
    }

    let closed = delta.abs().min(pos.signed.abs());
    let direction = if pos.signed.is_sign_positive() { Decimal::ONE } else { -Decimal::ONE };
    let realized = price
        .checked_sub(pos.entry_price)?
        .checked_mul(closed)?
        .checked_mul(direction)?;

    let next = if signed.is_zero() {
        PaperPosition::default()
    } else if signed.is_sign_positive() == pos.signed.is_sign_positive() {
        PaperPosition { signed, entry_price: pos.entry_price }
    } else {
        // flipped through zero: the remainder opens at the fill price
        PaperPosition { signed, entry_price: price }
    };

    Some((next, realized))
}

fn out_of_range() -> AppError {
    AppError::PermanentGateway("Order size out of range.".to_string())
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    fn name(&self) -> &'static str {
        "Paper Trading"
    }

    async fn position_row(&self, symbol: &str) -> Result<Option<serde_json::Value>> {
        let book = self.book.lock();
        Ok(book
            .positions
            .get(symbol)
            .filter(|p| !p.signed.is_zero())
            .map(|p| {
                json!({
                    "coin": symbol,
                    "szi": p.signed.to_string(),
                    "entryPx": p.entry_price.to_string(),
                })
            }))
    }

    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck> {
        if order.amount <= Decimal::ZERO {
            return Err(AppError::Validation("Order size must be positive".to_string()));
        }

        let price = self.fill_price(&order.symbol).await?;

        let crosses = match order.side {
            OrderSide::Buy => price <= order.limit_price,
            OrderSide::Sell => price >= order.limit_price,
        };
        if !crosses {
            if order.time_in_force == TimeInForce::Ioc {
                return Err(classify_rejection(
                    "Order could not immediately match against any resting orders.",
                ));
            }
            let mut book = self.book.lock();
            let oid = book.next_order_id;
            book.next_order_id += 1;
            return Ok(OrderAck {
                order_id: Some(oid.to_string()),
                status: FillStatus::Resting,
                raw: json!({ "status": "ok", "paper": true }),
            });
        }

        let mut book = self.book.lock();
        let current = book.positions.get(&order.symbol).copied().unwrap_or_default();

        let mut amount = order.amount;
        if order.reduce_only {
            let reduces = !current.signed.is_zero()
                && current.signed.is_sign_positive() != order.side.is_buy();
            if !reduces {
                return Err(AppError::PermanentGateway(
                    "Reduce only order would increase position.".to_string(),
                ));
            }
            amount = amount.min(current.signed.abs());
        }

        let delta = if order.side.is_buy() { amount } else { -amount };
        let (next, realized) = apply_fill(current, delta, price).ok_or_else(out_of_range)?;

        let leverage = Decimal::from(*book.leverage.get(&order.symbol).unwrap_or(&1));
        let increases = next.signed.abs() > current.signed.abs();
        let margin = next
            .signed
            .abs()
            .checked_mul(price)
            .and_then(|notional| notional.checked_div(leverage))
            .ok_or_else(out_of_range)?;
        let balance = book.balance.checked_add(realized).ok_or_else(out_of_range)?;
        if increases && margin > balance {
            return Err(AppError::PermanentGateway(
                "Insufficient margin to place order.".to_string(),
            ));
        }

        book.balance = balance;
        book.positions.insert(order.symbol.clone(), next);
        let oid = book.next_order_id;
        book.next_order_id += 1;

        info!(
            "Paper fill: {} {} {} @ {} (position {}, realized {})",
            order.side, amount, order.symbol, price, next.signed, realized
        );

        Ok(OrderAck {
            order_id: Some(oid.to_string()),
            status: FillStatus::Filled {
                total_size: amount,
                avg_price: price,
            },
            raw: json!({
                "status": "ok",
                "paper": true,
                "cloid": order.client_order_id,
            }),
        })
    }

    async fn update_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        if leverage == 0 {
            return Err(AppError::Validation("Leverage must be at least 1".to_string()));
        }
        self.book.lock().leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn account_balance(&self) -> Result<Decimal> {
        Ok(self.book.lock().balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::mock::MockMarket;
    use rust_decimal_macros::dec;

    fn paper(price: Decimal) -> PaperExchange {
        let market = MockMarket::new().with_instrument("ETH", dec!(0.001), dec!(0.001), price);
        PaperExchange::new(Arc::new(market), dec!(10000))
    }

    fn order(side: OrderSide, amount: Decimal, limit: Decimal, reduce_only: bool) -> OrderRequest {
        OrderRequest {
            symbol: "ETH".to_string(),
            side,
            amount,
            limit_price: limit,
            reduce_only,
            time_in_force: TimeInForce::Ioc,
            client_order_id: None,
        }
    }

    #[tokio::test]
    async fn test_fill_moves_position() {
        let ex = paper(dec!(2000));
        ex.place_order(order(OrderSide::Buy, dec!(1.5), dec!(2100), false))
            .await
            .unwrap();

        let row = ex.position_row("ETH").await.unwrap().unwrap();
        assert_eq!(row["szi"], "1.5");
    }

    #[tokio::test]
    async fn test_ioc_outside_limit_is_transient() {
        let ex = paper(dec!(2000));
        let err = ex
            .place_order(order(OrderSide::Buy, dec!(1), dec!(1900), false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TransientGateway(_)));
        assert!(ex.position_row("ETH").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reduce_only_clamps_and_never_opens() {
        let ex = paper(dec!(2000));
        let err = ex
            .place_order(order(OrderSide::Sell, dec!(1), dec!(1900), true))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermanentGateway(_)));

        ex.place_order(order(OrderSide::Buy, dec!(2), dec!(2100), false))
            .await
            .unwrap();
        let ack = ex
            .place_order(order(OrderSide::Sell, dec!(5), dec!(1900), true))
            .await
            .unwrap();
        assert!(matches!(ack.status, FillStatus::Filled { total_size, .. } if total_size == dec!(2)));
        assert!(ex.position_row("ETH").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_margin_check() {
        let ex = paper(dec!(2000));
        let err = ex
            .place_order(order(OrderSide::Buy, dec!(10), dec!(2100), false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermanentGateway(_)));

        ex.update_leverage("ETH", 5).await.unwrap();
        assert!(ex
            .place_order(order(OrderSide::Buy, dec!(10), dec!(2100), false))
            .await
            .is_ok());
    }

    #[test]
    fn test_apply_fill_realizes_pnl() {
        let long = PaperPosition { signed: dec!(2), entry_price: dec!(100) };
        let (next, realized) = apply_fill(long, dec!(-3), dec!(110)).unwrap();
        assert_eq!(realized, dec!(20));
        assert_eq!(next.signed, dec!(-1));
        assert_eq!(next.entry_price, dec!(110));

        let (next, realized) = apply_fill(PaperPosition::default(), dec!(1), dec!(50)).unwrap();
        assert_eq!(realized, Decimal::ZERO);
        assert_eq!(next.entry_price, dec!(50));
    }

    #[tokio::test]
    async fn test_oversized_fill_is_rejected_not_panicking() {
        let ex = paper(dec!(2000));
        let huge = Decimal::MAX / dec!(1000);
        let err = ex
            .place_order(order(OrderSide::Buy, huge, dec!(2100), false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermanentGateway(ref m) if m.contains("out of range")));
        assert!(ex.position_row("ETH").await.unwrap().is_none());
    }
}

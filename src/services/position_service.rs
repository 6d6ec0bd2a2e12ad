//! Position Service
//!
//! Reads the net position for a symbol from the gateway and normalizes whatever
//! row shape it returns into a [`Position`].

use crate::brokers::types::{Position, PositionSide};
use crate::error::Result;
use crate::state::AppState;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fields carrying a signed quantity (positive long, negative short)
const SIGNED_FIELDS: &[&str] = &["szi", "signedSize", "signed_size", "netQty", "net_qty", "position"];

const SIDE_FIELDS: &[&str] = &["side", "direction", "positionSide"];

/// Fields carrying an unsigned magnitude next to a side field
const SIZE_FIELDS: &[&str] = &["size", "sz", "quantity", "qty", "amount", "contracts"];

/// Accepted row shapes, in resolution order
#[derive(Debug, Clone, PartialEq)]
pub enum PositionShape {
    Signed(Decimal),
    Sided { side: PositionSide, size: Decimal },
    Absent,
}

impl PositionShape {
    pub fn from_row(row: Option<&Value>) -> Self {
        let Some(row) = row else {
            return PositionShape::Absent;
        };
        // some gateways wrap the row: {"type": "oneWay", "position": {...}}
        let row = match row.get("position") {
            Some(inner) if inner.is_object() => inner,
            _ => row,
        };

        if let Some(signed) = first_decimal(row, SIGNED_FIELDS) {
            return PositionShape::Signed(signed);
        }

        let side = SIDE_FIELDS
            .iter()
            .find_map(|f| row.get(*f).and_then(Value::as_str))
            .and_then(parse_side);
        let size = first_decimal(row, SIZE_FIELDS);

        match (side, size) {
            (Some(side), Some(size)) => PositionShape::Sided { side, size },
            // magnitude without a side is read as signed
            (None, Some(size)) => PositionShape::Signed(size),
            _ => PositionShape::Absent,
        }
    }

    pub fn into_position(self) -> Position {
        match self {
            PositionShape::Signed(signed) => Position::from_signed(signed),
            PositionShape::Sided { side, size } => Position::new(side, size),
            PositionShape::Absent => Position::flat(),
        }
    }
}

fn parse_side(raw: &str) -> Option<PositionSide> {
    match raw.trim().to_lowercase().as_str() {
        "long" | "buy" | "b" | "bid" => Some(PositionSide::Long),
        "short" | "sell" | "a" | "ask" | "s" => Some(PositionSide::Short),
        "flat" | "none" | "both" => Some(PositionSide::Flat),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn first_decimal(row: &Value, fields: &[&str]) -> Option<Decimal> {
    fields.iter().find_map(|f| row.get(*f).and_then(as_decimal))
}

pub struct PositionService;

impl PositionService {
    /// Fresh net position for a symbol; FLAT when there is no gateway (demo)
    pub async fn get_position(state: &AppState, symbol: &str) -> Result<Position> {
        let Some(exchange) = &state.exchange else {
            return Ok(Position::flat());
        };

        let row = exchange.position_row(symbol).await?;
        debug!("Position row for {}: {:?}", symbol, row);

        let position = PositionShape::from_row(row.as_ref()).into_position();
        info!("PositionService::get_position - {} {:?} {}", symbol, position.side, position.size);
        Ok(position)
    }

    /// Poll until the position reads FLAT or the configured budget runs out.
    ///
    /// Returns whether FLAT was observed. Read errors count as "not yet flat".
    pub async fn wait_until_flat(state: &AppState, symbol: &str) -> bool {
        let interval = state.config.trading.flat_poll_interval;
        let deadline = Instant::now() + state.config.trading.flat_poll_timeout;

        loop {
            match Self::get_position(state, symbol).await {
                Ok(position) if position.is_flat() => return true,
                Ok(position) => debug!("{} not flat yet: {:?} {}", symbol, position.side, position.size),
                Err(e) => warn!("Position poll for {} failed: {}", symbol, e),
            }

            if Instant::now() + interval > deadline {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::mock::{state_with, MockExchange, MockMarket};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    fn read(row: Value) -> Position {
        PositionShape::from_row(Some(&row)).into_position()
    }

    #[test]
    fn test_signed_field_preferred() {
        assert_eq!(read(json!({"coin": "BTC", "szi": "-0.5"})), Position::short(dec!(0.5)));
        assert_eq!(read(json!({"netQty": 3, "side": "short"})), Position::long(dec!(3)));
    }

    #[test]
    fn test_wrapped_row() {
        let row = json!({"type": "oneWay", "position": {"coin": "ETH", "szi": "2.1", "entryPx": null}});
        assert_eq!(read(row), Position::long(dec!(2.1)));
    }

    #[test]
    fn test_side_and_magnitude() {
        assert_eq!(read(json!({"side": "SHORT", "size": "4"})), Position::short(dec!(4)));
        assert_eq!(read(json!({"side": "B", "sz": 1.25})), Position::long(dec!(1.25)));
        assert!(read(json!({"side": "long", "quantity": "0"})).is_flat());
    }

    #[test]
    fn test_missing_fields_read_flat() {
        assert!(read(json!({"coin": "BTC", "entryPx": "1"})).is_flat());
        assert!(read(json!({"side": "long"})).is_flat());
        assert!(read(json!({"szi": "garbage"})).is_flat());
        assert!(PositionShape::from_row(None).into_position().is_flat());
    }

    #[tokio::test]
    async fn test_get_position_from_gateway() {
        let market = Arc::new(MockMarket::new());
        let exchange = Arc::new(MockExchange::new().with_position("SOL", dec!(-12)));
        let state = state_with(market.clone(), Some(exchange));
        assert_eq!(
            PositionService::get_position(&state, "SOL").await.unwrap(),
            Position::short(dec!(12))
        );
        assert!(PositionService::get_position(&state, "BTC").await.unwrap().is_flat());

        let demo = state_with(market, None);
        assert!(PositionService::get_position(&demo, "SOL").await.unwrap().is_flat());
    }

    #[tokio::test]
    async fn test_wait_until_flat_gives_up() {
        let exchange = Arc::new(MockExchange::new().with_position("SOL", dec!(1)));
        let state = state_with(Arc::new(MockMarket::new()), Some(exchange));
        assert!(!PositionService::wait_until_flat(&state, "SOL").await);

        let exchange = Arc::new(MockExchange::new());
        let state = state_with(Arc::new(MockMarket::new()), Some(exchange));
        assert!(PositionService::wait_until_flat(&state, "SOL").await);
    }
}

//! Common venue types

use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Desired exposure direction carried by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Parse the charting platform's vocabulary (buy/sell/long/short)
    pub fn parse(action: &str) -> Result<Self> {
        match action.trim().to_lowercase().as_str() {
            "buy" | "long" => Ok(Direction::Long),
            "sell" | "short" => Ok(Direction::Short),
            other => Err(AppError::Validation(format!(
                "Invalid action '{}'. Use buy, sell, long or short",
                other
            ))),
        }
    }

    /// Side of an order that opens exposure in this direction
    pub fn opening_side(self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }
}

/// Side of a single order (distinct from the side of a position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn is_buy(self) -> bool {
        self == OrderSide::Buy
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

/// Net position on one instrument.
///
/// `size` is always a non-negative magnitude; `size == 0` exactly when `side == Flat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub side: PositionSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::Flat,
            size: Decimal::ZERO,
        }
    }

    pub fn long(size: Decimal) -> Self {
        Self::new(PositionSide::Long, size)
    }

    pub fn short(size: Decimal) -> Self {
        Self::new(PositionSide::Short, size)
    }

    /// Build from side + magnitude, collapsing any zero or flat input to FLAT
    pub fn new(side: PositionSide, size: Decimal) -> Self {
        let size = size.abs();
        if size.is_zero() || side == PositionSide::Flat {
            return Self::flat();
        }
        Self { side, size }
    }

    /// Build from a signed quantity (positive long, negative short)
    pub fn from_signed(signed: Decimal) -> Self {
        if signed > Decimal::ZERO {
            Self::long(signed)
        } else if signed < Decimal::ZERO {
            Self::short(-signed)
        } else {
            Self::flat()
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }

    pub fn direction(&self) -> Option<Direction> {
        match self.side {
            PositionSide::Long => Some(Direction::Long),
            PositionSide::Short => Some(Direction::Short),
            PositionSide::Flat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    Gtc,
    #[serde(rename = "IOC")]
    Ioc,
}

impl TimeInForce {
    /// Venue wire spelling
    pub fn as_wire(self) -> &'static str {
        match self {
            TimeInForce::Gtc => "Gtc",
            TimeInForce::Ioc => "Ioc",
        }
    }
}

impl FromStr for TimeInForce {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "GTC" => Ok(TimeInForce::Gtc),
            "IOC" => Ok(TimeInForce::Ioc),
            other => Err(AppError::Validation(format!(
                "Invalid time in force '{}'. Use GTC or IOC",
                other
            ))),
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
        }
    }
}

/// Instrument metadata as published by the venue; any precision field may be missing
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentMeta {
    pub symbol: String,
    pub asset_index: Option<u32>,
    pub amount_step: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub price_step: Option<Decimal>,
    pub max_leverage: Option<u32>,
}

/// Resolved quantization rules; `amount_step > 0` and `min_amount >= amount_step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstrumentRules {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_step: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub min_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_step: Decimal,
}

/// Fully formed order handed to the gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Aggressive limit anchoring a market-equivalent order
    #[serde(with = "rust_decimal::serde::float")]
    pub limit_price: Decimal,
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FillStatus {
    Filled {
        #[serde(with = "rust_decimal::serde::float")]
        total_size: Decimal,
        #[serde(with = "rust_decimal::serde::float")]
        avg_price: Decimal,
    },
    Resting,
    Accepted,
}

/// Gateway acknowledgement of an accepted order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub status: FillStatus,
    /// Raw venue response, echoed to the caller
    pub raw: serde_json::Value,
}

//! Hyperliquid wire types
//!
//! Field order matters: actions are msgpack-encoded in declaration order before
//! hashing, so these structs must mirror the venue's expected key order.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Largest number of decimals a perp price may carry before subtracting `szDecimals`
pub const MAX_PERP_DECIMALS: u32 = 6;

/// Significant figures allowed in a non-integer price
pub const MAX_SIG_FIGS: u32 = 5;

// ============================================================================
// Actions (signed, POST /exchange)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LimitWire {
    pub tif: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderTypeWire {
    pub limit: LimitWire,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWire {
    /// Asset index in the perp universe
    pub a: u32,
    /// Is buy
    pub b: bool,
    /// Limit price
    pub p: String,
    /// Size
    pub s: String,
    /// Reduce only
    pub r: bool,
    pub t: OrderTypeWire,
    /// Client order id (128-bit hex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub orders: Vec<OrderWire>,
    pub grouping: String,
}

impl OrderAction {
    pub fn single(order: OrderWire) -> Self {
        Self {
            action_type: "order".to_string(),
            orders: vec![order],
            grouping: "na".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateLeverageAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub asset: u32,
    #[serde(rename = "isCross")]
    pub is_cross: bool,
    pub leverage: u32,
}

impl UpdateLeverageAction {
    pub fn cross(asset: u32, leverage: u32) -> Self {
        Self {
            action_type: "updateLeverage".to_string(),
            asset,
            is_cross: true,
            leverage,
        }
    }
}

// ============================================================================
// Info responses (POST /info)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub name: String,
    pub sz_decimals: u32,
    #[serde(default)]
    pub max_leverage: Option<u32>,
    #[serde(default)]
    pub is_delisted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetInfo>,
}

impl Meta {
    /// Find an asset by name, returning its universe index
    pub fn find(&self, symbol: &str) -> Option<(u32, &AssetInfo)> {
        self.universe
            .iter()
            .enumerate()
            .find(|(_, a)| a.name.eq_ignore_ascii_case(symbol) && !a.is_delisted.unwrap_or(false))
            .map(|(i, a)| (i as u32, a))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub mark_px: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub mid_px: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub oracle_px: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    #[serde(deserialize_with = "deserialize_decimal")]
    pub px: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub sz: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct L2Book {
    /// `[bids, asks]`, best level first
    pub levels: Vec<Vec<BookLevel>>,
}

impl L2Book {
    pub fn mid(&self) -> Option<Decimal> {
        let bid = self.levels.first()?.first()?.px;
        let ask = self.levels.get(1)?.first()?.px;
        if bid <= Decimal::ZERO || ask <= Decimal::ZERO {
            return None;
        }
        Some((bid + ask) / Decimal::TWO)
    }
}

// ============================================================================
// Number formatting
// ============================================================================

/// Venue spelling of a size: plain decimal, no trailing zeros
pub fn size_to_wire(size: Decimal) -> String {
    size.normalize().to_string()
}

/// Round a price to what the venue accepts: integers always, otherwise at most
/// five significant figures and `6 - szDecimals` decimals.
pub fn round_price(px: Decimal, sz_decimals: u32) -> Decimal {
    if px <= Decimal::ZERO || px.fract().is_zero() {
        return px.normalize();
    }

    let max_decimals = MAX_PERP_DECIMALS.saturating_sub(sz_decimals);
    let int_digits = if px >= Decimal::ONE {
        px.trunc().normalize().to_string().len() as u32
    } else {
        0
    };

    let sig_decimals = if int_digits >= MAX_SIG_FIGS {
        0
    } else if int_digits > 0 {
        MAX_SIG_FIGS - int_digits
    } else {
        let mut scaled = px;
        let mut leading_zeros = 0;
        while scaled < Decimal::new(1, 1) {
            scaled *= Decimal::TEN;
            leading_zeros += 1;
        }
        leading_zeros + MAX_SIG_FIGS
    };

    px.round_dp(sig_decimals.min(max_decimals)).normalize()
}

pub fn price_to_wire(px: Decimal, sz_decimals: u32) -> String {
    round_price(px, sz_decimals).to_string()
}

fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_optional_decimal(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a decimal"))
}

/// Accept a decimal encoded as a string or a number; empty or null is `None`
pub fn deserialize_optional_decimal<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Float(f64),
        Int(i64),
    }

    match Option::<StringOrNumber>::deserialize(deserializer)? {
        Some(StringOrNumber::String(s)) if s.trim().is_empty() => Ok(None),
        Some(StringOrNumber::String(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
        Some(StringOrNumber::Float(f)) => Decimal::try_from(f).map(Some).map_err(serde::de::Error::custom),
        Some(StringOrNumber::Int(i)) => Ok(Some(Decimal::from(i))),
        None => Ok(None),
    }
}

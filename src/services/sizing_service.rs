//! Sizing Service
//!
//! Turns a requested size (base units or USD notional) into an amount the venue
//! will accept, and derives the aggressive limit that anchors a market order.

use crate::brokers::types::{InstrumentMeta, InstrumentRules, OrderSide};
use crate::error::{AppError, Result};
use crate::services::QuotesService;
use crate::state::AppState;
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Step used when the venue omits precision metadata (1e-8)
pub fn fallback_step() -> Decimal {
    Decimal::new(1, 8)
}

fn out_of_range() -> AppError {
    AppError::Validation("Order size out of range".to_string())
}

/// `value` snapped onto the `step` grid with `snap` (floor or ceil)
fn snap_to_step(value: Decimal, step: Decimal, snap: fn(&Decimal) -> Decimal) -> Result<Decimal> {
    value
        .checked_div(step)
        .map(|units| snap(&units))
        .and_then(|units| units.checked_mul(step))
        .ok_or_else(out_of_range)
}

pub struct SizingService;

impl SizingService {
    /// Resolve quantization rules; missing or non-positive steps fall back to 1e-8
    pub fn rules_from_meta(meta: &InstrumentMeta) -> InstrumentRules {
        let positive = |v: Option<Decimal>| v.filter(|d| *d > Decimal::ZERO);

        let amount_step = positive(meta.amount_step).unwrap_or_else(|| {
            warn!("{} has no amount step, using {}", meta.symbol, fallback_step());
            fallback_step()
        });
        let price_step = positive(meta.price_step).unwrap_or_else(fallback_step);
        let min_amount = positive(meta.min_amount)
            .unwrap_or(amount_step)
            .max(amount_step);

        InstrumentRules {
            amount_step,
            min_amount,
            price_step,
        }
    }

    pub async fn rules(state: &AppState, symbol: &str) -> Result<InstrumentRules> {
        let meta = state
            .market
            .instrument_meta(symbol)
            .await?
            .ok_or_else(|| AppError::SymbolNotFound(symbol.to_string()))?;
        Ok(Self::rules_from_meta(&meta))
    }

    /// Floor to the step; a positive request never becomes zero or drops below
    /// the minimum.
    pub fn quantize_with(rules: &InstrumentRules, raw_amount: Decimal) -> Result<Decimal> {
        if raw_amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Order size must be positive, got {}",
                raw_amount
            )));
        }

        let step = rules.amount_step;
        let mut amount = snap_to_step(raw_amount, step, Decimal::floor)?;

        if amount <= Decimal::ZERO {
            amount = step;
        }
        if amount < rules.min_amount {
            amount = rules.min_amount;
        }

        // a minimum that is not itself on the step grid rounds up onto it
        if !(amount % step).is_zero() {
            amount = snap_to_step(amount, step, Decimal::ceil)?;
        }

        Ok(amount.normalize())
    }

    pub async fn quantize(state: &AppState, symbol: &str, raw_amount: Decimal) -> Result<Decimal> {
        let rules = Self::rules(state, symbol).await?;
        Self::quantize_with(&rules, raw_amount)
    }

    /// Convert notional at `price` and check the result clears the tradable floor
    pub fn amount_from_notional_with(
        rules: &InstrumentRules,
        symbol: &str,
        notional_usd: Decimal,
        price: Decimal,
    ) -> Result<Decimal> {
        if notional_usd <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Notional must be positive, got {}",
                notional_usd
            )));
        }
        if price <= Decimal::ZERO {
            return Err(AppError::PriceUnavailable(symbol.to_string()));
        }

        let raw_amount = notional_usd.checked_div(price).ok_or_else(out_of_range)?;
        let amount = Self::quantize_with(rules, raw_amount)?;

        let minimum = rules.min_amount.checked_mul(price).ok_or_else(out_of_range)?;
        if notional_usd < minimum {
            return Err(AppError::BelowMinimumNotional {
                symbol: symbol.to_string(),
                requested: notional_usd,
                minimum: minimum.normalize(),
            });
        }

        debug!(
            "{} USD of {} at {} -> {}",
            notional_usd, symbol, price, amount
        );
        Ok(amount)
    }

    pub async fn amount_from_notional(
        state: &AppState,
        symbol: &str,
        notional_usd: Decimal,
    ) -> Result<Decimal> {
        let rules = Self::rules(state, symbol).await?;
        let price = QuotesService::reference_price(state, symbol).await?;
        Self::amount_from_notional_with(&rules, symbol, notional_usd, price)
    }

    /// Target amount for a signal: explicit quantity wins over notional, which
    /// wins over the configured default notional.
    pub async fn target_amount(
        state: &AppState,
        symbol: &str,
        quantity: Option<Decimal>,
        notional_usd: Option<Decimal>,
    ) -> Result<Decimal> {
        match (quantity, notional_usd.or(state.config.trading.default_notional_usd)) {
            (Some(qty), _) => Self::quantize(state, symbol, qty).await,
            (None, Some(notional)) => Self::amount_from_notional(state, symbol, notional).await,
            (None, None) => Err(AppError::Validation(
                "Either quantity or notional is required".to_string(),
            )),
        }
    }

    /// Aggressive limit: `reference * (1 ± slippage)`, rounded away from the
    /// book onto the price grid.
    pub fn limit_price(
        rules: &InstrumentRules,
        side: OrderSide,
        reference: Decimal,
        slippage: Decimal,
    ) -> Result<Decimal> {
        let step = rules.price_step;
        let px = match side {
            OrderSide::Buy => {
                let raw = reference.checked_mul(Decimal::ONE + slippage).ok_or_else(out_of_range)?;
                snap_to_step(raw, step, Decimal::ceil)?
            }
            OrderSide::Sell => {
                let raw = reference.checked_mul(Decimal::ONE - slippage).ok_or_else(out_of_range)?;
                snap_to_step(raw, step, Decimal::floor)?
            }
        };
        Ok(px.max(step).normalize())
    }
}

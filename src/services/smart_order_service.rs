//! Smart Order Service
//!
//! Reconciles the account's net position on a symbol with the direction a
//! signal asks for. The state is re-derived from the gateway on every signal:
//!
//! - FLAT: open `target` in the signal direction
//! - ALIGNED: hold, or add `target` when the policy is `scale`
//! - OPPOSED: reduce-only close of the whole position, wait for FLAT, then open

use crate::brokers::types::{Direction, OrderSide, Position, TimeInForce};
use crate::config::AlignedPolicy;
use crate::error::Result;
use crate::services::{OrderService, PositionService, SubmittedOrder};
use crate::state::AppState;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

pub const WARNING_NOT_FLAT: &str = "not_flat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReconcileState {
    Flat,
    Aligned,
    Opposed,
}

impl ReconcileState {
    pub fn classify(position: &Position, desired: Direction) -> Self {
        match position.direction() {
            None => ReconcileState::Flat,
            Some(d) if d == desired => ReconcileState::Aligned,
            Some(_) => ReconcileState::Opposed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LegPurpose {
    /// Flatten an opposed position before flipping
    Close,
    /// Open from flat
    Open,
    /// Add to an aligned position
    Scale,
    /// Shrink an opposed position without flipping
    Reduce,
}

/// One order the reconciler decided on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedOrder {
    pub purpose: LegPurpose,
    pub side: OrderSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub reduce_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcilePlan {
    pub state: ReconcileState,
    /// Closing legs always precede opening legs
    pub orders: Vec<PlannedOrder>,
}

/// A sized, resolved signal ready for reconciliation
#[derive(Debug, Clone)]
pub struct SmartOrderRequest {
    pub symbol: String,
    pub direction: Direction,
    /// Already quantized
    pub target_amount: Decimal,
    pub time_in_force: TimeInForce,
    pub leverage: Option<u32>,
    pub reduce_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Every planned order was accepted
    Complete,
    /// Nothing needed doing
    NoAction,
    /// The close went through but the open did not
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegResult {
    #[serde(flatten)]
    pub planned: PlannedOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SubmittedOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmartOrderResult {
    pub status: ExecutionStatus,
    pub state: ReconcileState,
    pub position_before: Position,
    pub legs: Vec<LegResult>,
    pub warnings: Vec<String>,
}

impl SmartOrderResult {
    pub fn is_partial(&self) -> bool {
        self.status == ExecutionStatus::Partial
    }

    pub fn error_message(&self) -> Option<&str> {
        self.legs.iter().find_map(|l| l.error.as_deref())
    }
}

pub struct SmartOrderService;

impl SmartOrderService {
    /// Decide which orders take `position` to the desired exposure
    pub fn plan(
        position: &Position,
        desired: Direction,
        target_amount: Decimal,
        policy: AlignedPolicy,
        reduce_only: bool,
    ) -> ReconcilePlan {
        let state = ReconcileState::classify(position, desired);
        let open_side = desired.opening_side();

        let leg = |purpose, amount, reduce_only| PlannedOrder {
            purpose,
            side: open_side,
            amount,
            reduce_only,
        };

        let orders = match (state, reduce_only) {
            // a reduce-only signal can only shrink what is already there
            (ReconcileState::Opposed, true) => vec![leg(
                LegPurpose::Reduce,
                target_amount.min(position.size),
                true,
            )],
            (_, true) => vec![],
            (ReconcileState::Flat, false) => vec![leg(LegPurpose::Open, target_amount, false)],
            (ReconcileState::Aligned, false) => match policy {
                AlignedPolicy::Hold => vec![],
                AlignedPolicy::Scale => vec![leg(LegPurpose::Scale, target_amount, false)],
            },
            (ReconcileState::Opposed, false) => vec![
                leg(LegPurpose::Close, position.size, true),
                leg(LegPurpose::Open, target_amount, false),
            ],
        };

        ReconcilePlan { state, orders }
    }

    /// Read the live position and plan against it without submitting anything
    pub async fn preview(state: &AppState, req: &SmartOrderRequest) -> Result<(Position, ReconcilePlan)> {
        let position = PositionService::get_position(state, &req.symbol).await?;
        let plan = Self::plan(
            &position,
            req.direction,
            req.target_amount,
            state.config.trading.aligned_policy,
            req.reduce_only,
        );
        Ok((position, plan))
    }

    /// Reconcile and submit.
    ///
    /// A failed close aborts before anything is opened and surfaces as `Err`.
    /// A failed open after a successful close is reported as `Partial`.
    pub async fn execute(state: &AppState, req: SmartOrderRequest) -> Result<SmartOrderResult> {
        info!(
            "SmartOrderService::execute - {} {:?} target={} reduce_only={}",
            req.symbol, req.direction, req.target_amount, req.reduce_only
        );

        let (position, plan) = Self::preview(state, &req).await?;
        info!(
            "{} is {:?} ({:?} {}), {} order(s) planned",
            req.symbol,
            plan.state,
            position.side,
            position.size,
            plan.orders.len()
        );

        let mut result = SmartOrderResult {
            status: ExecutionStatus::NoAction,
            state: plan.state,
            position_before: position,
            legs: Vec::with_capacity(plan.orders.len()),
            warnings: Vec::new(),
        };

        if plan.orders.is_empty() {
            return Ok(result);
        }

        for planned in plan.orders {
            let closes_first = planned.purpose == LegPurpose::Close;

            if !planned.reduce_only {
                if let Some(leverage) = req.leverage {
                    Self::apply_leverage(state, &req.symbol, leverage, &mut result.warnings).await;
                }
            }

            let submitted = OrderService::submit_market_order(
                state,
                &req.symbol,
                planned.side,
                planned.amount,
                req.time_in_force,
                planned.reduce_only,
            )
            .await;

            match submitted {
                Ok(order) => {
                    result.legs.push(LegResult {
                        planned,
                        order: Some(order),
                        error: None,
                    });

                    if closes_first && !PositionService::wait_until_flat(state, &req.symbol).await {
                        warn!("{} did not read FLAT after close, opening anyway", req.symbol);
                        result.warnings.push(WARNING_NOT_FLAT.to_string());
                    }
                }
                // nothing has been submitted yet: surface the error as is
                Err(e) if result.legs.is_empty() => return Err(e),
                Err(e) => {
                    error!(
                        "{} closed but the opening order failed: {}",
                        req.symbol, e
                    );
                    result.legs.push(LegResult {
                        planned,
                        order: None,
                        error: Some(e.to_string()),
                    });
                    result.status = ExecutionStatus::Partial;
                    return Ok(result);
                }
            }
        }

        result.status = ExecutionStatus::Complete;
        Ok(result)
    }

    /// Best effort: a rejected leverage update becomes a warning
    async fn apply_leverage(state: &AppState, symbol: &str, leverage: u32, warnings: &mut Vec<String>) {
        let Some(exchange) = &state.exchange else {
            return;
        };
        match exchange.update_leverage(symbol, leverage).await {
            Ok(()) => info!("Leverage for {} set to {}x", symbol, leverage),
            Err(e) => {
                warn!("Leverage update for {} to {}x failed: {}", symbol, leverage, e);
                warnings.push(format!("leverage_not_applied: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::mock::{state_with, MockExchange, MockMarket};
    use crate::error::AppError;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn request(direction: Direction, target: Decimal) -> SmartOrderRequest {
        SmartOrderRequest {
            symbol: "BTC".to_string(),
            direction,
            target_amount: target,
            time_in_force: TimeInForce::Ioc,
            leverage: None,
            reduce_only: false,
        }
    }

    fn setup(signed: Decimal) -> (Arc<MockExchange>, AppState) {
        let market = MockMarket::new().with_instrument("BTC", dec!(0.0001), dec!(0.0001), dec!(50000));
        let exchange = Arc::new(MockExchange::new().with_position("BTC", signed));
        let state = state_with(Arc::new(market), Some(exchange.clone()));
        (exchange, state)
    }

    fn shape(plan: &ReconcilePlan) -> Vec<(OrderSide, Decimal, bool)> {
        plan.orders.iter().map(|o| (o.side, o.amount, o.reduce_only)).collect()
    }

    #[test]
    fn test_plan_flip() {
        let plan = SmartOrderService::plan(
            &Position::short(dec!(5)),
            Direction::Long,
            dec!(3),
            AlignedPolicy::Hold,
            false,
        );
        assert_eq!(plan.state, ReconcileState::Opposed);
        assert_eq!(
            shape(&plan),
            vec![(OrderSide::Buy, dec!(5), true), (OrderSide::Buy, dec!(3), false)]
        );
    }

    #[test]
    fn test_plan_aligned_policies() {
        let long = Position::long(dec!(3));
        let hold = SmartOrderService::plan(&long, Direction::Long, dec!(3), AlignedPolicy::Hold, false);
        assert_eq!(hold.state, ReconcileState::Aligned);
        assert!(hold.orders.is_empty());

        let scale = SmartOrderService::plan(&long, Direction::Long, dec!(3), AlignedPolicy::Scale, false);
        assert_eq!(shape(&scale), vec![(OrderSide::Buy, dec!(3), false)]);
        assert_eq!(scale.orders[0].purpose, LegPurpose::Scale);
    }

    #[test]
    fn test_plan_flat_open() {
        let plan = SmartOrderService::plan(&Position::flat(), Direction::Short, dec!(2), AlignedPolicy::Hold, false);
        assert_eq!(plan.state, ReconcileState::Flat);
        assert_eq!(shape(&plan), vec![(OrderSide::Sell, dec!(2), false)]);
    }

    #[test]
    fn test_plan_reduce_only() {
        let short = Position::short(dec!(5));
        let plan = SmartOrderService::plan(&short, Direction::Long, dec!(8), AlignedPolicy::Scale, true);
        assert_eq!(shape(&plan), vec![(OrderSide::Buy, dec!(5), true)]);

        let plan = SmartOrderService::plan(&short, Direction::Long, dec!(2), AlignedPolicy::Scale, true);
        assert_eq!(shape(&plan), vec![(OrderSide::Buy, dec!(2), true)]);

        for pos in [Position::flat(), Position::long(dec!(1))] {
            let plan = SmartOrderService::plan(&pos, Direction::Long, dec!(1), AlignedPolicy::Scale, true);
            assert!(plan.orders.is_empty());
        }
    }

    #[tokio::test]
    async fn test_execute_flip_ends_in_one_position() {
        let (exchange, state) = setup(dec!(-5));
        let result = SmartOrderService::execute(&state, request(Direction::Long, dec!(3)))
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Complete);
        assert!(result.warnings.is_empty());
        let sent: Vec<_> = exchange
            .orders()
            .iter()
            .map(|o| (o.side, o.amount, o.reduce_only))
            .collect();
        assert_eq!(
            sent,
            vec![(OrderSide::Buy, dec!(5), true), (OrderSide::Buy, dec!(3), false)]
        );
        assert_eq!(exchange.signed_position("BTC"), dec!(3));
    }

    #[tokio::test]
    async fn test_execute_aligned_hold_submits_nothing() {
        let (exchange, state) = setup(dec!(3));
        let result = SmartOrderService::execute(&state, request(Direction::Long, dec!(3)))
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::NoAction);
        assert!(exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_failed_close_aborts_open() {
        let (exchange, state) = setup(dec!(-5));
        exchange.fail_next(AppError::PermanentGateway("Insufficient margin".into()));

        let err = SmartOrderService::execute(&state, request(Direction::Long, dec!(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermanentGateway(_)));
        assert_eq!(exchange.orders().len(), 1);
        assert_eq!(exchange.signed_position("BTC"), dec!(-5));
    }

    #[tokio::test]
    async fn test_failed_open_after_close_is_partial() {
        let market = MockMarket::new().with_instrument("BTC", dec!(0.0001), dec!(0.0001), dec!(50000));
        let exchange = Arc::new(MockExchange::new().with_position("BTC", dec!(-5)));
        let state = state_with(Arc::new(market), Some(exchange.clone()));

        // close succeeds, open is rejected permanently
        exchange.fail_order(2, AppError::PermanentGateway("Open interest is at cap".into()));
        let result = SmartOrderService::execute(&state, request(Direction::Long, dec!(3))).await;
        let result = result.unwrap();

        assert!(result.is_partial());
        assert_eq!(result.legs.len(), 2);
        assert!(result.legs[0].order.is_some());
        assert!(result.error_message().unwrap().contains("Open interest"));
        assert_eq!(exchange.signed_position("BTC"), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_not_flat_warning_still_opens() {
        let market = MockMarket::new().with_instrument("BTC", dec!(0.0001), dec!(0.0001), dec!(50000));
        let exchange = Arc::new(MockExchange::new().with_position("BTC", dec!(-5)).pinned());
        let state = state_with(Arc::new(market), Some(exchange.clone()));

        let result = SmartOrderService::execute(&state, request(Direction::Long, dec!(3)))
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Complete);
        assert_eq!(result.warnings, vec![WARNING_NOT_FLAT.to_string()]);
        assert_eq!(exchange.orders().len(), 2);
    }

    #[tokio::test]
    async fn test_leverage_rejection_is_a_warning() {
        let market = MockMarket::new().with_instrument("BTC", dec!(0.0001), dec!(0.0001), dec!(50000));
        let exchange = Arc::new(MockExchange::new().rejecting_leverage());
        let state = state_with(Arc::new(market), Some(exchange.clone()));

        let mut req = request(Direction::Short, dec!(0.01));
        req.leverage = Some(10);
        let result = SmartOrderService::execute(&state, req).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Complete);
        assert_eq!(exchange.leverage_calls(), vec![("BTC".to_string(), 10)]);
        assert!(result.warnings[0].starts_with("leverage_not_applied"));
        assert_eq!(exchange.signed_position("BTC"), dec!(-0.01));
    }
}

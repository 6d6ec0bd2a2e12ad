//! HTTP handlers for the webhook server

use crate::brokers::types::{Direction, TimeInForce};
use crate::config::TradingMode;
use crate::error::{AppError, Result};
use crate::services::{
    ExecutionStatus, SizingService, SmartOrderRequest, SmartOrderService, SymbolService,
};
use crate::state::AppState;
use crate::webhook::types::*;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Header carrying the shared secret, as an alternative to the payload field
pub const SECRET_HEADER: &str = "x-webhook-secret";

// ============================================================================
// Health Check
// ============================================================================

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let balance = match &state.exchange {
        Some(exchange) => exchange.account_balance().await.unwrap_or_else(|e| {
            warn!("Balance lookup failed: {}", e);
            Decimal::ZERO
        }),
        None => Decimal::ZERO,
    };

    Json(HealthResponse {
        status: "healthy",
        trading: state.mode.as_str(),
        balance,
        credentials_set: state.config.exchange.credentials_set(),
        network: state.config.exchange.network(),
    })
}

/// GET /
pub async fn home(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "message": "TradingView -> Hyperliquid Webhook Server",
        "endpoints": {
            "health": "/health (GET)",
            "webhook": "/webhook/tradingview (POST)",
            "webhook_alias": "/webhook (POST)",
        },
        "status": "ACTIVE",
        "mode": state.mode.as_str(),
    }))
}

// ============================================================================
// Webhook
// ============================================================================

/// POST /webhook and /webhook/tradingview
///
/// The body is read raw so alerts sent without a JSON content type still parse.
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match process_signal(&state, &headers, &body).await {
        Ok(response) => response,
        Err(e) => error_response(&e, &body),
    }
}

fn error_response(err: &AppError, body: &[u8]) -> Response {
    if err.is_unexpected() {
        error!(
            "Unexpected failure handling webhook: {} (body: {})",
            err,
            String::from_utf8_lossy(body)
        );
    } else {
        warn!("Webhook rejected: {}", err);
    }

    (err.status_code(), Json(ApiResponse::<Value>::error(err))).into_response()
}

fn check_secret(state: &AppState, headers: &HeaderMap, payload: &WebhookPayload) -> Result<()> {
    let expected = &state.config.server.webhook_secret;
    if expected.is_empty() {
        return Ok(());
    }

    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(payload.secret.as_deref());

    match provided {
        Some(secret) if secret == expected => Ok(()),
        Some(_) => Err(AppError::Unauthorized("Invalid webhook secret".to_string())),
        None => Err(AppError::Unauthorized("Missing webhook secret".to_string())),
    }
}

/// Leverage is a hint: anything unusable is dropped with a warning
fn leverage_hint(raw: Option<Decimal>) -> Option<u32> {
    let raw = raw?;
    match raw.round().to_u32().filter(|l| *l >= 1) {
        Some(leverage) => Some(leverage),
        None => {
            warn!("Ignoring unusable leverage hint {}", raw);
            None
        }
    }
}

async fn process_signal(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response> {
    let payload = WebhookPayload::parse(body)?;
    info!("Received alert: {:?}", WebhookPayload { secret: None, ..payload.clone() });

    check_secret(state, headers, &payload)?;

    let direction = Direction::parse(payload.action()?)?;
    let raw_symbol = payload.symbol()?;
    let time_in_force = match payload.tif.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(tif) => tif.parse::<TimeInForce>()?,
        None => state.config.trading.default_tif,
    };

    let meta = SymbolService::resolve(state, raw_symbol).await?;
    let symbol = meta.symbol;

    let target_amount =
        SizingService::target_amount(state, &symbol, payload.quantity, payload.notional).await?;

    let request = SmartOrderRequest {
        symbol: symbol.clone(),
        direction,
        target_amount,
        time_in_force,
        leverage: leverage_hint(payload.leverage),
        reduce_only: payload.reduce_only,
    };

    let side = direction.opening_side().to_string().to_uppercase();

    if state.mode == TradingMode::Demo {
        let (position, plan) = SmartOrderService::preview(state, &request).await?;
        info!("[DEMO] {} {} {} ({} order(s) planned)", symbol, side, target_amount, plan.orders.len());

        let response = ApiResponse::demo(format!("[DEMO] {} {} {}", symbol, side, target_amount))
            .with_symbol(&symbol)
            .with_amount(target_amount)
            .with_mode(state.mode.as_str())
            .with_data(json!({
                "note": "Trading credentials not set; nothing was submitted",
                "time_in_force": time_in_force,
                "position": position,
                "plan": plan,
            }));
        return Ok((StatusCode::OK, Json(response)).into_response());
    }

    let result = SmartOrderService::execute(state, request).await?;
    let data = serde_json::to_value(&result)?;

    let (status, response) = match result.status {
        ExecutionStatus::Partial => {
            let cause = result.error_message().unwrap_or("opening order failed");
            (
                StatusCode::BAD_REQUEST,
                ApiResponse::partial(format!(
                    "Closed {} position but the opening order failed: {}",
                    symbol, cause
                )),
            )
        }
        ExecutionStatus::NoAction => (
            StatusCode::OK,
            ApiResponse::success(format!(
                "No action: {} position already {:?}",
                symbol, result.state
            )),
        ),
        ExecutionStatus::Complete => (
            StatusCode::OK,
            ApiResponse::success(format!("Trade executed: {} {} {}", symbol, side, target_amount)),
        ),
    };

    let response = response
        .with_symbol(&symbol)
        .with_amount(target_amount)
        .with_mode(state.mode.as_str())
        .with_data(data);

    Ok((status, Json(response)).into_response())
}

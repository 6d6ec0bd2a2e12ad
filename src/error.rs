//! Application error types

use axum::http::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("Notional {requested} USD is below the minimum tradable notional {minimum} USD for {symbol}")]
    BelowMinimumNotional {
        symbol: String,
        requested: Decimal,
        minimum: Decimal,
    },

    /// Venue rejected the order for a reason that may clear on retry
    #[error("Transient gateway error: {0}")]
    TransientGateway(String),

    /// Venue rejected the order for a reason a retry cannot fix
    #[error("Gateway rejected request: {0}")]
    PermanentGateway(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status surfaced to the webhook caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::SymbolNotFound(_)
            | AppError::PriceUnavailable(_)
            | AppError::BelowMinimumNotional { .. }
            | AppError::TransientGateway(_)
            | AppError::PermanentGateway(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Http(_)
            | AppError::Serialization(_)
            | AppError::Signing(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::SymbolNotFound(_) => "SYMBOL_NOT_FOUND",
            AppError::PriceUnavailable(_) => "PRICE_UNAVAILABLE",
            AppError::BelowMinimumNotional { .. } => "BELOW_MINIMUM_NOTIONAL",
            AppError::TransientGateway(_) => "TRANSIENT_GATEWAY_ERROR",
            AppError::PermanentGateway(_) => "GATEWAY_REJECTED",
            AppError::Http(_) => "HTTP_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Signing(_) => "SIGNING_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error belongs to the unexpected (500) class
    pub fn is_unexpected(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Structured extras the caller can use to correct the request
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::BelowMinimumNotional {
                symbol,
                requested,
                minimum,
            } => Some(json!({
                "symbol": symbol,
                "requested": requested.to_f64(),
                "minimum": minimum.to_f64(),
            })),
            _ => None,
        }
    }
}

/// Serializable error body embedded in webhook responses
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

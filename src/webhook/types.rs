//! Webhook wire types

use crate::error::{AppError, ErrorResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Flexible deserializers (charting platforms template numbers as strings)
// ============================================================================

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleOptDecimal {
        Str(String),
        Int(i64),
        Float(f64),
    }

    match Option::<FlexibleOptDecimal>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FlexibleOptDecimal::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(FlexibleOptDecimal::Str(s)) => s
            .trim()
            .parse::<Decimal>()
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(FlexibleOptDecimal::Int(i)) => Ok(Some(Decimal::from(i))),
        Some(FlexibleOptDecimal::Float(f)) => Decimal::try_from(f)
            .map(|d| Some(d.normalize()))
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleBool {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Option::<FlexibleBool>::deserialize(deserializer)? {
        None => Ok(false),
        Some(FlexibleBool::Bool(b)) => Ok(b),
        Some(FlexibleBool::Int(i)) => Ok(i != 0),
        Some(FlexibleBool::Str(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Ok(true),
            "false" | "0" | "no" | "n" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean '{}'", other))),
        },
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Alert body posted by the charting platform
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub symbol: Option<String>,

    /// buy / sell / long / short
    #[serde(default, alias = "side")]
    pub action: Option<String>,

    /// Base units
    #[serde(default, alias = "qty", alias = "size", deserialize_with = "deserialize_optional_decimal")]
    pub quantity: Option<Decimal>,

    /// Quote-currency value, converted at the reference price
    #[serde(default, alias = "notional_usd", alias = "usd", deserialize_with = "deserialize_optional_decimal")]
    pub notional: Option<Decimal>,

    #[serde(default, alias = "time_in_force")]
    pub tif: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub leverage: Option<Decimal>,

    #[serde(default, deserialize_with = "deserialize_flexible_bool")]
    pub reduce_only: bool,

    #[serde(default, alias = "passphrase")]
    pub secret: Option<String>,
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::Validation("Empty request body".to_string()));
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid JSON: {}", e)))
    }

    pub fn symbol(&self) -> Result<&str, AppError> {
        self.symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("Missing symbol".to_string()))
    }

    pub fn action(&self) -> Result<&str, AppError> {
        self.action
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("Missing action (buy, sell, long or short)".to_string()))
    }
}

// ============================================================================
// Outbound
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl<T: Serialize> ApiResponse<T> {
    fn with_status(status: &str, message: String) -> Self {
        Self {
            status: status.to_string(),
            message,
            symbol: None,
            amount: None,
            mode: None,
            data: None,
            error: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::with_status("success", message.into())
    }

    pub fn demo(message: impl Into<String>) -> Self {
        Self::with_status("demo", message.into())
    }

    pub fn error(err: &AppError) -> Self {
        let mut response = Self::with_status("error", err.to_string());
        response.error = Some(ErrorResponse::from(err));
        response
    }

    /// Close went through, open did not: reported as an error, never as success
    pub fn partial(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut response = Self::with_status("error", message.clone());
        response.error = Some(ErrorResponse {
            code: "PARTIAL_EXECUTION".to_string(),
            message,
            details: None,
        });
        response
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }
}

/// GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub trading: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub credentials_set: bool,
    pub network: &'static str,
}

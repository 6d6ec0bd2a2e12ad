//! Environment configuration
//!
//! Values come from the process environment, optionally seeded from a `.env` file.

use crate::brokers::types::TimeInForce;
use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// What to do when a signal matches the direction of the open position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignedPolicy {
    /// Leave the position as is
    Hold,
    /// Add `target_amount` on top of the position
    Scale,
}

impl FromStr for AlignedPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hold" | "noop" | "none" => Ok(AlignedPolicy::Hold),
            "scale" | "add" => Ok(AlignedPolicy::Scale),
            other => Err(AppError::Config(format!(
                "Invalid ALIGNED_POLICY '{}'. Use hold or scale",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    /// Orders go to the venue
    Live,
    /// Orders fill against an in-process simulator
    Paper,
    /// Orders are planned and echoed, never submitted
    Demo,
}

impl TradingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TradingMode::Live => "active",
            TradingMode::Paper => "paper",
            TradingMode::Demo => "demo",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret alerts must carry; empty disables the check
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub use_testnet: bool,
    pub account_address: Option<String>,
    pub secret_key: Option<String>,
    pub paper_trading: bool,
    pub paper_balance_usd: Decimal,
    pub http_timeout: Duration,
}

impl ExchangeConfig {
    pub fn credentials_set(&self) -> bool {
        self.account_address.is_some() && self.secret_key.is_some()
    }

    pub fn network(&self) -> &'static str {
        if self.use_testnet {
            "testnet"
        } else {
            "mainnet"
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradingConfig {
    pub default_tif: TimeInForce,
    pub slippage: Decimal,
    pub default_notional_usd: Option<Decimal>,
    pub aligned_policy: AlignedPolicy,
    pub max_order_attempts: u32,
    pub retry_backoff: Duration,
    pub flat_poll_interval: Duration,
    pub flat_poll_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                webhook_secret: String::new(),
            },
            exchange: ExchangeConfig {
                use_testnet: true,
                account_address: None,
                secret_key: None,
                paper_trading: false,
                paper_balance_usd: Decimal::new(10_000, 0),
                http_timeout: Duration::from_secs(10),
            },
            trading: TradingConfig {
                default_tif: TimeInForce::Ioc,
                slippage: Decimal::new(5, 2),
                default_notional_usd: None,
                aligned_policy: AlignedPolicy::Hold,
                max_order_attempts: 3,
                retry_backoff: Duration::from_millis(250),
                flat_poll_interval: Duration::from_millis(250),
                flat_poll_timeout: Duration::from_millis(1500),
            },
        }
    }
}

impl Config {
    /// Load from the environment (and `.env` when present)
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server = ServerConfig {
            host: var("HOST").unwrap_or(defaults.server.host),
            port: parse_or(&var, "PORT", defaults.server.port)?,
            webhook_secret: var("WEBHOOK_SECRET").unwrap_or_default(),
        };

        let exchange = ExchangeConfig {
            use_testnet: parse_bool(&var, "USE_TESTNET", defaults.exchange.use_testnet)?,
            account_address: var("HYPERLIQUID_ACCOUNT_ADDRESS"),
            secret_key: var("HYPERLIQUID_SECRET_KEY"),
            paper_trading: parse_bool(&var, "PAPER_TRADING", defaults.exchange.paper_trading)?,
            paper_balance_usd: parse_or(&var, "PAPER_BALANCE_USD", defaults.exchange.paper_balance_usd)?,
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 10u64)?),
        };

        let trading = TradingConfig {
            default_tif: parse_or(&var, "DEFAULT_TIF", defaults.trading.default_tif)?,
            slippage: parse_or(&var, "DEFAULT_SLIPPAGE", defaults.trading.slippage)?,
            default_notional_usd: var("DEFAULT_NOTIONAL_USD")
                .map(|v| parse_value::<Decimal>("DEFAULT_NOTIONAL_USD", &v))
                .transpose()?,
            aligned_policy: parse_or(&var, "ALIGNED_POLICY", defaults.trading.aligned_policy)?,
            max_order_attempts: parse_or(&var, "ORDER_MAX_ATTEMPTS", defaults.trading.max_order_attempts)?,
            retry_backoff: Duration::from_millis(parse_or(&var, "RETRY_BACKOFF_MS", 250u64)?),
            flat_poll_interval: Duration::from_millis(parse_or(&var, "FLAT_POLL_INTERVAL_MS", 250u64)?),
            flat_poll_timeout: Duration::from_millis(parse_or(&var, "FLAT_POLL_TIMEOUT_MS", 1500u64)?),
        };

        let config = Config {
            server,
            exchange,
            trading,
        };
        config.validate()?;
        Ok(config)
    }

    /// Trading mode derived from credentials and the paper flag
    pub fn trading_mode(&self) -> TradingMode {
        if self.exchange.paper_trading {
            TradingMode::Paper
        } else if self.exchange.credentials_set() {
            TradingMode::Live
        } else {
            TradingMode::Demo
        }
    }

    fn validate(&self) -> Result<()> {
        if self.trading.slippage < Decimal::ZERO || self.trading.slippage >= Decimal::ONE {
            return Err(AppError::Config(format!(
                "DEFAULT_SLIPPAGE must be in [0, 1), got {}",
                self.trading.slippage
            )));
        }
        if self.trading.max_order_attempts == 0 {
            return Err(AppError::Config("ORDER_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if let Some(n) = self.trading.default_notional_usd {
            if n <= Decimal::ZERO {
                return Err(AppError::Config("DEFAULT_NOTIONAL_USD must be positive".to_string()));
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| AppError::Config(format!("Invalid value for {}: '{}'", key, raw)))
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool<F>(var: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => Ok(false),
        Some(v) => Err(AppError::Config(format!("Invalid boolean for {}: '{}'", key, v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.port, 5000);
        assert!(config.exchange.use_testnet);
        assert_eq!(config.trading.default_tif, TimeInForce::Ioc);
        assert_eq!(config.trading.aligned_policy, AlignedPolicy::Hold);
        assert_eq!(config.trading_mode(), TradingMode::Demo);
    }

    #[test]
    fn test_live_mode_needs_both_credentials() {
        let config = Config::from_lookup(lookup(&[("HYPERLIQUID_ACCOUNT_ADDRESS", "0xabc")])).unwrap();
        assert_eq!(config.trading_mode(), TradingMode::Demo);

        let config = Config::from_lookup(lookup(&[
            ("HYPERLIQUID_ACCOUNT_ADDRESS", "0xabc"),
            ("HYPERLIQUID_SECRET_KEY", "0x01"),
            ("USE_TESTNET", "false"),
        ]))
        .unwrap();
        assert_eq!(config.trading_mode(), TradingMode::Live);
        assert_eq!(config.exchange.network(), "mainnet");
    }

    #[test]
    fn test_overrides_and_errors() {
        let config = Config::from_lookup(lookup(&[
            ("DEFAULT_TIF", "gtc"),
            ("ALIGNED_POLICY", "scale"),
            ("DEFAULT_NOTIONAL_USD", "25"),
            ("PAPER_TRADING", "1"),
        ]))
        .unwrap();
        assert_eq!(config.trading.default_tif, TimeInForce::Gtc);
        assert_eq!(config.trading.aligned_policy, AlignedPolicy::Scale);
        assert_eq!(config.trading.default_notional_usd, Some(Decimal::new(25, 0)));
        assert_eq!(config.trading_mode(), TradingMode::Paper);

        assert!(Config::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DEFAULT_SLIPPAGE", "1.5")])).is_err());
        assert!(Config::from_lookup(lookup(&[("USE_TESTNET", "maybe")])).is_err());
    }
}

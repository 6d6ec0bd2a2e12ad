//! Application state management

use crate::brokers::hyperliquid::{HyperliquidExchange, HyperliquidInfo};
use crate::brokers::paper::PaperExchange;
use crate::brokers::{ExchangeGateway, MarketData};
use crate::config::{Config, TradingMode};
use crate::error::Result;
use std::sync::Arc;

/// Application state shared across all handlers
///
/// Collaborators are constructed once at startup and injected.
pub struct AppState {
    pub config: Arc<Config>,

    /// Prices and instrument metadata
    pub market: Arc<dyn MarketData>,

    /// Order gateway; `None` in demo mode
    pub exchange: Option<Arc<dyn ExchangeGateway>>,

    pub mode: TradingMode,
}

impl AppState {
    /// Create state from explicit collaborators
    pub fn new(
        config: Config,
        market: Arc<dyn MarketData>,
        exchange: Option<Arc<dyn ExchangeGateway>>,
    ) -> Self {
        let mode = match &exchange {
            None => TradingMode::Demo,
            Some(_) if config.exchange.paper_trading => TradingMode::Paper,
            Some(_) => TradingMode::Live,
        };

        Self {
            config: Arc::new(config),
            market,
            exchange,
            mode,
        }
    }

    /// Wire up venue clients according to the configured trading mode
    pub fn from_config(config: Config) -> Result<Self> {
        let info = Arc::new(HyperliquidInfo::new(
            config.exchange.use_testnet,
            config.exchange.http_timeout,
        )?);

        let exchange: Option<Arc<dyn ExchangeGateway>> = match config.trading_mode() {
            TradingMode::Live => {
                // trading_mode() only reports Live when both are set
                let address = config.exchange.account_address.clone().unwrap_or_default();
                let secret = config.exchange.secret_key.clone().unwrap_or_default();
                Some(Arc::new(HyperliquidExchange::new(info.clone(), &address, &secret)?))
            }
            TradingMode::Paper => Some(Arc::new(PaperExchange::new(
                info.clone(),
                config.exchange.paper_balance_usd,
            ))),
            TradingMode::Demo => None,
        };

        tracing::info!(
            "Trading mode: {} ({}), venue: {}",
            config.trading_mode().as_str(),
            config.exchange.network(),
            info.base_url()
        );

        Ok(Self::new(config, info, exchange))
    }
}

//! Hyperliquid perpetuals adapter
//!
//! - [`HyperliquidInfo`]: public `/info` queries (metadata, prices, account state)
//! - [`HyperliquidExchange`]: signed `/exchange` actions (orders, leverage)

pub mod signing;
pub mod wire;

use crate::brokers::types::*;
use crate::brokers::{classify_rejection, ExchangeGateway, MarketData};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use ethers::types::Address;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use signing::ActionSigner;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use wire::*;

pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// `10^-decimals`, `None` when the scale is beyond what a decimal can hold
fn decimal_step(decimals: u32) -> Option<Decimal> {
    Decimal::try_new(1, decimals).ok()
}

fn instrument_from_asset(index: u32, asset: &AssetInfo) -> InstrumentMeta {
    let amount_step = decimal_step(asset.sz_decimals);
    let price_decimals = wire::MAX_PERP_DECIMALS.saturating_sub(asset.sz_decimals);

    InstrumentMeta {
        symbol: asset.name.clone(),
        asset_index: Some(index),
        amount_step,
        // the venue enforces a notional floor rather than a size floor
        min_amount: amount_step,
        price_step: decimal_step(price_decimals),
        max_leverage: asset.max_leverage,
    }
}

/// Public market data and account-state client
pub struct HyperliquidInfo {
    client: Client,
    base_url: Url,
    testnet: bool,
}

impl HyperliquidInfo {
    pub fn new(testnet: bool, timeout: Duration) -> Result<Self> {
        let raw = if testnet { TESTNET_API_URL } else { MAINNET_API_URL };
        Self::with_base_url(raw, testnet, timeout)
    }

    pub fn with_base_url(base_url: &str, testnet: bool, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid API URL '{}': {}", base_url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!("API URL must be http(s): {}", base_url)));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            testnet,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn is_testnet(&self) -> bool {
        self.testnet
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn post_info<T: DeserializeOwned>(&self, body: Value) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint("info")?)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    pub async fn meta(&self) -> Result<Meta> {
        self.post_info(json!({ "type": "meta" })).await
    }

    /// Universe index and metadata for a symbol
    pub async fn asset(&self, symbol: &str) -> Result<Option<(u32, AssetInfo)>> {
        let meta = self.meta().await?;
        Ok(meta.find(symbol).map(|(i, a)| (i, a.clone())))
    }

    /// Raw `clearinghouseState` for an account
    pub async fn clearinghouse_state(&self, user: &str) -> Result<Value> {
        self.post_info(json!({ "type": "clearinghouseState", "user": user.to_lowercase() }))
            .await
    }
}

#[async_trait]
impl MarketData for HyperliquidInfo {
    async fn instrument_meta(&self, symbol: &str) -> Result<Option<InstrumentMeta>> {
        let Some((index, asset)) = self.asset(symbol).await? else {
            return Ok(None);
        };

        Ok(Some(instrument_from_asset(index, &asset)))
    }

    async fn last_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        let (meta, ctxs): (Meta, Vec<AssetCtx>) =
            self.post_info(json!({ "type": "metaAndAssetCtxs" })).await?;

        let Some((index, _)) = meta.find(symbol) else {
            return Ok(None);
        };

        Ok(ctxs
            .get(index as usize)
            .and_then(|ctx| ctx.mark_px.or(ctx.mid_px).or(ctx.oracle_px))
            .filter(|px| *px > Decimal::ZERO))
    }

    async fn book_mid(&self, symbol: &str) -> Result<Option<Decimal>> {
        let book: L2Book = self
            .post_info(json!({ "type": "l2Book", "coin": symbol }))
            .await?;
        Ok(book.mid())
    }
}

/// Signed order gateway for one account
pub struct HyperliquidExchange {
    info: Arc<HyperliquidInfo>,
    signer: ActionSigner,
    account_address: String,
    last_nonce: AtomicU64,
}

impl HyperliquidExchange {
    pub fn new(info: Arc<HyperliquidInfo>, account_address: &str, secret_key: &str) -> Result<Self> {
        let account: Address = account_address.trim().parse().map_err(|_| {
            AppError::Config(format!("Invalid account address: {}", account_address))
        })?;

        let signer = ActionSigner::new(secret_key, !info.is_testnet())?;
        if signer.address() != account {
            info!(
                "Signing with API wallet {:?} on behalf of {:?}",
                signer.address(),
                account
            );
        }

        Ok(Self {
            info,
            signer,
            account_address: format!("{:?}", account),
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Millisecond timestamp nonce, strictly increasing per process
    fn next_nonce(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut prev = self.last_nonce.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_nonce
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    async fn post_action<A: Serialize + Sync>(&self, action: &A) -> Result<Value> {
        let nonce = self.next_nonce();
        let signature = self.signer.sign_l1_action(action, nonce)?;

        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
            "vaultAddress": null,
        });
        debug!("POST /exchange {}", body);

        let response = self
            .info
            .client
            .post(self.info.endpoint("exchange")?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!("/exchange responded {}: {}", status, text);

        if !status.is_success() {
            return Err(classify_rejection(&format!("HTTP {}: {}", status, text)));
        }

        Ok(serde_json::from_str(&text)?)
    }

    async fn asset(&self, symbol: &str) -> Result<(u32, AssetInfo)> {
        self.info
            .asset(symbol)
            .await?
            .ok_or_else(|| AppError::SymbolNotFound(symbol.to_string()))
    }
}

/// Interpret an order response: `{"status":"ok","response":{"data":{"statuses":[...]}}}`
fn parse_order_response(raw: Value) -> Result<OrderAck> {
    if raw.get("status").and_then(Value::as_str) != Some("ok") {
        let message = raw
            .get("response")
            .map(|r| r.as_str().map(str::to_string).unwrap_or_else(|| r.to_string()))
            .unwrap_or_else(|| raw.to_string());
        return Err(classify_rejection(&message));
    }

    let status = raw
        .pointer("/response/data/statuses/0")
        .cloned()
        .unwrap_or(Value::Null);

    if let Some(message) = status.get("error").and_then(Value::as_str) {
        return Err(classify_rejection(message));
    }

    let oid = |v: &Value| v.get("oid").map(|o| o.to_string());

    let (order_id, fill) = if let Some(filled) = status.get("filled") {
        let total_size = decimal_field(filled, "totalSz");
        let avg_price = decimal_field(filled, "avgPx");
        (
            oid(filled),
            FillStatus::Filled {
                total_size,
                avg_price,
            },
        )
    } else if let Some(resting) = status.get("resting") {
        (oid(resting), FillStatus::Resting)
    } else {
        (None, FillStatus::Accepted)
    };

    Ok(OrderAck {
        order_id,
        status: fill,
        raw,
    })
}

fn decimal_field(obj: &Value, key: &str) -> Decimal {
    match obj.get(key) {
        Some(Value::String(s)) => s.parse().unwrap_or(Decimal::ZERO),
        Some(Value::Number(n)) => n.to_string().parse().unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

#[async_trait]
impl ExchangeGateway for HyperliquidExchange {
    fn name(&self) -> &'static str {
        "Hyperliquid"
    }

    async fn position_row(&self, symbol: &str) -> Result<Option<Value>> {
        let state = self.info.clearinghouse_state(&self.account_address).await?;

        let rows = state
            .get("assetPositions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(rows.into_iter().find_map(|row| {
            // rows are usually wrapped as {"type":"oneWay","position":{...}}
            let position = row.get("position").cloned().unwrap_or(row);
            let matches = position
                .get("coin")
                .and_then(Value::as_str)
                .is_some_and(|coin| coin.eq_ignore_ascii_case(symbol));
            matches.then_some(position)
        }))
    }

    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck> {
        let (asset, meta) = self.asset(&order.symbol).await?;

        let wire = OrderWire {
            a: asset,
            b: order.side.is_buy(),
            p: price_to_wire(order.limit_price, meta.sz_decimals),
            s: size_to_wire(order.amount),
            r: order.reduce_only,
            t: OrderTypeWire {
                limit: LimitWire {
                    tif: order.time_in_force.as_wire().to_string(),
                },
            },
            c: order.client_order_id.clone(),
        };

        info!(
            "Submitting {} {} {} @ {} reduce_only={} tif={}",
            order.side, wire.s, order.symbol, wire.p, order.reduce_only, order.time_in_force
        );

        let raw = self.post_action(&OrderAction::single(wire)).await?;
        parse_order_response(raw)
    }

    async fn update_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let (asset, meta) = self.asset(symbol).await?;
        let leverage = match meta.max_leverage {
            Some(max) if leverage > max => {
                warn!("Leverage {}x above {} max {}x, clamping", leverage, symbol, max);
                max
            }
            _ => leverage,
        };

        let raw = self
            .post_action(&UpdateLeverageAction::cross(asset, leverage))
            .await?;

        if raw.get("status").and_then(Value::as_str) == Some("ok") {
            Ok(())
        } else {
            Err(AppError::PermanentGateway(format!("Leverage update failed: {}", raw)))
        }
    }

    async fn account_balance(&self) -> Result<Decimal> {
        let state = self.info.clearinghouse_state(&self.account_address).await?;
        Ok(decimal_field(&state, "withdrawable"))
    }
}

use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::{Candle, Granularity, Order, OrderRequest, OrderStatus, OrderType, PriceTick, Side, TimeFrame};

use super::Brokerage;

type HmacSha256 = Hmac<Sha256>;
type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

const BASE_URL: &str = "https://api.binance.us";
const SYMBOL: &str = "BTCUSDT";

/// Live Binance.US client adapter implementing `Brokerage`. HMAC-SHA256
/// query signing and DTO mapping follow the teacher's original client.
pub struct BinanceClient {
    client: Client,
    api_key: String,
    api_secret: String,
    limiter: Arc<DirectRateLimiter>,
}

impl BinanceClient {
    pub fn new(api_key: String, api_secret: String) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(10).expect("10 is nonzero"));
        Self {
            client: Client::new(),
            api_key,
            api_secret,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={}", timestamp));
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    async fn throttled_get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> anyhow::Result<T> {
        self.limiter.until_ready().await;
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("binance request failed ({}): {}", status, body);
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl Brokerage for BinanceClient {
    async fn fetch_candles(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&endTime={}&limit=300",
            BASE_URL,
            SYMBOL,
            granularity.as_str(),
            start.timestamp_millis(),
            end.timestamp_millis(),
        );

        let raw: Vec<Vec<serde_json::Value>> = self.throttled_get(&url).await?;
        let mut candles = Vec::with_capacity(raw.len());
        for k in raw {
            let open_time = k[0].as_i64().unwrap_or(0);
            candles.push(Candle {
                // Re-tagged to the collector's own timeframe on upsert; the
                // store never trusts the brokerage's label.
                timeframe: TimeFrame::FiveMinute,
                ts_start: Utc
                    .timestamp_millis_opt(open_time)
                    .single()
                    .unwrap_or_else(Utc::now),
                open: decimal_field(&k[1])?,
                high: decimal_field(&k[2])?,
                low: decimal_field(&k[3])?,
                close: decimal_field(&k[4])?,
                volume: decimal_field(&k[5])?,
            });
        }
        Ok(candles)
    }

    async fn subscribe_prices(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>> {
        crate::price_feed::connect_binance_ws(SYMBOL).await
    }

    async fn place_order(&self, request: OrderRequest) -> anyhow::Result<Order> {
        self.limiter.until_ready().await;

        let mut params: Vec<(&str, String)> = vec![
            ("symbol", SYMBOL.to_string()),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
            ("quantity", request.quantity.to_string()),
            ("newClientOrderId", request.client_order_id.clone()),
        ];
        if let Some(p) = request.limit_price {
            params.push(("price", p.to_string()));
            params.push(("timeInForce", "GTC".to_string()));
        }
        if let Some(sp) = request.stop_price {
            params.push(("stopPrice", sp.to_string()));
        }

        let query = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", BASE_URL, query);

        let resp = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("order placement failed ({}): {}", status, body);
        }

        let raw: BinanceOrderResponse = resp.json().await?;
        Ok(convert_order_response(raw, request.side, request.order_type))
    }

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<()> {
        self.limiter.until_ready().await;
        let params = [("symbol", SYMBOL.to_string()), ("orderId", order_id.to_string())];
        let query = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", BASE_URL, query);

        let resp = self
            .client
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            warn!("cancel_order {} returned {}", order_id, resp.status());
        }
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> anyhow::Result<Order> {
        self.limiter.until_ready().await;
        let params = [("symbol", SYMBOL.to_string()), ("orderId", order_id.to_string())];
        let query = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", BASE_URL, query);

        let raw: BinanceOrderResponse = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?
            .json()
            .await?;

        let side = if raw.side == "BUY" { Side::Buy } else { Side::Sell };
        let order_type = match raw.order_type.as_str() {
            "STOP_LOSS_LIMIT" => OrderType::StopLossLimit,
            "TAKE_PROFIT_LIMIT" => OrderType::TakeProfitLimit,
            _ => OrderType::Market,
        };
        Ok(convert_order_response(raw, side, order_type))
    }

    async fn is_connected(&self) -> bool {
        let url = format!("{}/api/v3/ping", BASE_URL);
        self.client.get(&url).send().await.is_ok()
    }
}

fn decimal_field(v: &serde_json::Value) -> anyhow::Result<Decimal> {
    let s = v.as_str().ok_or_else(|| anyhow::anyhow!("expected string field"))?;
    Ok(Decimal::from_str(s)?)
}

#[derive(Debug, Deserialize)]
struct BinanceOrderResponse {
    #[serde(rename = "orderId")]
    order_id: i64,
    #[serde(rename = "clientOrderId")]
    client_order_id: String,
    status: String,
    #[serde(rename = "origQty")]
    orig_qty: String,
    #[serde(rename = "executedQty")]
    executed_qty: String,
    #[serde(default, rename = "cummulativeQuoteQty")]
    cumulative_quote_qty: Option<String>,
    #[serde(default)]
    side: String,
    #[serde(default, rename = "type")]
    order_type: String,
}

fn convert_order_response(raw: BinanceOrderResponse, side: Side, order_type: OrderType) -> Order {
    let status = match raw.status.as_str() {
        "NEW" => OrderStatus::Open,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" => OrderStatus::Cancelled,
        "REJECTED" | "EXPIRED" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    };

    let filled_qty = Decimal::from_str(&raw.executed_qty).unwrap_or(Decimal::ZERO);
    let average_fill_price = raw
        .cumulative_quote_qty
        .and_then(|q| Decimal::from_str(&q).ok())
        .filter(|_| !filled_qty.is_zero())
        .map(|quote| quote / filled_qty);

    debug!("order {} -> status {:?}", raw.order_id, status);

    Order {
        id: raw.order_id.to_string(),
        client_order_id: raw.client_order_id,
        side,
        order_type,
        status,
        quantity: Decimal::from_str(&raw.orig_qty).unwrap_or(Decimal::ZERO),
        average_fill_price,
        created_at: Utc::now(),
    }
}

//! General stock-quote lookup backed by the Yahoo Finance chart endpoint

use super::{required_str, CallerContext, Tool};
use crate::error::FintrackError;
use crate::models::ToolOutput;
use crate::Result;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const MAX_SYMBOL_LEN: usize = 15;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StockQuote {
    pub symbol: String,
    pub price: f64,
    pub currency: Option<String>,
    pub previous_close: Option<f64>,
    pub exchange: Option<String>,
}

pub struct StockQuoteTool {
    client: Client,
    base_url: String,
}

impl StockQuoteTool {
    pub fn new() -> Result<Self> {
        Self::with_base_url(YAHOO_CHART_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(15))
            .user_agent("fintrack-agent/0.1")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, symbol: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(symbol));

        let response = self
            .client
            .get(url)
            .query(&[("interval", "1d"), ("range", "1d")])
            .send()
            .await?;

        // Unknown tickers come back as 404 with a JSON error body.
        let status = response.status();
        let body = response.json::<Value>().await.map_err(|e| {
            FintrackError::ToolError(format!("Invalid quote response ({}): {}", status, e))
        })?;
        Ok(body)
    }
}

fn normalize_symbol(raw: &str) -> Result<String> {
    let symbol = raw.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));

    if valid {
        Ok(symbol)
    } else {
        Err(FintrackError::Validation(format!(
            "'{}' is not a valid ticker symbol",
            raw.trim()
        )))
    }
}

/// Pull the quote out of a chart response body.
pub fn parse_chart(symbol: &str, body: &Value) -> Result<StockQuote> {
    let chart = &body["chart"];

    if let Some(description) = chart["error"]["description"].as_str() {
        return Err(FintrackError::not_found("Ticker", format!("{} ({})", symbol, description)));
    }

    let meta = &chart["result"][0]["meta"];
    let price = meta["regularMarketPrice"]
        .as_f64()
        .ok_or_else(|| FintrackError::not_found("Ticker", symbol))?;

    Ok(StockQuote {
        symbol: meta["symbol"].as_str().unwrap_or(symbol).to_string(),
        price,
        currency: meta["currency"].as_str().map(str::to_string),
        previous_close: meta["chartPreviousClose"]
            .as_f64()
            .or_else(|| meta["previousClose"].as_f64()),
        exchange: meta["exchangeName"].as_str().map(str::to_string),
    })
}

#[async_trait::async_trait]
impl Tool for StockQuoteTool {
    fn name(&self) -> &'static str {
        "stock_quote"
    }

    fn description(&self) -> &'static str {
        "Look up the latest market price of a stock by ticker symbol, e.g. AAPL or MSFT. \
         General market information only; unrelated to the user's own records."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": {"type": "string", "description": "Ticker symbol"}
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, _caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
        let symbol = normalize_symbol(required_str(args, "symbol")?)?;

        let body = match self.fetch(&symbol).await {
            Ok(body) => body,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Stock quote lookup failed");
                return Ok(ToolOutput::failure(format!(
                    "Stock quote service is unavailable right now: {}",
                    e
                )));
            }
        };

        let quote = parse_chart(&symbol, &body)?;
        ToolOutput::json(&quote)
    }
}

use async_trait::async_trait;
use finance::errors::{AgentError, AgentResult};
use finance::models::content::Content;
use finance::models::tool::{Tool, ToolCall};
use finance::systems::System;
use serde_json::{json, Value};

use crate::alpha_vantage::{
    AlphaVantageClient, ExchangeRate, FinanceError, FinanceResult, Quote, SearchMatch,
};

pub const GET_STOCK_QUOTE: &str = "get_stock_quote";
pub const SEARCH_STOCKS: &str = "search_stocks";
pub const GET_CRYPTO_PRICE: &str = "get_crypto_price";

const NOT_AVAILABLE: &str = "N/A";

/// The three market data tools, each backed by one Alpha Vantage lookup
pub struct FinanceSystem {
    client: AlphaVantageClient,
    tools: Vec<Tool>,
}

impl FinanceSystem {
    pub fn new(client: AlphaVantageClient) -> Self {
        let symbol_schema = |description: &str| {
            json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": description}
                },
                "required": ["symbol"]
            })
        };

        let tools = vec![
            Tool::new(
                GET_STOCK_QUOTE,
                "Get current stock price and basic info for a given symbol",
                symbol_schema("Stock ticker symbol, e.g. AAPL"),
            ),
            Tool::new(
                SEARCH_STOCKS,
                "Search for stocks by company name or symbol",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Company name or partial symbol"}
                    },
                    "required": ["query"]
                }),
            ),
            Tool::new(
                GET_CRYPTO_PRICE,
                "Get current cryptocurrency price in USD",
                symbol_schema("Cryptocurrency symbol, e.g. BTC"),
            ),
        ];

        Self { client, tools }
    }

    async fn stock_quote(&self, arguments: &Value) -> FinanceResult<String> {
        let symbol = string_argument(arguments, "symbol")?.to_uppercase();
        let quote = self.client.global_quote(&symbol).await?;
        Ok(format_quote(&quote))
    }

    async fn search_stocks(&self, arguments: &Value) -> FinanceResult<String> {
        let query = string_argument(arguments, "query")?;
        let matches = self.client.symbol_search(&query).await?;
        Ok(format_search(&query, &matches))
    }

    async fn crypto_price(&self, arguments: &Value) -> FinanceResult<String> {
        let symbol = string_argument(arguments, "symbol")?.to_uppercase();
        let rate = self.client.exchange_rate(&symbol).await?;
        Ok(format_exchange_rate(&rate))
    }
}

#[async_trait]
impl System for FinanceSystem {
    fn name(&self) -> &str {
        "finance-analyzer"
    }

    fn description(&self) -> &str {
        "Stock and cryptocurrency market data from Alpha Vantage"
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let result = match tool_call.name.as_str() {
            GET_STOCK_QUOTE => self.stock_quote(&tool_call.arguments).await,
            SEARCH_STOCKS => self.search_stocks(&tool_call.arguments).await,
            GET_CRYPTO_PRICE => self.crypto_price(&tool_call.arguments).await,
            _ => return Err(AgentError::ToolNotFound(tool_call.name)),
        };

        match result {
            Ok(text) => Ok(vec![Content::text(text)]),
            Err(FinanceError::InvalidParameters(message)) => {
                Err(AgentError::InvalidParameters(message))
            }
            Err(e) => {
                tracing::warn!(tool = %tool_call.name, error = %e, "tool failed");
                Err(AgentError::ExecutionError(format!("Error: {}", e)))
            }
        }
    }
}

fn string_argument(arguments: &Value, name: &str) -> FinanceResult<String> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            FinanceError::InvalidParameters(format!("'{}' must be a non-empty string", name))
        })
}

fn or_na(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NOT_AVAILABLE)
}

fn format_quote(quote: &Quote) -> String {
    format!(
        "Stock Quote for {}:\n• Current Price: ${}\n• Change: {} ({})\n• Volume: {}\n• Last Updated: {}\n",
        quote.symbol,
        quote.price,
        quote.change,
        or_na(&quote.change_percent),
        quote.volume,
        or_na(&quote.latest_trading_day),
    )
}

fn format_search(query: &str, matches: &[SearchMatch]) -> String {
    let mut result = format!("Search results for '{}':\n\n", query);
    for (i, entry) in matches.iter().enumerate() {
        result.push_str(&format!(
            "{}. {} - {}\n",
            i + 1,
            or_na(&entry.symbol),
            or_na(&entry.name)
        ));
    }
    result
}

fn format_exchange_rate(rate: &ExchangeRate) -> String {
    format!(
        "Crypto Price for {}:\n• Current Price: ${} USD\n• Last Updated: {}\n",
        rate.from_currency,
        rate.rate,
        or_na(&rate.last_refreshed),
    )
}

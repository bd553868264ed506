//! Thin client for the Alpha Vantage query API. Each lookup is one GET
//! request whose payload is reshaped into a typed record; anything the
//! upstream gets wrong surfaces as a [`FinanceError`].

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};
use thiserror::Error;

const GLOBAL_QUOTE: &str = "GLOBAL_QUOTE";
const SYMBOL_SEARCH: &str = "SYMBOL_SEARCH";
const CURRENCY_EXCHANGE_RATE: &str = "CURRENCY_EXCHANGE_RATE";

pub const MAX_SEARCH_RESULTS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FinanceError {
    #[error("API request failed: {0}")]
    Request(String),

    #[error("Invalid symbol '{0}' or API limit reached")]
    InvalidSymbol(String),

    #[error("Invalid crypto symbol '{0}' or API limit reached")]
    InvalidCryptoSymbol(String),

    #[error("API limit reached: {0}")]
    RateLimited(String),

    #[error("No data found for symbol: {0}")]
    NoQuoteData(String),

    #[error("No data found for crypto: {0}")]
    NoCryptoData(String),

    #[error("No stocks found matching: {0}")]
    NoMatches(String),

    #[error("Incomplete data for {symbol}: missing '{field}'")]
    Incomplete { symbol: String, field: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

pub type FinanceResult<T> = Result<T, FinanceError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: String,
    pub change: String,
    pub change_percent: Option<String>,
    pub volume: String,
    pub latest_trading_day: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub symbol: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRate {
    pub from_currency: String,
    pub rate: String,
    pub last_refreshed: Option<String>,
}

pub struct AlphaVantageClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Current quote for an upper-cased equity symbol
    pub async fn global_quote(&self, symbol: &str) -> FinanceResult<Quote> {
        let data = self.query(GLOBAL_QUOTE, &[("symbol", symbol)]).await?;
        if data.get("Error Message").is_some() {
            return Err(FinanceError::InvalidSymbol(symbol.to_string()));
        }
        check_notices(&data)?;

        let quote = non_empty_object(&data, "Global Quote")
            .ok_or_else(|| FinanceError::NoQuoteData(symbol.to_string()))?;

        Ok(Quote {
            symbol: symbol.to_string(),
            price: required(quote, "05. price", symbol)?,
            change: required(quote, "09. change", symbol)?,
            change_percent: optional(quote, "10. change percent"),
            volume: required(quote, "06. volume", symbol)?,
            latest_trading_day: optional(quote, "07. latest trading day"),
        })
    }

    /// Best matches for a free-text query, at most [`MAX_SEARCH_RESULTS`]
    pub async fn symbol_search(&self, query: &str) -> FinanceResult<Vec<SearchMatch>> {
        let data = self.query(SYMBOL_SEARCH, &[("keywords", query)]).await?;
        check_notices(&data)?;

        let matches = data
            .get("bestMatches")
            .and_then(Value::as_array)
            .filter(|matches| !matches.is_empty())
            .ok_or_else(|| FinanceError::NoMatches(query.to_string()))?;

        Ok(matches
            .iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|entry| {
                let fields = entry.as_object();
                SearchMatch {
                    symbol: fields.and_then(|f| optional(f, "1. symbol")),
                    name: fields.and_then(|f| optional(f, "2. name")),
                }
            })
            .collect())
    }

    /// USD exchange rate for an upper-cased crypto symbol
    pub async fn exchange_rate(&self, symbol: &str) -> FinanceResult<ExchangeRate> {
        let data = self
            .query(
                CURRENCY_EXCHANGE_RATE,
                &[("from_currency", symbol), ("to_currency", "USD")],
            )
            .await?;
        if data.get("Error Message").is_some() {
            return Err(FinanceError::InvalidCryptoSymbol(symbol.to_string()));
        }
        check_notices(&data)?;

        let rate = non_empty_object(&data, "Realtime Currency Exchange Rate")
            .ok_or_else(|| FinanceError::NoCryptoData(symbol.to_string()))?;

        Ok(ExchangeRate {
            from_currency: optional(rate, "1. From_Currency Code")
                .unwrap_or_else(|| symbol.to_string()),
            rate: required(rate, "5. Exchange Rate", symbol)?,
            last_refreshed: optional(rate, "6. Last Refreshed"),
        })
    }

    async fn query(&self, function: &str, params: &[(&str, &str)]) -> FinanceResult<Value> {
        tracing::debug!(function, "querying alpha vantage");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("function", function), ("apikey", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| FinanceError::Request(e.without_url().to_string()))?;

        response.json::<Value>().await.map_err(|e| {
            FinanceError::Request(format!("invalid response body: {}", e.without_url()))
        })
    }
}

/// Rate limit and plan notices replace the payload entirely
fn check_notices(data: &Value) -> FinanceResult<()> {
    for key in ["Note", "Information"] {
        if let Some(notice) = data.get(key) {
            let notice = notice.as_str().map(String::from).unwrap_or_else(|| notice.to_string());
            tracing::warn!(%notice, "alpha vantage notice");
            return Err(FinanceError::RateLimited(notice));
        }
    }
    Ok(())
}

fn non_empty_object<'a>(data: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    data.get(key)
        .and_then(Value::as_object)
        .filter(|object| !object.is_empty())
}

fn required(object: &Map<String, Value>, field: &str, symbol: &str) -> FinanceResult<String> {
    optional(object, field).ok_or_else(|| FinanceError::Incomplete {
        symbol: symbol.to_string(),
        field: field.to_string(),
    })
}

fn optional(object: &Map<String, Value>, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AlphaVantageClient {
        AlphaVantageClient::new(&server.uri(), "test-key", Duration::from_secs(2)).unwrap()
    }

    async fn respond(server: &MockServer, function: &str, body: Value) {
        Mock::given(method("GET"))
            .and(query_param("function", function))
            .and(query_param("apikey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_global_quote() {
        let server = MockServer::start().await;
        respond(
            &server,
            GLOBAL_QUOTE,
            json!({"Global Quote": {
                "01. symbol": "AAPL",
                "05. price": "189.8400",
                "06. volume": "52164498",
                "07. latest trading day": "2024-05-17",
                "09. change": "0.0100",
                "10. change percent": "0.0053%"
            }}),
        )
        .await;

        let quote = client_for(&server).global_quote("AAPL").await.unwrap();
        assert_eq!(quote.price, "189.8400");
        assert_eq!(quote.change, "0.0100");
        assert_eq!(quote.change_percent.as_deref(), Some("0.0053%"));
        assert_eq!(quote.volume, "52164498");
    }

    #[tokio::test]
    async fn test_quote_missing_required_field() {
        let server = MockServer::start().await;
        respond(
            &server,
            GLOBAL_QUOTE,
            json!({"Global Quote": {"05. price": "10.00", "09. change": 1.5}}),
        )
        .await;

        let err = client_for(&server).global_quote("IBM").await.unwrap_err();
        assert_eq!(
            err,
            FinanceError::Incomplete {
                symbol: "IBM".to_string(),
                field: "09. change".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_quote_error_payloads() {
        let server = MockServer::start().await;
        Mock::given(query_param("symbol", "ZZZZ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"Error Message": "Invalid API call."}),
            ))
            .mount(&server)
            .await;
        Mock::given(query_param("symbol", "EMPTY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Global Quote": {}})))
            .mount(&server)
            .await;
        Mock::given(query_param("symbol", "BUSY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"Information": "Our standard API rate limit is 25 requests per day."}),
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.global_quote("ZZZZ").await.unwrap_err().to_string(),
            "Invalid symbol 'ZZZZ' or API limit reached"
        );
        assert_eq!(
            client.global_quote("EMPTY").await.unwrap_err().to_string(),
            "No data found for symbol: EMPTY"
        );
        assert_eq!(
            client.global_quote("BUSY").await.unwrap_err().to_string(),
            "API limit reached: Our standard API rate limit is 25 requests per day."
        );
    }

    #[tokio::test]
    async fn test_http_failure_and_bad_body() {
        let server = MockServer::start().await;
        Mock::given(query_param("symbol", "DOWN"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(query_param("symbol", "HTML"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.global_quote("DOWN").await,
            Err(FinanceError::Request(_))
        ));
        let err = client.global_quote("HTML").await.unwrap_err();
        assert!(err.to_string().starts_with("API request failed: invalid response body"));
    }

    #[tokio::test]
    async fn test_upstream_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            AlphaVantageClient::new(&server.uri(), "test-key", Duration::from_millis(50)).unwrap();
        assert!(matches!(
            client.exchange_rate("BTC").await,
            Err(FinanceError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_symbol_search_limits_results() {
        let server = MockServer::start().await;
        let matches: Vec<Value> = (1..=8)
            .map(|i| json!({"1. symbol": format!("SYM{}", i), "2. name": format!("Company {}", i)}))
            .collect();
        respond(&server, SYMBOL_SEARCH, json!({"bestMatches": matches})).await;

        let results = client_for(&server).symbol_search("company").await.unwrap();
        assert_eq!(results.len(), MAX_SEARCH_RESULTS);
        assert_eq!(results[0].symbol.as_deref(), Some("SYM1"));
    }

    #[tokio::test]
    async fn test_symbol_search_no_matches() {
        let server = MockServer::start().await;
        respond(&server, SYMBOL_SEARCH, json!({"bestMatches": []})).await;

        let err = client_for(&server).symbol_search("qwxz").await.unwrap_err();
        assert_eq!(err, FinanceError::NoMatches("qwxz".to_string()));
    }

    #[tokio::test]
    async fn test_exchange_rate() {
        let server = MockServer::start().await;
        Mock::given(query_param("function", CURRENCY_EXCHANGE_RATE))
            .and(query_param("from_currency", "BTC"))
            .and(query_param("to_currency", "USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Realtime Currency Exchange Rate": {
                    "1. From_Currency Code": "BTC",
                    "5. Exchange Rate": "67012.34000000",
                    "6. Last Refreshed": "2024-05-18 10:01:02"
                }
            })))
            .mount(&server)
            .await;

        let rate = client_for(&server).exchange_rate("BTC").await.unwrap();
        assert_eq!(rate.from_currency, "BTC");
        assert_eq!(rate.rate, "67012.34000000");
        assert_eq!(rate.last_refreshed.as_deref(), Some("2024-05-18 10:01:02"));
    }

    #[tokio::test]
    async fn test_exchange_rate_missing_rate() {
        let server = MockServer::start().await;
        respond(
            &server,
            CURRENCY_EXCHANGE_RATE,
            json!({"Realtime Currency Exchange Rate": {"1. From_Currency Code": "DOGE"}}),
        )
        .await;

        let err = client_for(&server).exchange_rate("DOGE").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Incomplete data for DOGE: missing '5. Exchange Rate'"
        );
    }

    #[tokio::test]
    async fn test_exchange_rate_error_payloads() {
        let server = MockServer::start().await;
        Mock::given(query_param("from_currency", "NOPE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"Error Message": "Invalid API call."}),
            ))
            .mount(&server)
            .await;
        Mock::given(query_param("from_currency", "EMPTY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"Realtime Currency Exchange Rate": {}}),
            ))
            .mount(&server)
            .await;
        Mock::given(query_param("from_currency", "GONE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Meta Data": {}})))
            .mount(&server)
            .await;
        Mock::given(query_param("from_currency", "BUSY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.exchange_rate("NOPE").await.unwrap_err(),
            FinanceError::InvalidCryptoSymbol("NOPE".to_string())
        );
        assert_eq!(
            client.exchange_rate("EMPTY").await.unwrap_err().to_string(),
            "No data found for crypto: EMPTY"
        );
        assert_eq!(
            client.exchange_rate("GONE").await.unwrap_err(),
            FinanceError::NoCryptoData("GONE".to_string())
        );
        assert_eq!(
            client.exchange_rate("BUSY").await.unwrap_err().to_string(),
            "API limit reached: Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."
        );
    }

    #[tokio::test]
    async fn test_symbol_search_notices() {
        let server = MockServer::start().await;
        Mock::given(query_param("keywords", "note"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"Note": "API call frequency exceeded."}),
            ))
            .mount(&server)
            .await;
        Mock::given(query_param("keywords", "info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"Information": "Premium endpoint."}),
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.symbol_search("note").await.unwrap_err(),
            FinanceError::RateLimited("API call frequency exceeded.".to_string())
        );
        assert_eq!(
            client.symbol_search("info").await.unwrap_err(),
            FinanceError::RateLimited("Premium endpoint.".to_string())
        );
    }
}

//! HTTP client for the TWSE `STOCK_DAY` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use etftrack_types::{DateRange, FetchError, Instrument, RawRecord};
use reqwest::{Client, StatusCode};

use crate::MarketDataClient;
use crate::parse::parse_stock_day;
use crate::url::{DEFAULT_BASE_URL, stock_day_url};

/// Configuration for the TWSE client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the exchange website.
    pub base_url: String,
    /// Timeout for a single monthly request.
    pub request_timeout: Duration,
    /// Pause between consecutive monthly requests for one instrument.
    pub request_delay: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            request_delay: Duration::from_millis(500), // TWSE throttles aggressive clients
            user_agent: format!("etftrack/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Market-data client backed by the Taiwan Stock Exchange.
///
/// A date range is fetched one calendar month at a time, oldest first. The
/// first failing month fails the whole fetch; retrying is the caller's job.
#[derive(Debug, Clone)]
pub struct TwseClient {
    client: Client,
    config: ClientConfig,
}

impl TwseClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()?;
        Ok(Self { client, config })
    }

    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        Self::new(ClientConfig::default())
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetches one calendar month of records.
    async fn fetch_month(&self, code: &str, month: NaiveDate) -> Result<Vec<RawRecord>, FetchError> {
        let url = stock_day_url(&self.config.base_url, code, month);
        tracing::debug!(instrument = code, month = %month.format("%Y-%m"), "Requesting month");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::transient(format!("HTTP {status} for {url}")));
        }
        if !status.is_success() {
            return Err(FetchError::permanent(format!("HTTP {status} for {url}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(&e))?;

        // TWSE answers throttled clients with an HTML page and a 200 status.
        parse_stock_day(&body)
            .map_err(|e| FetchError::transient(format!("Undecodable response for {url}: {e}")))
    }
}

#[async_trait]
impl MarketDataClient for TwseClient {
    fn name(&self) -> &str {
        "twse"
    }

    async fn fetch(
        &self,
        instrument: &Instrument,
        range: DateRange,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let mut records = Vec::new();

        for (i, month) in range.months().enumerate() {
            if i > 0 && !self.config.request_delay.is_zero() {
                tokio::time::sleep(self.config.request_delay).await;
            }
            let month_records = self.fetch_month(instrument.code(), month).await?;
            records.extend(month_records.into_iter().filter(|r| range.contains(r.date)));
        }

        tracing::debug!(
            instrument = instrument.code(),
            range = %range,
            records = records.len(),
            "Fetched range"
        );
        Ok(records)
    }
}

/// Maps a transport error to a fetch error kind.
fn classify_request_error(error: &reqwest::Error) -> FetchError {
    // Builder errors are configuration issues and will not go away on retry
    if error.is_builder() {
        return FetchError::permanent(error.to_string());
    }
    if error.is_timeout() {
        return FetchError::timeout(error.to_string());
    }
    FetchError::transient(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.request_delay, Duration::from_millis(500));
        assert!(config.user_agent.starts_with("etftrack/"));
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = TwseClient::with_defaults();
        assert!(client.is_ok());
        assert_eq!(client.unwrap().name(), "twse");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let config = ClientConfig {
            // Port 9 (discard) on localhost is closed on test machines.
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(2),
            request_delay: Duration::ZERO,
            ..Default::default()
        };
        let client = TwseClient::new(config).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let result = client
            .fetch(&Instrument::new("0050", "x"), DateRange::single_day(day))
            .await;

        assert!(result.unwrap_err().is_transient());
    }
}

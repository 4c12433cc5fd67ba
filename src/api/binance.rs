use crate::models::Enrichment;
use crate::{Error, Result};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const OPEN_INTEREST_PATH: &str = "/futures/data/openInterestHist";
const FUNDING_RATE_PATH: &str = "/fapi/v1/fundingRate";
const REQUESTS_PER_SECOND: u32 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 10;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Clone, Copy)]
struct CachedValue {
    value: f64,
    fetched_at: Instant,
}

type ValueCache = Arc<RwLock<HashMap<String, CachedValue>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterestEntry {
    sum_open_interest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRateEntry {
    funding_rate: String,
}

/// Binance futures REST client for open interest and funding rate
///
/// Each value is cached per symbol for the configured TTL. When a refresh
/// fails the last cached value is returned even if stale, so a flaky API
/// degrades to old data instead of no data. Clones share caches and the
/// rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    cache_ttl: Duration,
    open_interest_cache: ValueCache,
    funding_rate_cache: ValueCache,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>, cache_ttl: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache_ttl,
            open_interest_cache: Arc::new(RwLock::new(HashMap::new())),
            funding_rate_cache: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Both lookups for one symbol, fetched concurrently
    pub async fn enrichment(&self, symbol: &str) -> Enrichment {
        let (open_interest, funding_rate) =
            tokio::join!(self.open_interest(symbol), self.funding_rate(symbol));

        Enrichment {
            open_interest,
            funding_rate,
        }
    }

    /// Latest 5-minute open interest, or the last known value on failure
    pub async fn open_interest(&self, symbol: &str) -> Option<f64> {
        let url = format!("{}{}", self.base_url, OPEN_INTEREST_PATH);
        let query = [
            ("symbol", symbol.to_uppercase()),
            ("period", "5m".to_string()),
            ("limit", "1".to_string()),
        ];

        self.cached(&self.open_interest_cache, symbol, "open interest", async {
            let entries: Vec<OpenInterestEntry> = self.get_json(&url, &query).await?;
            let entry = entries
                .first()
                .ok_or_else(|| Error::Api(format!("no open interest data for {}", symbol)))?;
            parse_number(&entry.sum_open_interest)
        })
        .await
    }

    /// Latest funding rate, or the last known value on failure
    pub async fn funding_rate(&self, symbol: &str) -> Option<f64> {
        let url = format!("{}{}", self.base_url, FUNDING_RATE_PATH);
        let query = [("symbol", symbol.to_uppercase()), ("limit", "1".to_string())];

        self.cached(&self.funding_rate_cache, symbol, "funding rate", async {
            let entries: Vec<FundingRateEntry> = self.get_json(&url, &query).await?;
            let entry = entries
                .first()
                .ok_or_else(|| Error::Api(format!("no funding rate data for {}", symbol)))?;
            parse_number(&entry.funding_rate)
        })
        .await
    }

    async fn cached<F>(&self, cache: &ValueCache, symbol: &str, what: &str, fetch: F) -> Option<f64>
    where
        F: std::future::Future<Output = Result<f64>>,
    {
        let previous = cache.read().await.get(symbol).copied();
        if let Some(cached) = previous {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Some(cached.value);
            }
        }

        match fetch.await {
            Ok(value) => {
                cache.write().await.insert(
                    symbol.to_string(),
                    CachedValue {
                        value,
                        fetched_at: Instant::now(),
                    },
                );
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {} for {}: {}", what, symbol, e);
                previous.map(|c| c.value)
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{} returned {}: {}", url, status, body)));
        }

        Ok(response.json::<T>().await?)
    }
}

fn parse_number(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| Error::Api(format!("not a number: {:?}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const OI_BODY: &str = r#"[{"symbol":"BTCUSDT","sumOpenInterest":"81234.567","sumOpenInterestValue":"5280000000","timestamp":1700000000000}]"#;
    const FUNDING_BODY: &str = r#"[{"symbol":"BTCUSDT","fundingTime":1700000000000,"fundingRate":"0.00010000","markPrice":"65000.0"}]"#;

    #[tokio::test]
    async fn test_fetches_enrichment() {
        let mut server = mockito::Server::new_async().await;
        let oi = server
            .mock("GET", OPEN_INTEREST_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("period".into(), "5m".into()),
            ]))
            .with_status(200)
            .with_body(OI_BODY)
            .create_async()
            .await;
        let funding = server
            .mock("GET", FUNDING_RATE_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(FUNDING_BODY)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), Duration::from_secs(300)).unwrap();
        let enrichment = client.enrichment("btcusdt").await;

        assert_eq!(enrichment.open_interest, Some(81234.567));
        assert_eq!(enrichment.funding_rate, Some(0.0001));
        oi.assert_async().await;
        funding.assert_async().await;
    }

    #[tokio::test]
    async fn test_values_are_cached() {
        let mut server = mockito::Server::new_async().await;
        let funding = server
            .mock("GET", FUNDING_RATE_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(FUNDING_BODY)
            .expect(1)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), Duration::from_secs(300)).unwrap();
        assert_eq!(client.funding_rate("BTCUSDT").await, Some(0.0001));
        assert_eq!(client.funding_rate("BTCUSDT").await, Some(0.0001));
        funding.assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_stale_value() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", OPEN_INTEREST_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(OI_BODY)
            .create_async()
            .await;

        // Zero TTL: every call refreshes
        let client = BinanceClient::new(server.url(), Duration::ZERO).unwrap();
        assert_eq!(client.open_interest("BTCUSDT").await, Some(81234.567));
        ok.remove_async().await;

        let _failing = server
            .mock("GET", OPEN_INTEREST_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        assert_eq!(client.open_interest("BTCUSDT").await, Some(81234.567));
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _empty = server
            .mock("GET", FUNDING_RATE_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let _garbled = server
            .mock("GET", OPEN_INTEREST_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"sumOpenInterest":"n/a"}]"#)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), Duration::from_secs(300)).unwrap();
        assert_eq!(client.enrichment("ETHUSDT").await, Enrichment::default());
    }

    #[tokio::test]
    #[ignore] // Requires live API
    async fn test_live_enrichment() {
        let client = BinanceClient::new("https://fapi.binance.com", Duration::from_secs(300)).unwrap();
        let enrichment = client.enrichment("BTCUSDT").await;
        assert!(enrichment.open_interest.is_some());
        assert!(enrichment.funding_rate.is_some());
    }
}

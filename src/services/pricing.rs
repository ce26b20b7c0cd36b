//! ETH/USD price quoting with an ordered source fallback chain.
//!
//! Sources are tried in order: on-chain aggregator read, price-index HTTP
//! API, fixed constant. Testnet deployments skip live pricing entirely; the
//! test asset has no market value, so a live price would be misleading.
//!
//! A quote is cached per payment attempt and reused for the actual transfer.
//! Re-quoting at send time would let the user see one amount and send a
//! different one.

use crate::errors::ServiceError;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};
use utoipa::ToSchema;

/// Fixed price used on testnets and as the final fallback: $3000 per ETH.
pub const FALLBACK_ETH_USD_PRICE: Decimal = dec!(3000);

sol! {
    #[sol(rpc)]
    interface IAggregatorV3 {
        function decimals() external view returns (uint8);
        function latestRoundData()
            external
            view
            returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
    }
}

/// One ETH quote for a payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EthQuote {
    /// Asset quantity as a 6-decimal string; the transfer step consumes a
    /// decimal string, not a float.
    pub eth_amount: String,
    /// USD price per ETH the quote was computed from.
    pub price_usd: Decimal,
    /// Which source produced the price.
    pub source: String,
}

/// Uniform contract every price source implements.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn usd_price(&self) -> Result<Decimal, ServiceError>;
}

/// Chainlink-style aggregator read over JSON-RPC.
pub struct ChainlinkFeedSource {
    provider: DynProvider,
    feed_address: Address,
    timeout: Duration,
}

impl ChainlinkFeedSource {
    pub fn new(rpc_url: &str, feed_address: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| ServiceError::InvalidInput(format!("invalid RPC URL '{rpc_url}': {e}")))?;
        let feed_address: Address = feed_address.parse().map_err(|e| {
            ServiceError::InvalidInput(format!("invalid feed address '{feed_address}': {e}"))
        })?;

        Ok(Self {
            provider: ProviderBuilder::new().connect_http(url).erased(),
            feed_address,
            timeout,
        })
    }
}

#[async_trait]
impl PriceSource for ChainlinkFeedSource {
    fn name(&self) -> &'static str {
        "chainlink_feed"
    }

    async fn usd_price(&self) -> Result<Decimal, ServiceError> {
        let feed = IAggregatorV3::new(self.feed_address, self.provider.clone());

        let decimals = timeout(self.timeout, feed.decimals().call())
            .await
            .map_err(|_| ServiceError::ExternalServiceError("price feed RPC timeout".into()))?
            .map_err(|e| ServiceError::ExternalServiceError(format!("price feed read: {e}")))?;

        let round = timeout(self.timeout, feed.latestRoundData().call())
            .await
            .map_err(|_| ServiceError::ExternalServiceError("price feed RPC timeout".into()))?
            .map_err(|e| ServiceError::ExternalServiceError(format!("price feed read: {e}")))?;

        let answer = i128::try_from(round.answer).map_err(|_| {
            ServiceError::ExternalServiceError("price feed answer out of range".into())
        })?;

        price_from_feed(answer, decimals)
    }
}

/// Price-index HTTP API (CoinGecko simple price).
pub struct PriceIndexSource {
    client: reqwest::Client,
    api_base: String,
}

impl PriceIndexSource {
    pub fn new(client: reqwest::Client, api_base: String) -> Self {
        Self { client, api_base }
    }
}

#[derive(Debug, Deserialize)]
struct SimplePriceResponse {
    ethereum: SimplePriceEntry,
}

#[derive(Debug, Deserialize)]
struct SimplePriceEntry {
    usd: Decimal,
}

#[async_trait]
impl PriceSource for PriceIndexSource {
    fn name(&self) -> &'static str {
        "price_index_api"
    }

    async fn usd_price(&self) -> Result<Decimal, ServiceError> {
        let response = self
            .client
            .get(format!(
                "{}/api/v3/simple/price?ids=ethereum&vs_currencies=usd",
                self.api_base
            ))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ServiceError::ExternalServiceError(format!("price index error: {e}")))?;

        let parsed: SimplePriceResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("malformed price index response: {e}"))
        })?;

        if parsed.ethereum.usd <= Decimal::ZERO {
            return Err(ServiceError::ExternalServiceError(
                "price index returned a non-positive price".into(),
            ));
        }
        Ok(parsed.ethereum.usd)
    }
}

/// Quotes older than this are dropped from the cache; an attempt abandoned
/// for longer than a checkout session plausibly lasts re-quotes if retried.
const QUOTE_TTL: Duration = Duration::from_secs(60 * 60);

/// Expired entries are swept once the cache reaches this size, so the map
/// stays bounded without a sweep on every insert.
const QUOTE_SWEEP_LEN: usize = 1024;

struct CachedQuote {
    quote: EthQuote,
    at: Instant,
}

/// Ordered fallback chain over [`PriceSource`] implementations, with a
/// per-attempt quote cache keyed by transaction id.
pub struct PriceQuoteService {
    sources: Vec<Arc<dyn PriceSource>>,
    testnet: bool,
    quote_ttl: Duration,
    quotes: DashMap<String, CachedQuote>,
}

impl PriceQuoteService {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, testnet: bool) -> Self {
        Self::with_quote_ttl(sources, testnet, QUOTE_TTL)
    }

    pub fn with_quote_ttl(
        sources: Vec<Arc<dyn PriceSource>>,
        testnet: bool,
        quote_ttl: Duration,
    ) -> Self {
        Self {
            sources,
            testnet,
            quote_ttl,
            quotes: DashMap::new(),
        }
    }

    /// Quote the ETH amount for a payment attempt's USD total.
    ///
    /// The first quote per transaction id sticks: later calls within the TTL
    /// return the cached quote so the displayed amount equals the sent amount.
    pub async fn quote_for(
        &self,
        transaction_id: &str,
        usd_cents: i64,
    ) -> Result<EthQuote, ServiceError> {
        if let Some(existing) = self.quotes.get(transaction_id) {
            if existing.at.elapsed() < self.quote_ttl {
                return Ok(existing.quote.clone());
            }
        }

        let (price, source) = self.resolve_price().await;
        let quote = EthQuote {
            eth_amount: eth_amount_for_cents(usd_cents, price)?,
            price_usd: price,
            source: source.to_string(),
        };

        info!(
            transaction_id,
            usd_cents,
            price = %price,
            source,
            eth_amount = %quote.eth_amount,
            "ETH quote computed"
        );

        if self.quotes.len() >= QUOTE_SWEEP_LEN {
            let ttl = self.quote_ttl;
            self.quotes.retain(|_, cached| cached.at.elapsed() < ttl);
        }
        self.quotes.insert(
            transaction_id.to_string(),
            CachedQuote {
                quote: quote.clone(),
                at: Instant::now(),
            },
        );
        Ok(quote)
    }

    async fn resolve_price(&self) -> (Decimal, &'static str) {
        if self.testnet {
            return (FALLBACK_ETH_USD_PRICE, "fixed_price_testnet");
        }

        for source in &self.sources {
            match source.usd_price().await {
                Ok(price) if price > Decimal::ZERO => return (price, source.name()),
                Ok(price) => {
                    warn!(source = source.name(), %price, "ignoring non-positive price");
                }
                Err(err) => {
                    warn!(source = source.name(), error = %err, "price source failed, trying next");
                }
            }
        }

        (FALLBACK_ETH_USD_PRICE, "fixed_price")
    }
}

/// Derive a USD price from a feed round: `answer / 10^decimals`.
pub fn price_from_feed(answer: i128, decimals: u8) -> Result<Decimal, ServiceError> {
    if answer <= 0 {
        return Err(ServiceError::ExternalServiceError(
            "price feed answer is non-positive".into(),
        ));
    }
    if decimals > 28 {
        return Err(ServiceError::ExternalServiceError(
            "price feed decimals out of range".into(),
        ));
    }
    Decimal::try_from_i128_with_scale(answer, decimals as u32)
        .map_err(|_| ServiceError::ExternalServiceError("price feed answer out of range".into()))
}

/// Convert integer USD cents to an ETH amount string:
/// `(cents / 100) / price`, rounded half away from zero at the 6th decimal.
pub fn eth_amount_for_cents(usd_cents: i64, price_usd: Decimal) -> Result<String, ServiceError> {
    if price_usd <= Decimal::ZERO {
        return Err(ServiceError::InternalError(
            "cannot convert with a non-positive price".into(),
        ));
    }

    let usd = Decimal::from(usd_cents) / Decimal::ONE_HUNDRED;
    let eth = (usd / price_usd).round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero);
    Ok(format!("{eth:.6}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a different price on every call.
    struct Volatile {
        calls: std::sync::atomic::AtomicU32,
    }

    impl Volatile {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: std::sync::atomic::AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PriceSource for Volatile {
        fn name(&self) -> &'static str {
            "volatile"
        }
        async fn usd_price(&self) -> Result<Decimal, ServiceError> {
            let n = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(dec!(3000) + Decimal::from(n * 500))
        }
    }

    #[test]
    fn feed_answer_scales_by_decimals() {
        let price = price_from_feed(300_000_000_000, 8).unwrap();
        assert_eq!(price, dec!(3000.00));

        let price = price_from_feed(250_012_345_678, 8).unwrap();
        assert_eq!(price, dec!(2500.12345678));
    }

    #[test]
    fn non_positive_answers_are_rejected() {
        assert!(price_from_feed(0, 8).is_err());
        assert!(price_from_feed(-100, 8).is_err());
    }

    #[test]
    fn answers_beyond_decimal_range_are_rejected() {
        // Positive, fits in i128, but exceeds Decimal's 96-bit mantissa.
        assert!(price_from_feed(10i128.pow(32), 8).is_err());
        assert!(price_from_feed(i128::MAX, 8).is_err());
    }

    #[test]
    fn usd_cents_convert_to_six_decimal_eth() {
        // $9.64 at $3000/ETH: 964/100/3000 = 0.0032133... -> "0.003213"
        assert_eq!(eth_amount_for_cents(964, dec!(3000)).unwrap(), "0.003213");
    }

    #[test]
    fn sixth_decimal_rounds_half_away_from_zero() {
        // exact at the 6th decimal, no rounding involved
        assert_eq!(eth_amount_for_cents(45, dec!(30000)).unwrap(), "0.000015");
        // 1/3000 of a dollar cent = 0.0000033... rounds down
        assert_eq!(eth_amount_for_cents(1, dec!(3000)).unwrap(), "0.000003");
        // 0.0000005 midpoint rounds up, not to even
        assert_eq!(eth_amount_for_cents(1, dec!(20000)).unwrap(), "0.000001");
    }

    #[test]
    fn amounts_are_zero_padded_to_six_decimals() {
        // $30.00 at $3000 is exactly 0.01 ETH
        assert_eq!(eth_amount_for_cents(3000, dec!(3000)).unwrap(), "0.010000");
    }

    #[tokio::test]
    async fn testnet_short_circuits_to_fixed_price() {
        let service = PriceQuoteService::new(vec![], true);
        let quote = service.quote_for("tx-1", 964).await.unwrap();
        assert_eq!(quote.price_usd, FALLBACK_ETH_USD_PRICE);
        assert_eq!(quote.source, "fixed_price_testnet");
        assert_eq!(quote.eth_amount, "0.003213");
    }

    #[tokio::test]
    async fn quotes_are_cached_per_transaction() {
        let service = PriceQuoteService::new(vec![Volatile::new() as Arc<dyn PriceSource>], false);

        let first = service.quote_for("tx-1", 964).await.unwrap();
        let second = service.quote_for("tx-1", 964).await.unwrap();
        assert_eq!(first.eth_amount, second.eth_amount);
        assert_eq!(first.price_usd, second.price_usd);

        // A different attempt re-quotes.
        let other = service.quote_for("tx-2", 964).await.unwrap();
        assert_ne!(other.price_usd, first.price_usd);
    }

    #[tokio::test]
    async fn expired_quotes_are_requoted() {
        let service = PriceQuoteService::with_quote_ttl(
            vec![Volatile::new() as Arc<dyn PriceSource>],
            false,
            Duration::ZERO,
        );

        let first = service.quote_for("tx-1", 964).await.unwrap();
        let second = service.quote_for("tx-1", 964).await.unwrap();
        assert_ne!(first.price_usd, second.price_usd);
    }

    #[tokio::test]
    async fn chain_falls_back_to_fixed_when_sources_fail() {
        struct Failing;

        #[async_trait]
        impl PriceSource for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            async fn usd_price(&self) -> Result<Decimal, ServiceError> {
                Err(ServiceError::ExternalServiceError("down".into()))
            }
        }

        let service = PriceQuoteService::new(vec![Arc::new(Failing)], false);
        let quote = service.quote_for("tx-1", 964).await.unwrap();
        assert_eq!(quote.price_usd, FALLBACK_ETH_USD_PRICE);
        assert_eq!(quote.source, "fixed_price");
    }
}

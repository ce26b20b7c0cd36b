//! Sales-tax quoting with an ordered provider fallback chain.
//!
//! Providers share one `quote` contract and are tried in order; the first
//! success wins. When every provider fails the checkout proceeds with zero
//! tax: availability is deliberately favored over tax accuracy, and the
//! degradation is logged rather than surfaced to the buyer.

pub mod stripe;
pub mod taxjar;

use crate::errors::ServiceError;
use crate::services::address::NormalizedAddress;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

pub use stripe::StripeTaxProvider;
pub use taxjar::TaxJarProvider;

/// Which external service produced a tax quote. Recorded in payment metadata;
/// absent there when every provider failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxSource {
    TaxjarApi,
    StripeTaxFallback,
}

impl TaxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxSource::TaxjarApi => "taxjar_api",
            TaxSource::StripeTaxFallback => "stripe_tax_fallback",
        }
    }
}

/// A single taxable line item. Amounts are in dollars, matching the tax APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLineItem {
    pub id: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

/// Input to a tax provider. Shipping is fixed at zero on the crypto path;
/// it charges none, so none is taxed.
#[derive(Debug, Clone)]
pub struct TaxQuoteRequest {
    pub destination: NormalizedAddress,
    /// Taxable amount in dollars. Must equal the line-item sum to 2 decimals.
    pub taxable_amount: Decimal,
    pub shipping: Decimal,
    pub line_items: Vec<TaxLineItem>,
}

/// A successful tax quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxQuote {
    /// Percentage, rounded to 4 decimal places (e.g. `9.75`).
    pub rate_percentage: Decimal,
    pub amount_cents: i64,
    pub source: TaxSource,
}

/// Uniform contract every tax provider implements.
#[async_trait]
pub trait TaxProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn quote(&self, request: &TaxQuoteRequest) -> Result<TaxQuote, ServiceError>;
}

/// Ordered fallback chain over [`TaxProvider`] implementations.
pub struct TaxQuoteService {
    providers: Vec<Arc<dyn TaxProvider>>,
}

impl TaxQuoteService {
    pub fn new(providers: Vec<Arc<dyn TaxProvider>>) -> Self {
        Self { providers }
    }

    /// Obtain a tax quote, or `None` when no provider could produce one.
    ///
    /// The payload-mismatch guard runs before any provider is contacted.
    /// It is a defense against silent data-entry bugs, not a tax-domain rule:
    /// a payload whose amount disagrees with its own line items would get a
    /// quote for the wrong order.
    pub async fn quote(
        &self,
        request: &TaxQuoteRequest,
    ) -> Result<Option<TaxQuote>, ServiceError> {
        let line_item_sum: Decimal = request
            .line_items
            .iter()
            .map(|li| li.unit_price * Decimal::from(li.quantity))
            .sum();

        if request.taxable_amount.round_dp(2) != line_item_sum.round_dp(2) {
            return Err(ServiceError::ValidationError(
                "Tax payload mismatch: amount must equal sum(line_items).".to_string(),
            ));
        }

        for provider in &self.providers {
            match provider.quote(request).await {
                Ok(quote) => {
                    info!(
                        provider = provider.name(),
                        rate = %quote.rate_percentage,
                        amount_cents = quote.amount_cents,
                        "tax quote obtained"
                    );
                    return Ok(Some(quote));
                }
                Err(err) => {
                    warn!(
                        provider = provider.name(),
                        error = %err,
                        "tax provider failed, trying next"
                    );
                }
            }
        }

        warn!("all tax providers failed; proceeding with zero tax");
        Ok(None)
    }
}

/// Round a dollar amount to the nearest integer cent, half away from zero.
/// Money is never truncated.
pub fn dollars_to_cents(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::InternalError(format!("tax amount out of range: {amount}"))
        })
}

/// Round a percentage rate to 4 decimal places.
pub fn round_rate(rate_percentage: Decimal) -> Decimal {
    rate_percentage.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn dollars_round_to_nearest_cent_half_away() {
        assert_eq!(dollars_to_cents(dec!(0.88)).unwrap(), 88);
        assert_eq!(dollars_to_cents(dec!(0.875)).unwrap(), 88);
        assert_eq!(dollars_to_cents(dec!(0.884)).unwrap(), 88);
        assert_eq!(dollars_to_cents(dec!(0.885)).unwrap(), 89);
    }

    #[test]
    fn rates_round_to_four_places() {
        assert_eq!(round_rate(dec!(9.74999)), dec!(9.75));
        assert_eq!(round_rate(dec!(9.75)), dec!(9.75));
        assert_eq!(round_rate(dec!(9.123456)), dec!(9.1235));
    }

    #[test]
    fn source_tags_match_stored_values() {
        assert_eq!(TaxSource::TaxjarApi.as_str(), "taxjar_api");
        assert_eq!(TaxSource::StripeTaxFallback.as_str(), "stripe_tax_fallback");
    }
}

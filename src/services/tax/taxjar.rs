//! Primary tax provider: the TaxJar `taxes` endpoint.

use super::{dollars_to_cents, round_rate, TaxProvider, TaxQuote, TaxQuoteRequest, TaxSource};
use crate::config::WarehouseAddress;
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct TaxJarProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    origin: WarehouseAddress,
}

impl TaxJarProvider {
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        api_key: Option<String>,
        origin: WarehouseAddress,
    ) -> Self {
        Self {
            client,
            api_base,
            api_key,
            origin,
        }
    }
}

#[derive(Debug, Serialize)]
struct TaxForOrderRequest<'a> {
    from_country: &'a str,
    from_zip: &'a str,
    from_state: &'a str,
    from_city: &'a str,
    to_country: &'a str,
    to_zip: &'a str,
    to_state: &'a str,
    to_city: &'a str,
    to_street: &'a str,
    amount: Decimal,
    shipping: Decimal,
    line_items: Vec<TaxForOrderLineItem<'a>>,
}

#[derive(Debug, Serialize)]
struct TaxForOrderLineItem<'a> {
    id: &'a str,
    quantity: i64,
    unit_price: Decimal,
    // product_tax_code omitted on purpose: general taxable goods
}

#[derive(Debug, Deserialize)]
struct TaxForOrderResponse {
    tax: TaxBody,
}

#[derive(Debug, Deserialize)]
struct TaxBody {
    rate: Option<Decimal>,
    amount_to_collect: Decimal,
    breakdown: Option<TaxBreakdown>,
}

#[derive(Debug, Deserialize)]
struct TaxBreakdown {
    combined_tax_rate: Option<Decimal>,
}

#[async_trait]
impl TaxProvider for TaxJarProvider {
    fn name(&self) -> &'static str {
        "taxjar"
    }

    async fn quote(&self, request: &TaxQuoteRequest) -> Result<TaxQuote, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ServiceError::ExternalServiceError("TaxJar API key not configured".to_string())
        })?;

        let dest = &request.destination;
        let body = TaxForOrderRequest {
            from_country: &self.origin.country,
            from_zip: &self.origin.zip,
            from_state: &self.origin.state,
            from_city: &self.origin.city,
            to_country: &dest.country,
            to_zip: &dest.zipcode,
            to_state: &dest.state,
            to_city: &dest.city,
            to_street: &dest.address,
            amount: request.taxable_amount,
            shipping: request.shipping,
            line_items: request
                .line_items
                .iter()
                .map(|li| TaxForOrderLineItem {
                    id: &li.id,
                    quantity: li.quantity,
                    unit_price: li.unit_price,
                })
                .collect(),
        };

        debug!(
            to_country = %dest.country,
            to_state = %dest.state,
            to_zip = %dest.zipcode,
            amount = %request.taxable_amount,
            "calling TaxJar taxes endpoint"
        );

        let response = self
            .client
            .post(format!("{}/v2/taxes", self.api_base))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ServiceError::ExternalServiceError(format!("TaxJar error: {e}")))?;

        let parsed: TaxForOrderResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("malformed TaxJar response: {e}"))
        })?;

        // Prefer the top-level rate; fall back to the breakdown combined rate.
        let rate = parsed
            .tax
            .rate
            .or(parsed.tax.breakdown.and_then(|b| b.combined_tax_rate))
            .ok_or_else(|| {
                ServiceError::ExternalServiceError(
                    "TaxJar response carried no usable rate".to_string(),
                )
            })?;

        Ok(TaxQuote {
            rate_percentage: round_rate(rate * Decimal::ONE_HUNDRED),
            amount_cents: dollars_to_cents(parsed.tax.amount_to_collect)?,
            source: TaxSource::TaxjarApi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn response_parsing_prefers_top_level_rate() {
        let json = r#"{"tax":{"rate":0.0975,"amount_to_collect":0.88,"breakdown":{"combined_tax_rate":0.08}}}"#;
        let parsed: TaxForOrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.tax.rate, Some(dec!(0.0975)));
        assert_eq!(parsed.tax.amount_to_collect, dec!(0.88));
    }

    #[test]
    fn response_parsing_falls_back_to_breakdown_rate() {
        let json = r#"{"tax":{"amount_to_collect":0.5,"breakdown":{"combined_tax_rate":0.065}}}"#;
        let parsed: TaxForOrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.tax.rate, None);
        let rate = parsed
            .tax
            .breakdown
            .and_then(|b| b.combined_tax_rate)
            .unwrap();
        assert_eq!(rate, dec!(0.065));
    }
}

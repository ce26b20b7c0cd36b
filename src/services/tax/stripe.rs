//! Fallback tax provider: the Stripe Tax calculations endpoint.
//!
//! Used only when TaxJar fails. One generic taxable line item
//! (`txcd_99999999`), exclusive tax behavior, same destination address.

use super::{round_rate, TaxProvider, TaxQuote, TaxQuoteRequest, TaxSource};
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

pub struct StripeTaxProvider {
    client: reqwest::Client,
    api_base: String,
    secret_key: Option<String>,
}

impl StripeTaxProvider {
    pub fn new(client: reqwest::Client, api_base: String, secret_key: Option<String>) -> Self {
        Self {
            client,
            api_base,
            secret_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaxCalculationResponse {
    /// Exclusive tax amount, already in integer cents.
    tax_amount_exclusive: i64,
}

#[async_trait]
impl TaxProvider for StripeTaxProvider {
    fn name(&self) -> &'static str {
        "stripe_tax"
    }

    async fn quote(&self, request: &TaxQuoteRequest) -> Result<TaxQuote, ServiceError> {
        let secret_key = self.secret_key.as_deref().ok_or_else(|| {
            ServiceError::ExternalServiceError("Stripe secret key not configured".to_string())
        })?;

        let taxable_cents = super::dollars_to_cents(request.taxable_amount)?;
        if taxable_cents <= 0 {
            return Err(ServiceError::ExternalServiceError(
                "nothing to tax".to_string(),
            ));
        }

        let dest = &request.destination;
        let amount = taxable_cents.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("currency", "usd"),
            ("line_items[0][amount]", &amount),
            ("line_items[0][reference]", "crypto_payment_fallback"),
            ("line_items[0][tax_code]", "txcd_99999999"),
            ("line_items[0][tax_behavior]", "exclusive"),
            ("customer_details[address][country]", &dest.country),
            ("customer_details[address][state]", &dest.state),
            ("customer_details[address][city]", &dest.city),
            ("customer_details[address][postal_code]", &dest.zipcode),
            ("customer_details[address][line1]", &dest.address),
        ];
        if let Some(line2) = dest.address_line_2.as_deref() {
            form.push(("customer_details[address][line2]", line2));
        }

        debug!(
            to_country = %dest.country,
            to_state = %dest.state,
            amount_cents = taxable_cents,
            "calling Stripe Tax calculations endpoint"
        );

        let response = self
            .client
            .post(format!("{}/v1/tax/calculations", self.api_base))
            .basic_auth(secret_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ServiceError::ExternalServiceError(format!("Stripe Tax error: {e}")))?;

        let parsed: TaxCalculationResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("malformed Stripe Tax response: {e}"))
        })?;

        // A non-positive exclusive amount means the fallback produced nothing
        // usable; let the chain degrade to zero tax with no source recorded.
        if parsed.tax_amount_exclusive <= 0 {
            return Err(ServiceError::ExternalServiceError(
                "Stripe Tax returned no exclusive tax amount".to_string(),
            ));
        }

        let rate = Decimal::from(parsed.tax_amount_exclusive) / Decimal::from(taxable_cents)
            * Decimal::ONE_HUNDRED;

        Ok(TaxQuote {
            rate_percentage: round_rate(rate),
            amount_cents: parsed.tax_amount_exclusive,
            source: TaxSource::StripeTaxFallback,
        })
    }
}

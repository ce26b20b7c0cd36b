//! Payment record creation, status lifecycle and the admin review surface.

use crate::entities::crypto_payment::{self, Entity as CryptoPayment};
use crate::errors::ServiceError;
use crate::services::address::{self, ShippingAddressInput};
use crate::services::tax::{TaxLineItem, TaxQuote, TaxQuoteRequest, TaxQuoteService};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Client-observed payment lifecycle.
///
/// pending -> processing -> submitted -> confirmed|complete on the happy
/// path; failed from any non-terminal state. Transitions are reported by the
/// client after it observes its own on-chain transaction; the server records
/// them last-write-wins and never verifies settlement itself. A session that
/// dies between submitted and confirmed leaves the row at submitted forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Submitted,
    Confirmed,
    Complete,
    Failed,
}

impl PaymentStatus {
    pub fn is_confirmation(&self) -> bool {
        matches!(self, PaymentStatus::Confirmed | PaymentStatus::Complete)
    }
}

/// Checkout submission. Order-content descriptors and payment-method flags
/// are carried opaquely into metadata; this subsystem does not validate them.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateCryptoPaymentRequest {
    pub shipping_address: Option<ShippingAddressInput>,
    /// Positive quantity, defaulting to 1; fractional input is floored and
    /// clamped into `1..=10_000`.
    pub quantity: Option<f64>,
    pub listing_id: Option<String>,
    pub order_items: Option<String>,
    pub include_display_case: Option<bool>,
    pub display_case_quantity: Option<i64>,
    pub card_finish: Option<String>,
    pub custom_image_url: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub cart_items: Option<serde_json::Value>,
    /// Client-generated key; retried submissions carrying the same key
    /// collapse into the original record.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CryptoPaymentResponse {
    pub success: bool,
    pub transaction_id: String,
    /// Total in cents (base + tax).
    pub amount: i64,
    pub base_amount: i64,
    /// Always zero on the crypto path.
    pub shipping_amount: i64,
    pub tax_amount: i64,
    /// Tax rate as a percentage, e.g. `9.75`.
    pub tax_rate: Decimal,
    pub receiving_address: String,
    pub payment_id: Uuid,
    pub message: String,
}

impl CryptoPaymentResponse {
    fn from_model(model: &crypto_payment::Model) -> Self {
        let total_usd = Decimal::from(model.amount_cents) / Decimal::ONE_HUNDRED;
        Self {
            success: true,
            transaction_id: model.transaction_id.clone(),
            amount: model.amount_cents,
            base_amount: model.base_amount_cents,
            shipping_amount: 0,
            tax_amount: model.tax_amount_cents,
            tax_rate: model.tax_rate_percentage,
            receiving_address: model.receiving_address.clone(),
            payment_id: model.id,
            message: format!(
                "Please send ${total_usd:.2} USD worth of crypto to the address below."
            ),
        }
    }
}

/// Status report from the client.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub transaction_id: String,
    pub status: String,
    pub transaction_hash: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// Partial dimensions update. A field absent from the request body is left
/// untouched; an explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateDimensionsRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<f64>)]
    pub pounds: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<f64>)]
    pub length: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<f64>)]
    pub width: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<f64>)]
    pub height: Option<Option<Decimal>>,
}

/// Deployment-fixed settings the service needs per payment.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub unit_price_cents: i64,
    pub receiving_address: String,
}

pub struct CryptoPaymentService {
    db: Arc<DatabaseConnection>,
    tax: TaxQuoteService,
    settings: PaymentSettings,
}

impl CryptoPaymentService {
    pub fn new(db: Arc<DatabaseConnection>, tax: TaxQuoteService, settings: PaymentSettings) -> Self {
        Self { db, tax, settings }
    }

    /// Create a payment record for a checkout submission.
    ///
    /// Address validation runs first so a malformed address never costs an
    /// external call. The database insert is the last step: a persistence
    /// failure leaves no partial state.
    pub async fn create_payment(
        &self,
        request: CreateCryptoPaymentRequest,
    ) -> Result<CryptoPaymentResponse, ServiceError> {
        let shipping_address = request.shipping_address.as_ref().ok_or_else(|| {
            ServiceError::ValidationError("Missing shipping address".to_string())
        })?;
        let destination = address::normalize(shipping_address)?;

        let idempotency_key = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        // Retried submission with a known key returns the original record.
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                info!(
                    transaction_id = %existing.transaction_id,
                    idempotency_key = key,
                    "returning existing payment for replayed idempotency key"
                );
                return Ok(CryptoPaymentResponse::from_model(&existing));
            }
        }

        let quantity = quantity_or_default(request.quantity);
        let base_amount_cents = self.settings.unit_price_cents * quantity;
        let unit_price = Decimal::from(self.settings.unit_price_cents) / Decimal::ONE_HUNDRED;
        let taxable_amount = Decimal::from(base_amount_cents) / Decimal::ONE_HUNDRED;

        let tax_request = TaxQuoteRequest {
            destination: destination.clone(),
            taxable_amount,
            shipping: Decimal::ZERO,
            line_items: vec![TaxLineItem {
                id: "card-001".to_string(),
                quantity,
                unit_price,
            }],
        };

        let tax_quote = self.tax.quote(&tax_request).await?;
        let (tax_rate_percentage, tax_amount_cents) = match &tax_quote {
            Some(quote) => (quote.rate_percentage, quote.amount_cents),
            None => (Decimal::ZERO, 0),
        };

        let amount_cents = base_amount_cents + tax_amount_cents;
        let now = Utc::now();
        let transaction_id = generate_transaction_id(now);
        let order_id = generate_order_id(now);

        let model = crypto_payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(transaction_id.clone()),
            order_id: Set(order_id),
            idempotency_key: Set(idempotency_key.clone()),
            amount_cents: Set(amount_cents),
            base_amount_cents: Set(base_amount_cents),
            tax_amount_cents: Set(tax_amount_cents),
            tax_rate_percentage: Set(tax_rate_percentage),
            currency: Set("USD".to_string()),
            status: Set(PaymentStatus::Pending.to_string()),
            receiving_address: Set(self.settings.receiving_address.clone()),
            token_contract_address: Set(None),
            company: Set(destination.company.clone()),
            address: Set(destination.address.clone()),
            address_line_2: Set(destination.address_line_2.clone()),
            city: Set(destination.city.clone()),
            state: Set(destination.state.clone()),
            zipcode: Set(destination.zipcode.clone()),
            country: Set(destination.country.clone()),
            order_items: Set(Some(
                request
                    .order_items
                    .clone()
                    .unwrap_or_else(|| "Custom Card".to_string()),
            )),
            quantity: Set(quantity as i32),
            metadata: Set(Some(build_metadata(&request, tax_quote.as_ref()))),
            pounds: Set(None),
            length: Set(None),
            width: Set(None),
            height: Set(None),
            transaction_hash: Set(None),
            created_at: Set(now),
            confirmed_at: Set(None),
        };

        // Two concurrent submissions with the same fresh key can both pass
        // the lookup above; the unique index catches the loser, which then
        // returns the winner's record.
        let stored = match model.insert(&*self.db).await {
            Ok(stored) => stored,
            Err(err) => {
                if let (Some(key), Some(SqlErr::UniqueConstraintViolation(_))) =
                    (idempotency_key.as_deref(), err.sql_err())
                {
                    if let Some(existing) = self.find_by_idempotency_key(key).await? {
                        info!(
                            transaction_id = %existing.transaction_id,
                            idempotency_key = key,
                            "concurrent submission lost the insert race; returning existing payment"
                        );
                        return Ok(CryptoPaymentResponse::from_model(&existing));
                    }
                }
                return Err(err.into());
            }
        };

        info!(
            payment_id = %stored.id,
            transaction_id = %stored.transaction_id,
            amount_cents = stored.amount_cents,
            tax_amount_cents = stored.tax_amount_cents,
            tax_rate = %stored.tax_rate_percentage,
            "crypto payment created"
        );

        Ok(CryptoPaymentResponse::from_model(&stored))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<crypto_payment::Model>, ServiceError> {
        Ok(CryptoPayment::find()
            .filter(crypto_payment::Column::IdempotencyKey.eq(key))
            .one(&*self.db)
            .await?)
    }

    /// Record a client-reported status transition. Last-write-wins: no
    /// concurrency token guards racing reports for the same transaction.
    pub async fn update_status(&self, request: UpdateStatusRequest) -> Result<(), ServiceError> {
        let status = PaymentStatus::from_str(request.status.trim()).map_err(|_| {
            ServiceError::ValidationError(format!("unknown payment status: {}", request.status))
        })?;

        let payment = CryptoPayment::find()
            .filter(crypto_payment::Column::TransactionId.eq(request.transaction_id.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("payment {}", request.transaction_id))
            })?;

        let mut active = payment.into_active_model();
        active.status = Set(status.to_string());
        if let Some(hash) = request.transaction_hash.as_deref().filter(|h| !h.is_empty()) {
            active.transaction_hash = Set(Some(hash.to_string()));
        }
        if status.is_confirmation() {
            active.confirmed_at = Set(Some(request.confirmed_at.unwrap_or_else(Utc::now)));
        }
        active.update(&*self.db).await?;

        info!(
            transaction_id = %request.transaction_id,
            status = %status,
            "payment status recorded"
        );
        if status == PaymentStatus::Failed {
            warn!(
                transaction_id = %request.transaction_id,
                "client reported a failed transfer"
            );
        }
        Ok(())
    }

    /// Update package dimensions. Only fields present in the request change;
    /// these four columns are writable solely through the admin surface.
    pub async fn update_dimensions(
        &self,
        id: Uuid,
        request: UpdateDimensionsRequest,
    ) -> Result<crypto_payment::Model, ServiceError> {
        let payment = CryptoPayment::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment {id}")))?;

        let mut active = payment.into_active_model();
        if let Some(pounds) = request.pounds {
            active.pounds = Set(pounds);
        }
        if let Some(length) = request.length {
            active.length = Set(length);
        }
        if let Some(width) = request.width {
            active.width = Set(width);
        }
        if let Some(height) = request.height {
            active.height = Set(height);
        }

        Ok(active.update(&*self.db).await?)
    }

    /// All payments, newest first, optionally filtered by a case-insensitive
    /// substring over order id, company, city and country. Filtering happens
    /// in process: this backs an internal low-volume admin tool.
    pub async fn list_payments(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<crypto_payment::Model>, ServiceError> {
        let payments = CryptoPayment::find()
            .order_by_desc(crypto_payment::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let needle = term.to_lowercase();
                Ok(payments
                    .into_iter()
                    .filter(|p| matches_search(p, &needle))
                    .collect())
            }
            None => Ok(payments),
        }
    }

    pub async fn get_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<crypto_payment::Model, ServiceError> {
        CryptoPayment::find()
            .filter(crypto_payment::Column::TransactionId.eq(transaction_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment {transaction_id}")))
    }

    /// CSV of the same view `list_payments` returns for the given search:
    /// the export always matches what the admin table is showing.
    pub async fn export_csv(&self, search: Option<&str>) -> Result<String, ServiceError> {
        let payments = self.list_payments(search).await?;
        Ok(render_csv(&payments))
    }
}

/// Upper bound on units per submission. Keeps cent totals far away from
/// `i64` overflow and the stored quantity within `i32`.
const MAX_QUANTITY: i64 = 10_000;

fn quantity_or_default(quantity: Option<f64>) -> i64 {
    let q = quantity.unwrap_or(1.0);
    if !q.is_finite() {
        return 1;
    }
    (q.floor() as i64).clamp(1, MAX_QUANTITY)
}

/// Opaque client-visible identifier: `crypto_<millis>_<rand9>`.
fn generate_transaction_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("crypto_{}_{}", now.timestamp_millis(), suffix)
}

/// Display-facing order number: `923` + last three digits of the timestamp
/// + three random digits. Not globally unique.
fn generate_order_id(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis();
    format!(
        "923{:03}{:03}",
        millis.rem_euclid(1000),
        rand::thread_rng().gen_range(0..1000)
    )
}

fn build_metadata(
    request: &CreateCryptoPaymentRequest,
    tax_quote: Option<&TaxQuote>,
) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("payment_method".to_string(), json!("crypto"));
    map.insert(
        "include_display_case".to_string(),
        json!(request.include_display_case.unwrap_or(false)),
    );
    map.insert(
        "display_case_quantity".to_string(),
        json!(request.display_case_quantity.unwrap_or(1)),
    );
    map.insert(
        "card_finish".to_string(),
        json!(request.card_finish.as_deref().unwrap_or("matte")),
    );
    if let Some(quote) = tax_quote {
        map.insert(
            "tax_calculation_source".to_string(),
            json!(quote.source.as_str()),
        );
    }
    if let Some(url) = &request.custom_image_url {
        map.insert("custom_image_url".to_string(), json!(url));
    }
    if let Some(items) = &request.cart_items {
        map.insert("cart_items".to_string(), items.clone());
    }
    if let Some(listing) = &request.listing_id {
        map.insert("listing_id".to_string(), json!(listing));
    }
    serde_json::Value::Object(map)
}

fn matches_search(payment: &crypto_payment::Model, needle: &str) -> bool {
    let company = payment.company.as_deref().unwrap_or_default();
    payment.order_id.to_lowercase().contains(needle)
        || company.to_lowercase().contains(needle)
        || payment.city.to_lowercase().contains(needle)
        || payment.country.to_lowercase().contains(needle)
}

const CSV_HEADERS: [&str; 18] = [
    "Order ID",
    "Company",
    "Address",
    "Address Line 2",
    "City",
    "State",
    "Zipcode",
    "Country",
    "Order Items",
    "Pounds",
    "Length",
    "Width",
    "Height",
    "Amount",
    "Tax Rate",
    "Status",
    "Transaction Hash",
    "Created At",
];

fn render_csv(payments: &[crypto_payment::Model]) -> String {
    let mut out = String::new();
    out.push_str(&csv_row(CSV_HEADERS.iter().map(|s| s.to_string())));

    for p in payments {
        let amount_usd = Decimal::from(p.amount_cents) / Decimal::ONE_HUNDRED;
        let fields = [
            p.order_id.clone(),
            p.company.clone().unwrap_or_default(),
            p.address.clone(),
            p.address_line_2.clone().unwrap_or_default(),
            p.city.clone(),
            p.state.clone(),
            p.zipcode.clone(),
            p.country.clone(),
            p.order_items.clone().unwrap_or_default(),
            p.pounds.map(|d| d.to_string()).unwrap_or_default(),
            p.length.map(|d| d.to_string()).unwrap_or_default(),
            p.width.map(|d| d.to_string()).unwrap_or_default(),
            p.height.map(|d| d.to_string()).unwrap_or_default(),
            format!("${amount_usd:.2}"),
            format!("{}%", p.tax_rate_percentage),
            p.status.clone(),
            p.transaction_hash.clone().unwrap_or_default(),
            p.created_at.format("%Y-%m-%d").to_string(),
        ];
        out.push_str(&csv_row(fields.into_iter()));
    }
    out
}

fn csv_row(fields: impl Iterator<Item = String>) -> String {
    let quoted: Vec<String> = fields
        .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
        .collect();
    format!("{}\n", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_is_floored_and_clamped() {
        assert_eq!(quantity_or_default(None), 1);
        assert_eq!(quantity_or_default(Some(0.0)), 1);
        assert_eq!(quantity_or_default(Some(-3.0)), 1);
        assert_eq!(quantity_or_default(Some(2.9)), 2);
        assert_eq!(quantity_or_default(Some(4.0)), 4);
        assert_eq!(quantity_or_default(Some(f64::NAN)), 1);
        assert_eq!(quantity_or_default(Some(f64::INFINITY)), 1);
        assert_eq!(quantity_or_default(Some(1e17)), MAX_QUANTITY);
    }

    #[test]
    fn transaction_ids_carry_the_expected_shape() {
        let now = Utc::now();
        let id = generate_transaction_id(now);
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts[0], "crypto");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
    }

    #[test]
    fn order_ids_are_nine_digits_with_prefix() {
        let id = generate_order_id(Utc::now());
        assert_eq!(id.len(), 9);
        assert!(id.starts_with("923"));
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(PaymentStatus::Pending.to_string(), "pending");
        assert_eq!(
            PaymentStatus::from_str("submitted").unwrap(),
            PaymentStatus::Submitted
        );
        assert!(PaymentStatus::from_str("settled").is_err());
        assert!(PaymentStatus::Confirmed.is_confirmation());
        assert!(PaymentStatus::Complete.is_confirmation());
        assert!(!PaymentStatus::Submitted.is_confirmation());
    }

    #[test]
    fn csv_rows_escape_embedded_quotes() {
        let row = csv_row(vec![r#"Acme "North""#.to_string(), "US".to_string()].into_iter());
        assert_eq!(row, "\"Acme \"\"North\"\"\",\"US\"\n");
    }
}

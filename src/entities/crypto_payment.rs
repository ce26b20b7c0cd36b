use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per checkout attempt.
///
/// Money is stored in integer minor units (cents). The invariant
/// `amount_cents = base_amount_cents + tax_amount_cents` holds at all times;
/// shipping is always zero on the crypto path. Several columns are read by
/// name from the admin tooling, so this layout must stay bit-compatible.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crypto_payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client-visible identifier, unique per attempt.
    #[sea_orm(unique)]
    pub transaction_id: String,

    /// Display-facing order number. Derived from a timestamp plus a random
    /// suffix and NOT guaranteed globally unique.
    pub order_id: String,

    /// Client-generated key collapsing retried submissions into one record.
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,

    pub amount_cents: i64,
    pub base_amount_cents: i64,
    pub tax_amount_cents: i64,

    /// Tax rate as a percentage, e.g. `9.75`.
    pub tax_rate_percentage: Decimal,

    pub currency: String,
    pub status: String,

    /// Fixed per-deployment wallet address; same for every order.
    pub receiving_address: String,

    /// Set only when the asset is a token rather than the chain's native asset.
    pub token_contract_address: Option<String>,

    pub company: Option<String>,
    pub address: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub country: String,

    pub order_items: Option<String>,
    pub quantity: i32,

    /// Opaque structured metadata (payment-method flags, cart items, tax
    /// source tag). Not validated by this subsystem.
    pub metadata: Option<Json>,

    // Package dimensions, filled in post-creation by the admin surface only.
    pub pounds: Option<Decimal>,
    pub length: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,

    pub transaction_hash: Option<String>,

    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! Internal fulfillment endpoints: payment review, dimension entry, CSV export.
//!
//! These sit behind the deployment's network boundary; there is no
//! per-request authorization here.

use crate::entities::crypto_payment;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::UpdateDimensionsRequest;
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    routing::{get, patch},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Case-insensitive substring matched against order id, company, city
    /// and country.
    pub q: Option<String>,
}

/// Admin view of one payment. Leaves out the idempotency key and raw
/// metadata internals the fulfillment team has no use for.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminPaymentRow {
    pub id: Uuid,
    pub transaction_id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub base_amount_cents: i64,
    pub tax_amount_cents: i64,
    #[schema(value_type = f64)]
    pub tax_rate_percentage: Decimal,
    pub currency: String,
    pub status: String,
    pub company: Option<String>,
    pub address: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub country: String,
    pub order_items: Option<String>,
    pub quantity: i32,
    #[schema(value_type = Option<f64>)]
    pub pounds: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub length: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub width: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub height: Option<Decimal>,
    pub transaction_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl From<crypto_payment::Model> for AdminPaymentRow {
    fn from(m: crypto_payment::Model) -> Self {
        Self {
            id: m.id,
            transaction_id: m.transaction_id,
            order_id: m.order_id,
            amount_cents: m.amount_cents,
            base_amount_cents: m.base_amount_cents,
            tax_amount_cents: m.tax_amount_cents,
            tax_rate_percentage: m.tax_rate_percentage,
            currency: m.currency,
            status: m.status,
            company: m.company,
            address: m.address,
            address_line_2: m.address_line_2,
            city: m.city,
            state: m.state,
            zipcode: m.zipcode,
            country: m.country,
            order_items: m.order_items,
            quantity: m.quantity,
            pounds: m.pounds,
            length: m.length,
            width: m.width,
            height: m.height,
            transaction_hash: m.transaction_hash,
            created_at: m.created_at,
            confirmed_at: m.confirmed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminPaymentList {
    pub payments: Vec<AdminPaymentRow>,
    pub total: usize,
}

/// List crypto payments, newest first
#[utoipa::path(
    get,
    path = "/api/v1/admin/crypto-payments",
    params(SearchQuery),
    responses((status = 200, description = "Payments matching the search", body = AdminPaymentList)),
    tag = "Admin"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<AdminPaymentList>, ServiceError> {
    let payments = state.payments.list_payments(query.q.as_deref()).await?;
    let rows: Vec<AdminPaymentRow> = payments.into_iter().map(Into::into).collect();
    let total = rows.len();
    Ok(Json(AdminPaymentList {
        payments: rows,
        total,
    }))
}

/// Set package dimensions on a payment
#[utoipa::path(
    patch,
    path = "/api/v1/admin/crypto-payments/{id}/dimensions",
    params(("id" = Uuid, Path, description = "Payment id")),
    request_body = UpdateDimensionsRequest,
    responses(
        (status = 200, description = "Updated payment", body = AdminPaymentRow),
        (status = 404, description = "No payment with that id")
    ),
    tag = "Admin"
)]
pub async fn update_dimensions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDimensionsRequest>,
) -> Result<Json<AdminPaymentRow>, ServiceError> {
    let updated = state.payments.update_dimensions(id, request).await?;
    Ok(Json(updated.into()))
}

/// Export payments as CSV
///
/// Honors the same `q` filter as the list endpoint, so the export always
/// matches the table the admin is looking at.
#[utoipa::path(
    get,
    path = "/api/v1/admin/crypto-payments/export",
    params(SearchQuery),
    responses((status = 200, description = "CSV attachment", content_type = "text/csv")),
    tag = "Admin"
)]
pub async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<(HeaderMap, String), ServiceError> {
    let csv = state.payments.export_csv(query.q.as_deref()).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    let filename = format!(
        "attachment; filename=\"crypto-payments-{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&filename)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?,
    );
    Ok((headers, csv))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/crypto-payments", get(list_payments))
        .route("/admin/crypto-payments/export", get(export_csv))
        .route(
            "/admin/crypto-payments/:id/dimensions",
            patch(update_dimensions),
        )
}

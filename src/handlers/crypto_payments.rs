//! Public checkout endpoints for the crypto payment flow.

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::{
    CreateCryptoPaymentRequest, CryptoPaymentResponse, UpdateStatusRequest,
};
use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

/// Create a crypto payment record for a checkout submission
#[utoipa::path(
    post,
    path = "/api/v1/crypto-payments",
    request_body = CreateCryptoPaymentRequest,
    responses(
        (status = 200, description = "Payment record created", body = CryptoPaymentResponse),
        (status = 400, description = "Invalid or incomplete shipping address"),
        (status = 500, description = "Persistence failure")
    ),
    tag = "Crypto Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreateCryptoPaymentRequest>,
) -> Result<Json<CryptoPaymentResponse>, ServiceError> {
    let response = state.payments.create_payment(request).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusUpdateResponse {
    pub success: bool,
}

/// Record a client-reported payment status transition
#[utoipa::path(
    post,
    path = "/api/v1/crypto-payments/status",
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status recorded", body = StatusUpdateResponse),
        (status = 400, description = "Unknown status value"),
        (status = 404, description = "No payment with that transaction id")
    ),
    tag = "Crypto Payments"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<StatusUpdateResponse>, ServiceError> {
    state.payments.update_status(request).await?;
    Ok(Json(StatusUpdateResponse { success: true }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EthQuoteResponse {
    pub transaction_id: String,
    /// Total owed in cents.
    pub amount_cents: i64,
    /// ETH amount formatted to six decimal places, e.g. `0.003213`.
    pub eth_amount: String,
    /// ETH/USD price used for the conversion.
    #[schema(value_type = f64)]
    pub eth_price_usd: Decimal,
    /// Which price source produced the quote.
    pub price_source: String,
}

/// ETH quote for an existing payment
///
/// The first quote for a transaction is cached; every later call returns the
/// same ETH amount so the figure the customer saw is the figure they send.
#[utoipa::path(
    get,
    path = "/api/v1/crypto-payments/{transaction_id}/quote",
    params(("transaction_id" = String, Path, description = "Payment transaction id")),
    responses(
        (status = 200, description = "ETH quote", body = EthQuoteResponse),
        (status = 404, description = "No payment with that transaction id")
    ),
    tag = "Crypto Payments"
)]
pub async fn eth_quote(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<EthQuoteResponse>, ServiceError> {
    let payment = state.payments.get_by_transaction_id(&transaction_id).await?;
    let quote = state
        .pricing
        .quote_for(&payment.transaction_id, payment.amount_cents)
        .await?;

    Ok(Json(EthQuoteResponse {
        transaction_id: payment.transaction_id,
        amount_cents: payment.amount_cents,
        eth_amount: quote.eth_amount,
        eth_price_usd: quote.price_usd,
        price_source: quote.source,
    }))
}

pub fn crypto_payment_routes() -> Router<AppState> {
    Router::new()
        .route("/crypto-payments", post(create_payment))
        .route("/crypto-payments/status", post(update_status))
        .route("/crypto-payments/:transaction_id/quote", get(eth_quote))
}

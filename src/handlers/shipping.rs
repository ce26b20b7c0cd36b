use crate::handlers::AppState;
use crate::services::shipping::{shipping_option_for_country, ShippingOption};
use axum::{
    extract::{Json, Query},
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ShippingQuery {
    /// ISO 3166-1 alpha-2 country code; anything outside US/CA prices as
    /// international.
    pub country: Option<String>,
}

/// Shipping quote for a destination country
#[utoipa::path(
    get,
    path = "/api/v1/shipping/quote",
    params(ShippingQuery),
    responses((status = 200, description = "Shipping option", body = ShippingOption)),
    tag = "Shipping"
)]
pub async fn shipping_quote(Query(query): Query<ShippingQuery>) -> Json<ShippingOption> {
    let country = query.country.as_deref().unwrap_or("US");
    Json(shipping_option_for_country(country.trim()))
}

pub fn shipping_routes() -> Router<AppState> {
    Router::new().route("/shipping/quote", get(shipping_quote))
}

//! Checkout API Library
//!
//! Crypto checkout backend: jurisdiction-aware tax quoting, ETH price
//! quoting with oracle fallback, payment records and an admin review
//! surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use services::payments::{CryptoPaymentService, PaymentSettings};
use services::pricing::{ChainlinkFeedSource, PriceIndexSource, PriceQuoteService, PriceSource};
use services::tax::stripe::StripeTaxProvider;
use services::tax::taxjar::TaxJarProvider;
use services::tax::{TaxProvider, TaxQuoteService};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub payments: Arc<CryptoPaymentService>,
    pub pricing: Arc<PriceQuoteService>,
}

/// Build the service layer from validated configuration.
///
/// Provider chains are ordered here and nowhere else: TaxJar before Stripe
/// Tax, the on-chain feed before the price index. A feed that cannot be
/// constructed (bad RPC URL or feed address) is skipped with a warning
/// rather than refusing to start; the index and fixed-price fallbacks still
/// cover quoting.
pub fn build_services(
    cfg: &config::AppConfig,
    db: Arc<DatabaseConnection>,
) -> Result<(Arc<CryptoPaymentService>, Arc<PriceQuoteService>), errors::ServiceError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()
        .map_err(|e| errors::ServiceError::InternalError(format!("http client: {e}")))?;

    let tax_providers: Vec<Arc<dyn TaxProvider>> = vec![
        Arc::new(TaxJarProvider::new(
            http.clone(),
            cfg.taxjar_api_base.clone(),
            cfg.taxjar_api_key.clone(),
            cfg.warehouse.clone(),
        )),
        Arc::new(StripeTaxProvider::new(
            http.clone(),
            cfg.stripe_api_base.clone(),
            cfg.stripe_secret_key.clone(),
        )),
    ];
    let tax = TaxQuoteService::new(tax_providers);

    let mut price_sources: Vec<Arc<dyn PriceSource>> = Vec::new();
    match ChainlinkFeedSource::new(
        &cfg.rpc_url,
        &cfg.eth_usd_feed_address,
        Duration::from_secs(cfg.http_timeout_secs),
    ) {
        Ok(feed) => price_sources.push(Arc::new(feed)),
        Err(e) => warn!("price feed unavailable, relying on fallbacks: {}", e),
    }
    price_sources.push(Arc::new(PriceIndexSource::new(
        http,
        cfg.price_api_base.clone(),
    )));
    let pricing = Arc::new(PriceQuoteService::new(price_sources, cfg.is_testnet()));

    let payments = Arc::new(CryptoPaymentService::new(
        db,
        tax,
        PaymentSettings {
            unit_price_cents: cfg.unit_price_cents,
            receiving_address: cfg.receiving_address().to_string(),
        },
    ));

    Ok((payments, pricing))
}

/// All v1 routes, to be nested under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::crypto_payments::crypto_payment_routes())
        .merge(handlers::shipping::shipping_routes())
        .merge(handlers::admin::admin_routes())
}

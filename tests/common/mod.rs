use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use checkout_api::{
    config::AppConfig,
    db,
    errors::ServiceError,
    services::payments::{CryptoPaymentService, PaymentSettings},
    services::pricing::PriceQuoteService,
    services::tax::{TaxProvider, TaxQuote, TaxQuoteRequest, TaxQuoteService, TaxSource},
    AppState,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// Test harness backed by a throwaway SQLite database.
///
/// Tax providers are injected so tests control the fallback chain without
/// any network. Pricing runs in testnet mode (fixed price, no RPC).
pub struct TestApp {
    router: Router,
    pub state: AppState,
    db_file: String,
}

impl TestApp {
    /// App with no working tax providers: every quote degrades to zero tax.
    pub async fn new() -> Self {
        Self::with_tax_providers(vec![]).await
    }

    pub async fn with_tax_providers(providers: Vec<Arc<dyn TaxProvider>>) -> Self {
        let db_file = format!("checkout_test_{}.db", Uuid::new_v4().simple());
        let _ = std::fs::remove_file(&db_file);

        let mut cfg = AppConfig::new(
            format!("sqlite://{db_file}?mode=rwc"),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let payments = Arc::new(CryptoPaymentService::new(
            db_arc.clone(),
            TaxQuoteService::new(providers),
            PaymentSettings {
                unit_price_cents: cfg.unit_price_cents,
                receiving_address: cfg.receiving_address().to_string(),
            },
        ));
        let pricing = Arc::new(PriceQuoteService::new(vec![], true));

        let state = AppState {
            db: db_arc,
            config: cfg,
            payments,
            pricing,
        };

        let router = Router::new()
            .merge(checkout_api::handlers::health::health_routes())
            .nest("/api/v1", checkout_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            db_file,
        }
    }

    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    #[allow(dead_code)]
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.request(Method::GET, uri, None).await
    }

    #[allow(dead_code)]
    pub async fn post_json(&self, uri: &str, body: Value) -> axum::response::Response {
        self.request(Method::POST, uri, Some(body)).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body was not valid json")
}

/// Read a response body as a string.
#[allow(dead_code)]
pub async fn response_text(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("response body was not utf-8")
}

/// Tax provider returning a fixed quote, counting how often it was called.
pub struct FixedTaxProvider {
    pub rate_percentage: Decimal,
    pub amount_cents: i64,
    pub source: TaxSource,
    pub calls: AtomicUsize,
}

impl FixedTaxProvider {
    pub fn new(rate_percentage: Decimal, amount_cents: i64, source: TaxSource) -> Arc<Self> {
        Arc::new(Self {
            rate_percentage,
            amount_cents,
            source,
            calls: AtomicUsize::new(0),
        })
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaxProvider for FixedTaxProvider {
    fn name(&self) -> &'static str {
        "fixed_test_provider"
    }

    async fn quote(&self, _request: &TaxQuoteRequest) -> Result<TaxQuote, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TaxQuote {
            rate_percentage: self.rate_percentage,
            amount_cents: self.amount_cents,
            source: self.source,
        })
    }
}

/// Tax provider that always fails, counting how often it was called.
pub struct FailingTaxProvider {
    pub calls: AtomicUsize,
}

impl FailingTaxProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaxProvider for FailingTaxProvider {
    fn name(&self) -> &'static str {
        "failing_test_provider"
    }

    async fn quote(&self, _request: &TaxQuoteRequest) -> Result<TaxQuote, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::ExternalServiceError(
            "provider down".to_string(),
        ))
    }
}

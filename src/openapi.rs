use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Checkout API",
        version = "0.2.0",
        description = r#"
# Crypto Checkout API

Backend for the crypto checkout flow: payment record creation with
jurisdiction-aware tax quoting, client-reported status tracking, ETH
quoting with oracle fallback, and an internal fulfillment surface.

## Error Handling

Errors come back as a JSON object with a single `error` field:

```json
{
  "error": "Missing required address fields: address, city, state, zipcode, and country are required"
}
```

Client mistakes map to `400`, missing records to `404`, persistence and
internal failures to `500`. Tax and price provider outages never surface
as errors; the affected quote degrades instead.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Crypto Payments", description = "Checkout payment endpoints"),
        (name = "Shipping", description = "Shipping quote endpoints"),
        (name = "Admin", description = "Internal fulfillment endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::crypto_payments::create_payment,
        crate::handlers::crypto_payments::update_status,
        crate::handlers::crypto_payments::eth_quote,
        crate::handlers::shipping::shipping_quote,
        crate::handlers::admin::list_payments,
        crate::handlers::admin::update_dimensions,
        crate::handlers::admin::export_csv,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::services::payments::CreateCryptoPaymentRequest,
            crate::services::payments::CryptoPaymentResponse,
            crate::services::payments::UpdateStatusRequest,
            crate::services::payments::UpdateDimensionsRequest,
            crate::services::payments::PaymentStatus,
            crate::services::address::ShippingAddressInput,
            crate::services::shipping::ShippingOption,
            crate::services::shipping::DeliveryEstimate,
            crate::handlers::crypto_payments::StatusUpdateResponse,
            crate::handlers::crypto_payments::EthQuoteResponse,
            crate::handlers::admin::AdminPaymentRow,
            crate::handlers::admin::AdminPaymentList,
            crate::handlers::health::HealthResponse,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

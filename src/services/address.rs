use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Shipping address as submitted by a client.
///
/// Two field-naming conventions are accepted: the checkout form sends
/// `line1` / `line2` / `postal_code`, persisted rows use `address` /
/// `address_line_2` / `zipcode`. Both may appear in one payload; the storage
/// convention wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddressInput {
    pub email: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,

    // Form convention
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub postal_code: Option<String>,

    // Storage convention
    pub address: Option<String>,
    pub address_line_2: Option<String>,
    pub zipcode: Option<String>,

    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Canonical address record in the storage convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NormalizedAddress {
    pub company: Option<String>,
    pub address: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub country: String,
}

/// Reconcile the two field conventions into one canonical record.
///
/// Runs before any external call so a malformed address never costs a tax
/// API request. All of `address`, `city`, `state`, `zipcode`, `country` must
/// be non-empty after trimming.
pub fn normalize(input: &ShippingAddressInput) -> Result<NormalizedAddress, ServiceError> {
    let address = pick(&input.address, &input.line1);
    let address_line_2 = pick_optional(&input.address_line_2, &input.line2);
    let zipcode = pick(&input.zipcode, &input.postal_code);
    let city = trimmed(&input.city);
    let state = trimmed(&input.state);
    let country = trimmed(&input.country);

    match (address, city, state, zipcode, country) {
        (Some(address), Some(city), Some(state), Some(zipcode), Some(country)) => {
            Ok(NormalizedAddress {
                company: trimmed(&input.company),
                address,
                address_line_2,
                city,
                state,
                zipcode,
                country,
            })
        }
        _ => Err(ServiceError::ValidationError(
            "Missing required address fields: address, city, state, zipcode, and country are required"
                .to_string(),
        )),
    }
}

/// Storage-convention field wins when both are present.
fn pick(storage: &Option<String>, form: &Option<String>) -> Option<String> {
    trimmed(storage).or_else(|| trimmed(form))
}

fn pick_optional(storage: &Option<String>, form: &Option<String>) -> Option<String> {
    trimmed(storage).or_else(|| trimmed(form))
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

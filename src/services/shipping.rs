//! Country-tiered shipping quotes.
//!
//! Shared by the card checkout path so both paths price shipping the same
//! way. The crypto path charges no shipping; it uses none of this beyond
//! display.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryEstimate {
    /// Minimum delivery time in business days.
    pub minimum_business_days: u32,
    /// Maximum delivery time in business days.
    pub maximum_business_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingOption {
    /// Shipping cost in cents.
    pub amount_cents: i64,
    pub display_name: String,
    pub delivery_estimate: DeliveryEstimate,
}

/// Shipping cost in cents for a destination country.
pub fn shipping_cost_for_country(country: &str) -> i64 {
    shipping_option_for_country(country).amount_cents
}

/// Full shipping option for a destination country.
pub fn shipping_option_for_country(country: &str) -> ShippingOption {
    match country {
        "US" => ShippingOption {
            amount_cents: 499,
            display_name: "Standard Shipping".to_string(),
            delivery_estimate: DeliveryEstimate {
                minimum_business_days: 5,
                maximum_business_days: 7,
            },
        },
        "CA" => ShippingOption {
            amount_cents: 1199,
            display_name: "Standard Shipping".to_string(),
            delivery_estimate: DeliveryEstimate {
                minimum_business_days: 7,
                maximum_business_days: 14,
            },
        },
        _ => ShippingOption {
            amount_cents: 1699,
            display_name: "International Shipping".to_string(),
            delivery_estimate: DeliveryEstimate {
                minimum_business_days: 10,
                maximum_business_days: 21,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domestic_canadian_and_international_tiers() {
        assert_eq!(shipping_cost_for_country("US"), 499);
        assert_eq!(shipping_cost_for_country("CA"), 1199);
        assert_eq!(shipping_cost_for_country("GB"), 1699);
        assert_eq!(shipping_cost_for_country("JP"), 1699);
    }

    #[test]
    fn international_option_is_labelled() {
        let option = shipping_option_for_country("DE");
        assert_eq!(option.display_name, "International Shipping");
        assert_eq!(option.delivery_estimate.maximum_business_days, 21);
    }
}

pub mod address;
pub mod payments;
pub mod pricing;
pub mod shipping;
pub mod tax;

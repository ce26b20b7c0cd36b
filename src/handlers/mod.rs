pub mod admin;
pub mod crypto_payments;
pub mod health;
pub mod shipping;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

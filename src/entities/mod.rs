pub mod crypto_payment;

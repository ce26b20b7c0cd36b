use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Receiving address used for development when none is configured.
/// Production deployments must supply their own via `APP__RECEIVING_WALLET_ADDRESS`.
const DEV_DEFAULT_RECEIVING_ADDRESS: &str = "0x9aE153b6C37D812e1BE8C55Ff0dd73c879cb34F8";

/// Warehouse origin used for every tax calculation. One nexus per deployment.
#[derive(Clone, Debug, Deserialize)]
pub struct WarehouseAddress {
    pub country: String,
    pub state: String,
    pub city: String,
    pub zip: String,
}

impl Default for WarehouseAddress {
    fn default() -> Self {
        Self {
            country: "US".to_string(),
            state: "NV".to_string(),
            city: "Las Vegas".to_string(),
            zip: "89108".to_string(),
        }
    }
}

/// Application configuration, layered from `config/{default,<env>}.toml` and
/// `APP__`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment ("development", "test", "production")
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// TaxJar API token. Absence does not crash the service: tax degrades
    /// to zero when no provider is configured or reachable.
    #[serde(default)]
    pub taxjar_api_key: Option<String>,

    /// TaxJar API base URL (overridable for tests)
    #[serde(default = "default_taxjar_api_base")]
    pub taxjar_api_base: String,

    /// Stripe secret key for the tax fallback provider
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Stripe API base URL (overridable for tests)
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Wallet address every payment is sent to. One per deployment, not per order.
    #[serde(default)]
    pub receiving_wallet_address: String,

    /// Network discriminator gating the price source: "mainnet" or "testnet"
    #[serde(default = "default_network")]
    pub network: String,

    /// JSON-RPC endpoint for the on-chain price feed read
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// ETH/USD aggregator contract address
    #[serde(default = "default_eth_usd_feed_address")]
    pub eth_usd_feed_address: String,

    /// Price-index API base URL (overridable for tests)
    #[serde(default = "default_price_api_base")]
    pub price_api_base: String,

    /// Unit price of the product in cents
    #[serde(default = "default_unit_price_cents")]
    pub unit_price_cents: i64,

    /// Timeout applied to every outbound HTTP and RPC call, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Warehouse origin address for tax calculations
    #[serde(default)]
    pub warehouse: WarehouseAddress,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_taxjar_api_base() -> String {
    "https://api.taxjar.com".to_string()
}
fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}
fn default_network() -> String {
    "testnet".to_string()
}
fn default_rpc_url() -> String {
    "https://mainnet.base.org".to_string()
}
fn default_eth_usd_feed_address() -> String {
    // Chainlink ETH/USD aggregator on Base
    "0x71041dddad3595F9CEd3DcCFBe3D1F4b0a16Bb70".to_string()
}
fn default_price_api_base() -> String {
    "https://api.coingecko.com".to_string()
}
fn default_unit_price_cents() -> i64 {
    900
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading error: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl AppConfig {
    /// Construct a configuration directly. Used by tests; production code
    /// goes through [`load_config`].
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            taxjar_api_key: None,
            taxjar_api_base: default_taxjar_api_base(),
            stripe_secret_key: None,
            stripe_api_base: default_stripe_api_base(),
            receiving_wallet_address: DEV_DEFAULT_RECEIVING_ADDRESS.to_string(),
            network: default_network(),
            rpc_url: default_rpc_url(),
            eth_usd_feed_address: default_eth_usd_feed_address(),
            price_api_base: default_price_api_base(),
            unit_price_cents: default_unit_price_cents(),
            http_timeout_secs: default_http_timeout_secs(),
            warehouse: WarehouseAddress::default(),
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            auto_migrate: false,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Testnet deployments skip live pricing entirely; testnet ETH has no
    /// market value, so a live price would be misleading.
    pub fn is_testnet(&self) -> bool {
        self.network.eq_ignore_ascii_case("testnet")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Validate the configuration once at startup.
    ///
    /// Production mode fails fast on a missing or malformed receiving
    /// address. A missing tax credential is permitted in every mode: tax
    /// calculation degrades to zero rather than blocking checkout.
    pub fn validate(&self) -> Result<(), AppConfigError> {
        if self.receiving_wallet_address.is_empty() {
            if self.is_production() {
                return Err(AppConfigError::Validation(
                    "receiving_wallet_address is required in production; set APP__RECEIVING_WALLET_ADDRESS".to_string(),
                ));
            }
        } else if !is_plausible_evm_address(&self.receiving_wallet_address) {
            return Err(AppConfigError::Validation(format!(
                "receiving_wallet_address '{}' is not a valid 0x-prefixed address",
                self.receiving_wallet_address
            )));
        }

        if self.unit_price_cents <= 0 {
            return Err(AppConfigError::Validation(
                "unit_price_cents must be positive".to_string(),
            ));
        }

        if self.taxjar_api_key.is_none() && self.stripe_secret_key.is_none() {
            warn!("no tax provider credentials configured; tax will be calculated as zero");
        }

        Ok(())
    }

    /// Receiving address with the development default applied outside production.
    pub fn receiving_address(&self) -> &str {
        if self.receiving_wallet_address.is_empty() {
            DEV_DEFAULT_RECEIVING_ADDRESS
        } else {
            &self.receiving_wallet_address
        }
    }
}

fn is_plausible_evm_address(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Load configuration from files and environment.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://checkout.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let cfg: AppConfig = config.try_deserialize().map_err(AppConfigError::Load)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Initialize the tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("checkout_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(environment: &str) -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18080,
            environment.to_string(),
        )
    }

    #[test]
    fn production_requires_receiving_address() {
        let mut cfg = base_config("production");
        cfg.receiving_wallet_address = String::new();
        assert!(cfg.validate().is_err());

        cfg.receiving_wallet_address = DEV_DEFAULT_RECEIVING_ADDRESS.to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn development_tolerates_missing_tax_credentials() {
        let cfg = base_config("development");
        assert!(cfg.taxjar_api_key.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn malformed_receiving_address_is_rejected() {
        let mut cfg = base_config("development");
        cfg.receiving_wallet_address = "not-an-address".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn testnet_discriminator() {
        let mut cfg = base_config("development");
        cfg.network = "testnet".to_string();
        assert!(cfg.is_testnet());
        cfg.network = "mainnet".to_string();
        assert!(!cfg.is_testnet());
    }
}

//! Ledger configuration.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use credit_ledger_core::{
    LedgerError, PackageCatalog, Result, DEFAULT_CURRENCY, DEFAULT_SIGNUP_BONUS_CREDITS,
};

/// Which storage backend the ledger runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local maps; data is lost on exit.
    Memory,
    /// `RocksDB` under `data_dir`.
    RocksDb,
    /// `PostgreSQL` at `database_url`.
    Postgres,
}

impl Default for StoreBackend {
    fn default() -> Self {
        if cfg!(feature = "rocksdb-backend") {
            Self::RocksDb
        } else {
            Self::Memory
        }
    }
}

impl FromStr for StoreBackend {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" | "rocks" => Ok(Self::RocksDb),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(LedgerError::Configuration(format!(
                "unknown store backend: {other}"
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::RocksDb => "rocksdb",
            Self::Postgres => "postgres",
        })
    }
}

/// Ledger configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Storage backend (`LEDGER_STORE`, default: rocksdb when compiled in).
    pub store: StoreBackend,

    /// Path to `RocksDB` data directory (default: "data/credit-ledger").
    pub data_dir: String,

    /// `PostgreSQL` connection string, required for the postgres backend.
    pub database_url: Option<String>,

    /// Stripe secret key.
    pub stripe_api_key: Option<String>,

    /// Stripe API host (default: `<https://api.stripe.com>`).
    pub stripe_api_base: String,

    /// Stripe request timeout in seconds.
    pub stripe_timeout_seconds: u64,

    /// Currency for newly opened accounts.
    pub default_currency: String,

    /// Credit packages on offer.
    pub packages: PackageCatalog,

    /// Credits granted when an account is opened. Zero disables the bonus.
    pub signup_bonus_credits: i64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
}

impl LedgerConfig {
    /// Load configuration from environment variables and the secrets file.
    ///
    /// A Stripe key found in `.secrets/stripe.json` takes precedence over
    /// `STRIPE_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Configuration` if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_vars(|key| std::env::var(key).ok())?;
        if let Some(api_key) = load_stripe_secrets() {
            config.stripe_api_key = Some(api_key);
        }
        Ok(config)
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Configuration` if a variable is set but malformed.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let store = var("LEDGER_STORE")
            .map(|s| s.parse::<StoreBackend>())
            .transpose()?
            .unwrap_or(defaults.store);

        let packages = var("CREDIT_PACKAGES")
            .map(|s| {
                s.parse::<PackageCatalog>().map_err(|e| {
                    LedgerError::Configuration(format!("CREDIT_PACKAGES: {e}"))
                })
            })
            .transpose()?
            .unwrap_or(defaults.packages);

        let signup_bonus_credits = parse_var(&var, "SIGNUP_BONUS_CREDITS")?
            .unwrap_or(defaults.signup_bonus_credits);
        if signup_bonus_credits < 0 {
            return Err(LedgerError::Configuration(
                "SIGNUP_BONUS_CREDITS must not be negative".into(),
            ));
        }

        Ok(Self {
            store,
            data_dir: var("DATA_DIR").unwrap_or(defaults.data_dir),
            database_url: var("DATABASE_URL"),
            stripe_api_key: var("STRIPE_API_KEY"),
            stripe_api_base: var("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            stripe_timeout_seconds: parse_var(&var, "STRIPE_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.stripe_timeout_seconds),
            default_currency: var("DEFAULT_CURRENCY")
                .map(|c| c.trim().to_ascii_lowercase())
                .unwrap_or(defaults.default_currency),
            packages,
            signup_bonus_credits,
        })
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| LedgerError::Configuration(format!("{key}: {e}")))
        })
        .transpose()
}

/// Load the Stripe key from a secrets file, if one exists.
fn load_stripe_secrets() -> Option<String> {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return Some(secrets.api_key);
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    None
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> std::io::Result<T> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::default(),
            data_dir: "data/credit-ledger".into(),
            database_url: None,
            stripe_api_key: None,
            stripe_api_base: "https://api.stripe.com".into(),
            stripe_timeout_seconds: 30,
            default_currency: DEFAULT_CURRENCY.into(),
            packages: PackageCatalog::default(),
            signup_bonus_credits: DEFAULT_SIGNUP_BONUS_CREDITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = LedgerConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.default_currency, "usd");
        assert_eq!(config.signup_bonus_credits, 100);
        assert_eq!(config.packages.valid_amounts(), vec![100, 500, 1000]);
        assert_eq!(config.stripe_timeout_seconds, 30);
        assert!(config.stripe_api_key.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = LedgerConfig::from_vars(vars(&[
            ("LEDGER_STORE", "postgres"),
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("DEFAULT_CURRENCY", "EUR"),
            ("CREDIT_PACKAGES", "50:499,200:1899"),
            ("SIGNUP_BONUS_CREDITS", "0"),
            ("STRIPE_API_KEY", "sk_test_abc"),
        ]))
        .unwrap();

        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/ledger"));
        assert_eq!(config.default_currency, "eur");
        assert_eq!(config.packages.valid_amounts(), vec![50, 200]);
        assert_eq!(config.signup_bonus_credits, 0);
        assert_eq!(config.stripe_api_key.as_deref(), Some("sk_test_abc"));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(LedgerConfig::from_vars(vars(&[("LEDGER_STORE", "redis")])).is_err());
        assert!(LedgerConfig::from_vars(vars(&[("CREDIT_PACKAGES", "lots")])).is_err());
        assert!(LedgerConfig::from_vars(vars(&[("SIGNUP_BONUS_CREDITS", "-5")])).is_err());
        assert!(LedgerConfig::from_vars(vars(&[("STRIPE_TIMEOUT_SECONDS", "soon")])).is_err());
    }
}

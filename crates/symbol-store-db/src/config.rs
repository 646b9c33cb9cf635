use crate::error::{Result, SymbolStoreError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_STORE_DIR: &str = "./cache/symbols";
const DEFAULT_STORE_NAME: &str = "symbol-tables";
const DEFAULT_MAX_COUNT: usize = 200;

/// Symbol store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolStoreConfig {
    /// Directory holding the database files
    pub store_dir: PathBuf,
    /// Namespace for the store; selects the database file inside `store_dir`
    pub store_name: String,
    /// Maximum number of resident symbol tables
    pub max_count: usize,
    /// Entries unused for longer than this are dropped when the store opens.
    /// `None` disables the age limit, zero drops everything.
    pub max_age: Option<Duration>,
}

impl SymbolStoreConfig {
    pub fn new(store_dir: impl Into<PathBuf>, store_name: &str, max_count: usize) -> Self {
        Self {
            store_dir: store_dir.into(),
            store_name: store_name.to_string(),
            max_count,
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store_dir = env::var("SYMBOL_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.store_dir);

        let store_name = env::var("SYMBOL_STORE_NAME").unwrap_or(defaults.store_name);

        let max_count = env::var("SYMBOL_STORE_MAX_COUNT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_count);

        let max_age = env::var("SYMBOL_STORE_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        Self {
            store_dir,
            store_name,
            max_count,
            max_age,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_count == 0 {
            return Err(SymbolStoreError::Config(
                "max_count must be positive".to_string(),
            ));
        }
        if self.store_name.is_empty()
            || self.store_name == "."
            || self.store_name == ".."
            || self.store_name.contains(['/', '\\'])
        {
            return Err(SymbolStoreError::Config(format!(
                "invalid store name: {:?}",
                self.store_name
            )));
        }
        Ok(())
    }

    /// Path of the database file for this store
    pub fn database_path(&self) -> PathBuf {
        self.store_dir.join(format!("{}.sqlite", self.store_name))
    }
}

impl Default for SymbolStoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_DIR, DEFAULT_STORE_NAME, DEFAULT_MAX_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SymbolStoreConfig::default();
        assert_eq!(config.store_dir, PathBuf::from("./cache/symbols"));
        assert_eq!(config.store_name, "symbol-tables");
        assert_eq!(config.max_count, 200);
        assert_eq!(config.max_age, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path() {
        let config = SymbolStoreConfig::new("/tmp/symbols", "testing-symbol-tables", 5);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/symbols/testing-symbol-tables.sqlite")
        );
    }

    #[test]
    fn test_with_max_age() {
        let config =
            SymbolStoreConfig::new("/tmp", "s", 10).with_max_age(Duration::from_secs(3600));
        assert_eq!(config.max_age, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_validate_rejects_zero_count() {
        let err = SymbolStoreConfig::new("/tmp", "s", 0).validate().unwrap_err();
        assert!(matches!(err, SymbolStoreError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        for name in ["", ".", "..", "a/b", "a\\b"] {
            let config = SymbolStoreConfig::new("/tmp", name, 5);
            assert!(config.validate().is_err(), "{:?} should be rejected", name);
        }
    }
}

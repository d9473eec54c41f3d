//! Engine configuration
//!
//! [`LedgerConfig`] is built once at start-up, either from defaults or from a
//! JSON file, and handed by reference to every component that needs it.
//! Missing keys in a JSON file fall back to their defaults.

use crate::types::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sheet names of every store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetNames {
    pub estimates: String,
    pub orders: String,
    pub invoices: String,
    pub deposits: String,
    pub payments: String,
    pub journal_config: String,
    /// Flat set master: one row per set line, keyed by set name
    pub sets: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            estimates: "Estimates".to_string(),
            orders: "Orders".to_string(),
            invoices: "Invoices".to_string(),
            deposits: "Deposits".to_string(),
            payments: "Payments".to_string(),
            journal_config: "JournalConfig".to_string(),
            sets: "EstimateSets".to_string(),
        }
    }
}

/// Cache time-to-live per data class, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    /// Master-like data that rarely changes
    pub long_secs: u64,
    /// Project lists and analysis
    pub short_secs: u64,
    /// Order, deposit and payment lists
    pub orders_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            long_secs: 1500,
            short_secs: 120,
            orders_secs: 60,
        }
    }
}

/// Bounded retry settings for the inference collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    /// Delay before retry `n` is `base_delay_ms * n`
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
        }
    }
}

/// Rows per rendered document page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSize {
    pub first: usize,
    pub rest: usize,
}

/// Configuration for one engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub sheets: SheetNames,
    /// Bounded wait for the store-wide mutation lock
    pub store_lock_timeout_ms: u64,
    /// Bounded wait for a sequence counter lock
    pub sequence_lock_timeout_ms: u64,
    pub cache_ttl: CacheTtls,
    /// Years before the current one whose analysis keys a write invalidates
    pub analysis_years_back: i32,
    /// Years after the current one whose analysis keys a write invalidates
    pub analysis_years_ahead: i32,
    pub retry: RetrySettings,
    /// Number of recent order lines fed to price prediction
    pub price_history_limit: usize,
    /// Folder that receives generated documents
    pub document_folder: String,
    /// Folder holding received invoice scans and text files
    pub invoice_folder: String,
    pub estimate_page: PageSize,
    pub order_page: PageSize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sheets: SheetNames::default(),
            store_lock_timeout_ms: 10_000,
            sequence_lock_timeout_ms: 5_000,
            cache_ttl: CacheTtls::default(),
            analysis_years_back: 2,
            analysis_years_ahead: 1,
            retry: RetrySettings::default(),
            price_history_limit: 50,
            document_folder: "documents".to_string(),
            invoice_folder: "invoices".to_string(),
            estimate_page: PageSize { first: 20, rest: 35 },
            order_page: PageSize { first: 22, rest: 35 },
        }
    }
}

impl LedgerConfig {
    /// Load a configuration from a JSON file
    ///
    /// # Arguments
    ///
    /// * `path` - Path of a JSON document; absent keys take their defaults
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerConfig)` with the parsed configuration
    /// * `Err(LedgerError)` if the file cannot be read or is not valid JSON
    pub fn from_json_file(path: &Path) -> Result<Self, LedgerError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn store_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.store_lock_timeout_ms)
    }

    pub fn sequence_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.sequence_lock_timeout_ms)
    }
}

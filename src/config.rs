//! Engine configuration.
//!
//! Every field has a default, so `DiaryConfig::default()` is a complete
//! configuration. Override with the builder methods or load from JSON:
//!
//! ```
//! use diary_kit::config::{DiaryConfig, PersistencePolicy};
//! use std::time::Duration;
//!
//! let config = DiaryConfig::default()
//!     .with_search_debounce(Duration::from_millis(250))
//!     .with_persistence(PersistencePolicy::Immediate);
//! assert_eq!(config.search_debounce(), Duration::from_millis(250));
//!
//! let loaded = DiaryConfig::from_json(r#"{ "unnamed_customer_label": "(no name)" }"#).unwrap();
//! assert_eq!(loaded.unnamed_customer_label, "(no name)");
//! assert_eq!(loaded.search_debounce_ms, 400);
//! ```

use crate::error::{Error, Result};
use crate::model::UNNAMED_CUSTOMER;
use crate::sections::BucketOrder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quiet period before a typed location query is dispatched.
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 400;

/// Upper bound accepted for the debounce period.
pub const MAX_SEARCH_DEBOUNCE_MS: u64 = 10_000;

/// Section key for customers whose name is blank.
pub const DEFAULT_FALLBACK_SECTION: &str = "#";

/// When newly created attachments and locations reach the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Stage in the form; insert only when the form is committed.
    /// Cancelling a form leaves nothing behind.
    #[default]
    Deferred,

    /// Insert as soon as the file is picked or the place is chosen.
    /// Cancelling a form leaves unowned records for `purge_orphans`.
    Immediate,
}

/// Configuration for a [`DiaryService`](crate::service::DiaryService).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiaryConfig {
    /// Location search quiet period in milliseconds
    pub search_debounce_ms: u64,

    /// Shown instead of a blank customer name
    pub unnamed_customer_label: String,

    /// Section key for blank customer names
    pub fallback_section_key: String,

    /// When staged children are written
    pub persistence: PersistencePolicy,

    /// Ordering inside each ticket status bucket
    pub bucket_order: BucketOrder,
}

impl Default for DiaryConfig {
    fn default() -> Self {
        DiaryConfig {
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            unnamed_customer_label: UNNAMED_CUSTOMER.to_string(),
            fallback_section_key: DEFAULT_FALLBACK_SECTION.to_string(),
            persistence: PersistencePolicy::default(),
            bucket_order: BucketOrder::default(),
        }
    }
}

impl DiaryConfig {
    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for malformed JSON or invalid values
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DiaryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.search_debounce_ms == 0 || self.search_debounce_ms > MAX_SEARCH_DEBOUNCE_MS {
            return Err(Error::ConfigError(format!(
                "search_debounce_ms must be between 1 and {}, got {}",
                MAX_SEARCH_DEBOUNCE_MS, self.search_debounce_ms
            )));
        }
        if self.fallback_section_key.trim().is_empty() {
            return Err(Error::ConfigError(
                "fallback_section_key must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn with_search_debounce(mut self, debounce: Duration) -> Self {
        self.search_debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_unnamed_customer_label(mut self, label: impl Into<String>) -> Self {
        self.unnamed_customer_label = label.into();
        self
    }

    pub fn with_fallback_section_key(mut self, key: impl Into<String>) -> Self {
        self.fallback_section_key = key.into();
        self
    }

    pub fn with_persistence(mut self, policy: PersistencePolicy) -> Self {
        self.persistence = policy;
        self
    }

    pub fn with_bucket_order(mut self, order: BucketOrder) -> Self {
        self.bucket_order = order;
        self
    }
}

//! Store targets, credentials and pacing knobs.

use crate::{SyncError, SyncResult};
use secrecy::SecretString;
use std::time::Duration;

// ============================================================================
// Store targets
// ============================================================================

pub const DEFAULT_DATABASE_ID: &str = "NPIDB";
pub const DEFAULT_COLLECTION_ID: &str = "NPIDATA";
pub const DEFAULT_FLAG_COLLECTION_ID: &str = "IsInitialized";

// ============================================================================
// Import pacing
// ============================================================================

/// Documents per batch.
pub const DEFAULT_CREATE_BATCH_SIZE: usize = 500;
/// Batches allowed in flight at once.
pub const DEFAULT_MAX_PARALLEL_BATCHES: usize = 10;
/// Documents written concurrently inside a batch.
pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(200);
/// Page size used while warming the dedup cache.
pub const DEFAULT_CACHE_PAGE_SIZE: usize = 500;
/// Log progress every this many source rows.
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;
/// Documents fetched from the flag collection when looking for the marker.
pub const FLAG_LOOKUP_PAGE_SIZE: usize = 25;

// ============================================================================
// Wipe pacing
// ============================================================================

pub const DEFAULT_DELETE_PAGE_SIZE: usize = 1000;
/// Matches the store's 60 deletions/minute limit.
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 60;
/// Must stay above the 60 s limit window.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(61);

// ============================================================================
// Provisioning
// ============================================================================

pub const DEFAULT_ATTRIBUTE_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTRIBUTE_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_ATTRIBUTE_SPACING: Duration = Duration::from_millis(100);
pub const DEFAULT_PROVISION_PASSES: u32 = 5;

/// Database and collection ids the sync operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    pub database_id: String,
    pub collection_id: String,
    pub flag_collection_id: String,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            database_id: DEFAULT_DATABASE_ID.to_string(),
            collection_id: DEFAULT_COLLECTION_ID.to_string(),
            flag_collection_id: DEFAULT_FLAG_COLLECTION_ID.to_string(),
        }
    }
}

impl Targets {
    /// Environment variables:
    /// - `NPI_DATABASE_ID`
    /// - `NPI_COLLECTION_ID`
    /// - `NPI_FLAG_COLLECTION_ID`
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            database_id: std::env::var("NPI_DATABASE_ID").unwrap_or(defaults.database_id),
            collection_id: std::env::var("NPI_COLLECTION_ID").unwrap_or(defaults.collection_id),
            flag_collection_id: std::env::var("NPI_FLAG_COLLECTION_ID")
                .unwrap_or(defaults.flag_collection_id),
        }
    }
}

/// Connection settings for an Appwrite-compatible store.
#[derive(Debug, Clone)]
pub struct AppwriteConfig {
    pub endpoint: String,
    pub project_id: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl AppwriteConfig {
    /// Reads `APPWRITE_ENDPOINT`, `APPWRITE_PROJECT_ID` and `APPWRITE_API_KEY`
    /// (a `.env` file is honoured). All three are required.
    pub fn from_env() -> SyncResult<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            endpoint: required_var("APPWRITE_ENDPOINT")?,
            project_id: required_var("APPWRITE_PROJECT_ID")?,
            api_key: SecretString::from(required_var("APPWRITE_API_KEY")?),
            timeout: Duration::from_secs(60),
        })
    }
}

fn required_var(name: &str) -> SyncResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SyncError::Config(format!("{name} is not set"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterTuning {
    pub batch_size: usize,
    pub max_parallel_batches: usize,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for WriterTuning {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_CREATE_BATCH_SIZE,
            max_parallel_batches: DEFAULT_MAX_PARALLEL_BATCHES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteTuning {
    pub page_size: usize,
    pub batch_size: usize,
    pub rate_limit_delay: Duration,
}

impl Default for DeleteTuning {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_DELETE_PAGE_SIZE,
            batch_size: DEFAULT_DELETE_BATCH_SIZE,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionTuning {
    /// Attempts per attribute for transient failures.
    pub attribute_attempts: u32,
    pub retry_delay: Duration,
    /// Pause after every attribute-creation call.
    pub spacing: Duration,
    /// Verify-and-rebuild passes before giving up on drift.
    pub max_passes: u32,
}

impl Default for ProvisionTuning {
    fn default() -> Self {
        Self {
            attribute_attempts: DEFAULT_ATTRIBUTE_ATTEMPTS,
            retry_delay: DEFAULT_ATTRIBUTE_RETRY_DELAY,
            spacing: DEFAULT_ATTRIBUTE_SPACING,
            max_passes: DEFAULT_PROVISION_PASSES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub writer: WriterTuning,
    pub delete: DeleteTuning,
    pub provision: ProvisionTuning,
    pub cache_page_size: usize,
    pub progress_every: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            writer: WriterTuning::default(),
            delete: DeleteTuning::default(),
            provision: ProvisionTuning::default(),
            cache_page_size: DEFAULT_CACHE_PAGE_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl WriterTuning {
    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 || self.max_parallel_batches == 0 || self.chunk_size == 0 {
            return Err(SyncError::Config(
                "batch size, parallel batches and chunk size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

//! Bulk synchronization of the NPPES provider dataset into a document store.
//!
//! - Streaming source: local CSV files, optionally gzip/zstd compressed, any charset.
//! - Provisioning: idempotent collection/attribute creation with verify-and-repair.
//! - Import: dedup against existing documents, bounded batch pool, chunk pacing.
//! - Wipe: paginated, rate-limited deletion of every document in a collection.
//!
//! Data shape:
//! - `Record` is one projected CSV row (`get(name) -> Option<Option<&str>>`)
//! - `Fields` is the JSON object written to the store for one document
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
pub mod config;
pub mod dedup;
pub mod logging;
pub mod mapper;
pub mod provision;
pub mod release;
pub mod run;
pub mod schema;
pub mod source;
pub mod store;
pub mod wipe;
pub mod writer;

pub use crate::config::{AppwriteConfig, Targets, Tuning};
pub use crate::dedup::DedupCache;
pub use crate::mapper::FieldMapper;
pub use crate::provision::{ProvisionReport, Provisioner, PruneReport};
pub use crate::run::{IngestReport, LogRefreshHook, RefreshHook, RunOutcome, SyncRun};
pub use crate::schema::{AttributeDefinition, AttributeKind, IndexDefinition, Schema};
pub use crate::source::{build_reader, Record, RecordSource, RecordStream, SourceMeta};
pub use crate::store::{DocumentStore, Fields, StoreError, StoreResult};
pub use crate::wipe::{BulkDeleter, DeleteReport};
pub use crate::writer::{BatchWriter, PendingDocument, WriteReport};

use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by this crate when not using `anyhow`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Missing required header: {0}")]
    MissingHeader(String),
    #[error("No npidata_pfile CSV found in {}", .0.display())]
    DataFileNotFound(PathBuf),
    #[error("Attribute {attribute} not created after {attempts} attempts: {source}")]
    AttributeRetriesExhausted {
        attribute: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("Collection {collection} still missing {missing:?} after {attempts} provisioning passes")]
    SchemaDrift {
        collection: String,
        attempts: u32,
        missing: Vec<String>,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Batch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

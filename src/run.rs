//! One end-to-end import run.
//!
//! database -> flag collection -> (already initialized? hand off and stop)
//! -> provider schema -> dedup cache -> stream and write -> completion marker
//! -> hand off. Every step re-detects existing state, so a failed run is
//! recovered by simply running again.

use crate::config::{Targets, Tuning, FLAG_LOOKUP_PAGE_SIZE};
use crate::dedup::DedupCache;
use crate::mapper::FieldMapper;
use crate::provision::{ProvisionReport, Provisioner};
use crate::schema::{self, Schema, INITIALIZED_FLAG, NATURAL_KEY};
use crate::source::{RecordSource, RecordStream};
use crate::store::{unique_id, DocumentStore, Fields, StoreError};
use crate::writer::{BatchWriter, PendingDocument, WriteReport};
use crate::SyncResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Source rows read.
    pub processed: u64,
    /// Rows handed to the writer.
    pub queued: u64,
    /// Rows whose natural key was already stored or already queued.
    pub skipped: u64,
    /// Rows with an empty natural key.
    pub keyless: u64,
    /// Keys known before the first row was read.
    pub cached: usize,
    pub write: WriteReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The completion marker was already set; nothing was imported.
    AlreadyInitialized,
    Imported {
        provision: ProvisionReport,
        ingest: IngestReport,
    },
}

/// Whatever runs after the import (the periodic refresh job in production).
#[async_trait]
pub trait RefreshHook: Send + Sync {
    async fn already_initialized(&self) -> SyncResult<()>;

    async fn import_completed(&self, report: &IngestReport) -> SyncResult<()>;
}

/// Hand-off that only records the event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRefreshHook;

#[async_trait]
impl RefreshHook for LogRefreshHook {
    async fn already_initialized(&self) -> SyncResult<()> {
        info!("dataset already initialized, handing off to periodic refresh");
        Ok(())
    }

    async fn import_completed(&self, report: &IngestReport) -> SyncResult<()> {
        info!(
            written = report.write.written,
            failed = report.write.failed,
            "initial import complete, handing off to periodic refresh"
        );
        Ok(())
    }
}

pub struct SyncRun<S: ?Sized> {
    store: Arc<S>,
    targets: Targets,
    tuning: Tuning,
    mapper: FieldMapper,
    schema: Schema,
}

impl<S> SyncRun<S>
where
    S: DocumentStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, targets: Targets, tuning: Tuning) -> Self {
        Self {
            store,
            targets,
            tuning,
            mapper: FieldMapper::nppes(),
            schema: schema::provider_schema(),
        }
    }

    pub fn with_mapper(mut self, mapper: FieldMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// A source over `path` projected onto the columns the mapper reads.
    pub fn source(&self, path: impl Into<std::path::PathBuf>) -> RecordSource {
        RecordSource::new(path, NATURAL_KEY).with_columns(self.mapper.source_columns())
    }

    fn provisioner(&self) -> Provisioner<'_, S> {
        Provisioner::new(&*self.store, &self.targets.database_id, self.tuning.provision)
    }

    /// Full run against `source`.
    pub async fn execute(&self, source: &RecordSource, hook: &dyn RefreshHook) -> SyncResult<RunOutcome> {
        self.tuning.writer.validate()?;
        self.ensure_database().await?;
        self.provisioner()
            .provision(
                &self.targets.flag_collection_id,
                &self.targets.flag_collection_id,
                &schema::flag_schema(),
            )
            .await?;

        if self.is_initialized().await? {
            hook.already_initialized().await?;
            return Ok(RunOutcome::AlreadyInitialized);
        }

        let provision = self.provision().await?;
        let mut cache = self.warm_cache().await?;

        info!(path = %source.path().display(), "streaming source");
        let stream = source.open().await?;
        let ingest = self.ingest(stream, &mut cache).await?;

        self.mark_initialized().await?;
        hook.import_completed(&ingest).await?;
        Ok(RunOutcome::Imported { provision, ingest })
    }

    /// Provision the provider collection only.
    pub async fn provision(&self) -> SyncResult<ProvisionReport> {
        self.provisioner()
            .provision(
                &self.targets.collection_id,
                &self.targets.collection_id,
                &self.schema,
            )
            .await
    }

    pub async fn warm_cache(&self) -> SyncResult<DedupCache> {
        DedupCache::warm(
            &*self.store,
            &self.targets.database_id,
            &self.targets.collection_id,
            NATURAL_KEY,
            self.tuning.cache_page_size,
        )
        .await
    }

    /// Drain `stream` through the mapper and `cache` into a batch writer.
    ///
    /// A key enters the cache as soon as its row is queued, so a row is never
    /// queued twice in one run even if its write later fails.
    pub async fn ingest(&self, mut stream: RecordStream, cache: &mut DedupCache) -> SyncResult<IngestReport> {
        let mut report = IngestReport {
            cached: cache.len(),
            ..Default::default()
        };
        let mut writer = BatchWriter::new(
            Arc::clone(&self.store),
            &self.targets.database_id,
            &self.targets.collection_id,
            self.tuning.writer,
        );
        let progress_every = self.tuning.progress_every.max(1);

        while let Some(record) = stream.next_record().await? {
            report.processed += 1;

            match record.get(NATURAL_KEY).flatten() {
                None => report.keyless += 1,
                Some(key) if cache.contains(key) => report.skipped += 1,
                Some(key) => {
                    let key = key.to_string();
                    let fields = self.mapper.map(&record);
                    cache.insert(key.clone());
                    writer.submit(PendingDocument { key, fields }).await?;
                    report.queued += 1;
                }
            }

            if report.processed % progress_every == 0 {
                info!(
                    processed = report.processed,
                    queued = report.queued,
                    added = writer.report().written,
                    skipped = report.skipped,
                    "progress"
                );
            }
        }

        report.write = writer.finish().await?;
        if report.keyless > 0 {
            warn!(rows = report.keyless, "rows without a natural key were ignored");
        }
        info!(
            processed = report.processed,
            added = report.write.written,
            failed = report.write.failed,
            skipped = report.skipped,
            "processing completed"
        );
        Ok(report)
    }

    async fn ensure_database(&self) -> SyncResult<()> {
        let db = &self.targets.database_id;
        match self.store.get_database(db).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => {
                info!(database = %db, "database does not exist, creating");
                match self.store.create_database(db, db).await {
                    Ok(()) | Err(StoreError::AlreadyExists(_)) => Ok(()),
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// True when the flag collection holds a document with the flag set.
    pub async fn is_initialized(&self) -> SyncResult<bool> {
        let page = self
            .store
            .list_documents(
                &self.targets.database_id,
                &self.targets.flag_collection_id,
                None,
                FLAG_LOOKUP_PAGE_SIZE,
            )
            .await?;
        Ok(page
            .documents
            .iter()
            .any(|d| d.fields.get(INITIALIZED_FLAG) == Some(&Value::Bool(true))))
    }

    /// Write the completion marker unless one is already there.
    pub async fn mark_initialized(&self) -> SyncResult<()> {
        if self.is_initialized().await? {
            return Ok(());
        }
        let mut fields = Fields::new();
        fields.insert(INITIALIZED_FLAG.to_string(), Value::Bool(true));
        self.store
            .create_document(
                &self.targets.database_id,
                &self.targets.flag_collection_id,
                &unique_id(),
                &fields,
            )
            .await?;
        info!(collection = %self.targets.flag_collection_id, "completion marker written");
        Ok(())
    }
}

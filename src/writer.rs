//! Batched, paced document creation.
//!
//! Accepted documents are grouped into batches of `batch_size`. Each batch runs
//! as its own task that writes `chunk_size` documents concurrently, waits for
//! the whole chunk, then sleeps `chunk_delay` before the next chunk. At most
//! `max_parallel_batches` batch tasks exist at once; `submit` waits for a free
//! slot before dispatching, so the caller cannot outrun the store.

use crate::config::WriterTuning;
use crate::store::{unique_id, DocumentStore, Fields};
use crate::SyncResult;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// A mapped document waiting to be written, tagged with its natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDocument {
    pub key: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub batches: usize,
    pub largest_batch: usize,
    /// Confirmed by the store.
    pub written: u64,
    pub failed: u64,
    /// Natural keys whose write failed; not retried within this run.
    pub failed_keys: Vec<String>,
}

impl WriteReport {
    /// Write `failed_keys` to `path`, one key per line. The file is created
    /// (or truncated) even when nothing failed.
    pub async fn write_dead_letter(&self, path: &Path) -> SyncResult<()> {
        let mut body = String::with_capacity(self.failed_keys.len() * 11);
        for key in &self.failed_keys {
            body.push_str(key);
            body.push('\n');
        }
        tokio::fs::write(path, body).await?;
        info!(path = %path.display(), keys = self.failed_keys.len(), "dead-letter file written");
        Ok(())
    }
}

struct BatchOutcome {
    seq: usize,
    size: usize,
    written: u64,
    failed_keys: Vec<String>,
}

pub struct BatchWriter<S: ?Sized> {
    store: Arc<S>,
    database: Arc<str>,
    collection: Arc<str>,
    tuning: WriterTuning,
    buffer: Vec<PendingDocument>,
    in_flight: JoinSet<BatchOutcome>,
    report: WriteReport,
}

impl<S> BatchWriter<S>
where
    S: DocumentStore + ?Sized + 'static,
{
    /// Zero sizes are clamped to one.
    pub fn new(store: Arc<S>, database: &str, collection: &str, tuning: WriterTuning) -> Self {
        let tuning = WriterTuning {
            batch_size: tuning.batch_size.max(1),
            max_parallel_batches: tuning.max_parallel_batches.max(1),
            chunk_size: tuning.chunk_size.max(1),
            chunk_delay: tuning.chunk_delay,
        };
        Self {
            store,
            database: database.into(),
            collection: collection.into(),
            tuning,
            buffer: Vec::with_capacity(tuning.batch_size),
            in_flight: JoinSet::new(),
            report: WriteReport::default(),
        }
    }

    /// Queue one document. Dispatches a batch once the buffer is full,
    /// waiting first if every batch slot is busy.
    pub async fn submit(&mut self, document: PendingDocument) -> SyncResult<()> {
        self.buffer.push(document);
        if self.buffer.len() >= self.tuning.batch_size {
            self.dispatch().await?;
        }
        Ok(())
    }

    /// Outcomes of batches that have completed so far.
    pub fn report(&self) -> &WriteReport {
        &self.report
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Flush the partial batch and wait for every batch to finish.
    pub async fn finish(mut self) -> SyncResult<WriteReport> {
        if !self.buffer.is_empty() {
            self.dispatch().await?;
        }
        while !self.in_flight.is_empty() {
            self.reap_one().await?;
        }
        Ok(self.report)
    }

    async fn dispatch(&mut self) -> SyncResult<()> {
        while self.in_flight.len() >= self.tuning.max_parallel_batches {
            self.reap_one().await?;
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.tuning.batch_size));
        self.report.batches += 1;
        self.report.largest_batch = self.report.largest_batch.max(batch.len());
        let seq = self.report.batches;
        debug!(batch = seq, size = batch.len(), "dispatching batch");

        self.in_flight.spawn(write_batch(
            Arc::clone(&self.store),
            Arc::clone(&self.database),
            Arc::clone(&self.collection),
            seq,
            batch,
            self.tuning,
        ));
        Ok(())
    }

    async fn reap_one(&mut self) -> SyncResult<()> {
        if let Some(joined) = self.in_flight.join_next().await {
            let outcome = joined?;
            self.report.written += outcome.written;
            self.report.failed += outcome.failed_keys.len() as u64;
            info!(
                batch = outcome.seq,
                size = outcome.size,
                written = outcome.written,
                failed = outcome.failed_keys.len(),
                total_written = self.report.written,
                total_failed = self.report.failed,
                "batch complete"
            );
            self.report.failed_keys.extend(outcome.failed_keys);
        }
        Ok(())
    }
}

async fn write_batch<S>(
    store: Arc<S>,
    database: Arc<str>,
    collection: Arc<str>,
    seq: usize,
    batch: Vec<PendingDocument>,
    tuning: WriterTuning,
) -> BatchOutcome
where
    S: DocumentStore + ?Sized,
{
    let mut written = 0u64;
    let mut failed_keys = Vec::new();

    let mut chunks = batch.chunks(tuning.chunk_size).peekable();
    while let Some(chunk) = chunks.next() {
        let writes = chunk.iter().map(|doc| {
            let store = &store;
            let database = &database;
            let collection = &collection;
            async move {
                let id = unique_id();
                store
                    .create_document(database, collection, &id, &doc.fields)
                    .await
            }
        });
        let results = join_all(writes).await;

        for (doc, result) in chunk.iter().zip(results) {
            match result {
                Ok(()) => written += 1,
                Err(err) => {
                    warn!(batch = seq, key = %doc.key, error = %err, "document write failed");
                    failed_keys.push(doc.key.clone());
                }
            }
        }
        debug!(batch = seq, chunk = chunk.len(), "chunk written");
        if chunks.peek().is_some() {
            sleep(tuning.chunk_delay).await;
        }
    }

    BatchOutcome {
        seq,
        size: batch.len(),
        written,
        failed_keys,
    }
}

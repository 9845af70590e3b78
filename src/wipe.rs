use crate::config::DeleteTuning;
use crate::store::DocumentStore;
use crate::SyncResult;
use futures::future::join_all;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Size of every non-empty page fetched, in order.
    pub pages: Vec<usize>,
    pub deleted: u64,
    pub failed: u64,
    /// Ids whose deletion failed, in listing order. Each is attempted once.
    pub failed_ids: Vec<String>,
}

/// Deletes every document of a collection under a per-minute rate limit.
///
/// Deleted documents drop out of the listing, so each round lists from the
/// start again, except that it skips past the last document whose deletion
/// failed. That document still exists, which keeps it a valid cursor, and
/// everything listed before it is already gone or already failed. Within a
/// page, `batch_size` deletions run concurrently, and consecutive sub-batches
/// of the same page are separated by `rate_limit_delay`.
pub struct BulkDeleter<'a, S: ?Sized> {
    store: &'a S,
    tuning: DeleteTuning,
}

impl<'a, S> BulkDeleter<'a, S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: &'a S, tuning: DeleteTuning) -> Self {
        Self { store, tuning }
    }

    pub async fn delete_all(&self, database: &str, collection: &str) -> SyncResult<DeleteReport> {
        let batch_size = self.tuning.batch_size.max(1);
        let mut report = DeleteReport::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .store
                .list_documents(database, collection, cursor.as_deref(), self.tuning.page_size)
                .await?;
            if page.documents.is_empty() {
                info!(collection, "no more documents to delete");
                break;
            }
            info!(collection, found = page.documents.len(), "deleting page");
            report.pages.push(page.documents.len());

            let mut sub_batches = page.documents.chunks(batch_size).peekable();
            while let Some(batch) = sub_batches.next() {
                let deletions = batch.iter().map(|doc| async move {
                    let result = self
                        .store
                        .delete_document(database, collection, &doc.id)
                        .await;
                    if let Err(err) = &result {
                        error!(collection, document = %doc.id, error = %err, "delete failed");
                    }
                    result.is_ok()
                });
                let results = join_all(deletions).await;
                let mut ok = 0usize;
                for (doc, deleted) in batch.iter().zip(results) {
                    if deleted {
                        ok += 1;
                    } else {
                        report.failed_ids.push(doc.id.clone());
                        cursor = Some(doc.id.clone());
                    }
                }

                report.deleted += ok as u64;
                report.failed += (batch.len() - ok) as u64;
                info!(
                    collection,
                    deleted = ok,
                    batch = batch.len(),
                    total_deleted = report.deleted,
                    "sub-batch done"
                );

                if sub_batches.peek().is_some() {
                    info!(
                        wait_secs = self.tuning.rate_limit_delay.as_secs(),
                        "waiting for rate limit window"
                    );
                    sleep(self.tuning.rate_limit_delay).await;
                }
            }
        }

        if report.failed > 0 {
            warn!(collection, failed = report.failed, "some documents were not deleted");
        }

        info!(
            collection,
            deleted = report.deleted,
            failed = report.failed,
            "deletion complete"
        );
        Ok(report)
    }
}

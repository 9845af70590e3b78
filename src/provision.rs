use crate::config::ProvisionTuning;
use crate::schema::{AttributeDefinition, Schema};
use crate::store::{DocumentStore, StoreError};
use crate::{SyncError, SyncResult};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// What happened to each declared attribute, cumulative over every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub passes: u32,
    pub rebuilds: u32,
    pub created: Vec<String>,
    /// Listed by the store already, or creation answered "already exists".
    pub existing: Vec<String>,
    /// Non-retryable creation failures; the verify step decides what follows.
    pub rejected: Vec<String>,
}

/// Outcome of [`Provisioner::prune_attributes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
}

enum AttributeOutcome {
    Created,
    Existing,
    Rejected,
}

/// Makes a collection match a declared [`Schema`].
///
/// Each pass ensures the collection, creates whatever attributes the store
/// does not list, then re-reads the live attribute list. A pass that still
/// finds gaps drops the collection and starts over, up to
/// `ProvisionTuning::max_passes`.
pub struct Provisioner<'a, S: ?Sized> {
    store: &'a S,
    database: &'a str,
    tuning: ProvisionTuning,
}

impl<'a, S> Provisioner<'a, S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: &'a S, database: &'a str, tuning: ProvisionTuning) -> Self {
        Self {
            store,
            database,
            tuning,
        }
    }

    pub async fn provision(
        &self,
        collection: &str,
        display_name: &str,
        schema: &Schema,
    ) -> SyncResult<ProvisionReport> {
        let mut report = ProvisionReport::default();

        loop {
            report.passes += 1;
            let live = self.ensure_collection(collection, display_name).await?;

            for attribute in &schema.attributes {
                if live.iter().any(|l| *l == attribute.name) {
                    report.existing.push(attribute.name.clone());
                    continue;
                }
                match self.create_attribute(collection, attribute).await? {
                    AttributeOutcome::Created => report.created.push(attribute.name.clone()),
                    AttributeOutcome::Existing => report.existing.push(attribute.name.clone()),
                    AttributeOutcome::Rejected => report.rejected.push(attribute.name.clone()),
                }
            }

            let missing = self.missing_attributes(collection, schema).await?;
            if missing.is_empty() {
                self.ensure_indexes(collection, schema).await;
                info!(
                    collection,
                    passes = report.passes,
                    created = report.created.len(),
                    "schema verified"
                );
                return Ok(report);
            }

            if report.passes >= self.tuning.max_passes {
                return Err(SyncError::SchemaDrift {
                    collection: collection.to_string(),
                    attempts: report.passes,
                    missing,
                });
            }

            warn!(collection, ?missing, "attributes missing after provisioning, rebuilding collection");
            self.store.delete_collection(self.database, collection).await?;
            report.rebuilds += 1;
        }
    }

    /// Declared attributes the live collection does not report.
    pub async fn missing_attributes(
        &self,
        collection: &str,
        schema: &Schema,
    ) -> SyncResult<Vec<String>> {
        let info = self.store.get_collection(self.database, collection).await?;
        Ok(schema
            .missing_from(&info.attributes)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Delete the named attributes one by one. A failure is logged and
    /// recorded; the remaining names are still attempted.
    pub async fn prune_attributes<I, N>(&self, collection: &str, names: I) -> PruneReport
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let mut report = PruneReport::default();
        for name in names {
            let name = name.as_ref();
            match self
                .store
                .delete_attribute(self.database, collection, name)
                .await
            {
                Ok(()) => {
                    info!(collection, attribute = name, "attribute deleted");
                    report.removed.push(name.to_string());
                }
                Err(err) => {
                    error!(collection, attribute = name, error = %err, "attribute not deleted");
                    report.failed.push((name.to_string(), err));
                }
            }
            sleep(self.tuning.spacing).await;
        }
        report
    }

    /// Returns the attribute keys the collection already has.
    async fn ensure_collection(&self, collection: &str, display_name: &str) -> SyncResult<Vec<String>> {
        match self.store.get_collection(self.database, collection).await {
            Ok(info) => {
                debug!(collection, attributes = info.attributes.len(), "collection exists");
                Ok(info.attributes)
            }
            Err(StoreError::NotFound(_)) => {
                info!(collection, "collection does not exist, creating");
                match self
                    .store
                    .create_collection(self.database, collection, display_name)
                    .await
                {
                    Ok(()) | Err(StoreError::AlreadyExists(_)) => Ok(Vec::new()),
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create_attribute(
        &self,
        collection: &str,
        attribute: &AttributeDefinition,
    ) -> SyncResult<AttributeOutcome> {
        let name = attribute.name.as_str();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = self
                .store
                .create_attribute(self.database, collection, attribute)
                .await;
            sleep(self.tuning.spacing).await;

            match result {
                Ok(()) => {
                    debug!(collection, attribute = name, "attribute created");
                    return Ok(AttributeOutcome::Created);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(collection, attribute = name, "attribute already exists");
                    return Ok(AttributeOutcome::Existing);
                }
                // NotFound here means the new collection is not visible yet
                Err(err @ (StoreError::Transient(_) | StoreError::NotFound(_))) => {
                    if attempt >= self.tuning.attribute_attempts {
                        return Err(SyncError::AttributeRetriesExhausted {
                            attribute: name.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    warn!(collection, attribute = name, attempt, error = %err, "retrying attribute");
                    sleep(self.tuning.retry_delay).await;
                }
                Err(err) => {
                    error!(collection, attribute = name, error = %err, "attribute rejected");
                    return Ok(AttributeOutcome::Rejected);
                }
            }
        }
    }

    async fn ensure_indexes(&self, collection: &str, schema: &Schema) {
        for index in &schema.indexes {
            match self
                .store
                .create_index(self.database, collection, index)
                .await
            {
                Ok(()) => info!(collection, index = %index.key, "index created"),
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(collection, index = %index.key, "index already exists")
                }
                Err(err) => warn!(collection, index = %index.key, error = %err, "index not created"),
            }
        }
    }
}

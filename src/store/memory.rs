//! In-process `DocumentStore` for dry runs and tests.
//!
//! Besides plain storage it can replay scripted failures, add artificial
//! latency to document writes/deletes, and records enough about its calls to
//! check batching and pacing from the outside.

use super::{
    CollectionInfo, DocumentPage, DocumentStore, Fields, StoreError, StoreResult, StoredDocument,
};
use crate::schema::{AttributeDefinition, IndexDefinition};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Call counters and observations.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub attribute_creates: usize,
    pub collection_creates: usize,
    pub collection_deletes: usize,
    pub document_creates: usize,
    pub document_deletes: usize,
    /// Number of documents returned by each `list_documents` call.
    pub list_sizes: Vec<usize>,
    pub max_concurrent_creates: usize,
    pub max_concurrent_deletes: usize,
    /// Start time of every delete call.
    pub delete_starts: Vec<Instant>,
}

#[derive(Debug, Default)]
struct Collection {
    name: String,
    attributes: Vec<String>,
    indexes: Vec<String>,
    documents: BTreeMap<String, Fields>,
}

#[derive(Debug, Default)]
struct State {
    databases: HashSet<String>,
    collections: HashMap<(String, String), Collection>,
    attribute_faults: HashMap<String, VecDeque<StoreError>>,
    index_faults: HashMap<String, VecDeque<StoreError>>,
    unsettled_attributes: HashSet<String>,
    failing_writes: HashSet<(String, String)>,
    failing_deletes: HashSet<String>,
    creates_in_flight: usize,
    deletes_in_flight: usize,
    stats: StoreStats,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document create/delete sleeps this long before completing.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue failures returned by successive `create_attribute` calls for
    /// `name`. A scripted `AlreadyExists` also registers the attribute, as a
    /// store that created it in an earlier unacknowledged call would have.
    pub fn fail_attribute(&self, name: &str, errors: impl IntoIterator<Item = StoreError>) {
        self.lock()
            .attribute_faults
            .entry(name.to_string())
            .or_default()
            .extend(errors);
    }

    /// The next creation of `name` succeeds but the attribute never shows up,
    /// like an attribute whose asynchronous build fails server-side.
    pub fn drop_attribute_once(&self, name: &str) {
        self.lock().unsettled_attributes.insert(name.to_string());
    }

    /// Queue failures returned by successive `create_index` calls for `key`.
    pub fn fail_index(&self, key: &str, errors: impl IntoIterator<Item = StoreError>) {
        self.lock()
            .index_faults
            .entry(key.to_string())
            .or_default()
            .extend(errors);
    }

    /// Document creates whose `field` equals `value` fail with `Fatal`.
    pub fn fail_writes_where(&self, field: &str, value: &str) {
        self.lock()
            .failing_writes
            .insert((field.to_string(), value.to_string()));
    }

    pub fn fail_delete(&self, document_id: &str) {
        self.lock().failing_deletes.insert(document_id.to_string());
    }

    /// Create a database/collection with the given attributes, bypassing faults.
    pub fn seed_collection(&self, database: &str, collection: &str, attributes: &[&str]) {
        let mut state = self.lock();
        state.databases.insert(database.to_string());
        let coll = state
            .collections
            .entry((database.to_string(), collection.to_string()))
            .or_default();
        coll.name = collection.to_string();
        for a in attributes {
            if !coll.attributes.iter().any(|x| x == a) {
                coll.attributes.push(a.to_string());
            }
        }
    }

    /// Insert a document directly, bypassing faults and counters.
    pub fn seed_document(&self, database: &str, collection: &str, id: &str, fields: Fields) {
        let mut state = self.lock();
        state
            .collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .documents
            .insert(id.to_string(), fields);
    }

    pub fn documents(&self, database: &str, collection: &str) -> Vec<StoredDocument> {
        let state = self.lock();
        state
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .map(|c| {
                c.documents
                    .iter()
                    .map(|(id, fields)| StoredDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn attributes(&self, database: &str, collection: &str) -> Option<Vec<String>> {
        let state = self.lock();
        state
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .map(|c| c.attributes.clone())
    }

    pub fn indexes(&self, database: &str, collection: &str) -> Option<Vec<String>> {
        let state = self.lock();
        state
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .map(|c| c.indexes.clone())
    }

    pub fn stats(&self) -> StoreStats {
        self.lock().stats.clone()
    }
}

fn key(database: &str, collection: &str) -> (String, String) {
    (database.to_string(), collection.to_string())
}

fn missing_collection(database: &str, collection: &str) -> StoreError {
    StoreError::NotFound(format!("collection {database}/{collection}"))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_database(&self, database: &str) -> StoreResult<()> {
        if self.lock().databases.contains(database) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("database {database}")))
        }
    }

    async fn create_database(&self, database: &str, _name: &str) -> StoreResult<()> {
        if self.lock().databases.insert(database.to_string()) {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists(format!("database {database}")))
        }
    }

    async fn get_collection(&self, database: &str, collection: &str) -> StoreResult<CollectionInfo> {
        let state = self.lock();
        let coll = state
            .collections
            .get(&key(database, collection))
            .ok_or_else(|| missing_collection(database, collection))?;
        Ok(CollectionInfo {
            id: collection.to_string(),
            name: coll.name.clone(),
            attributes: coll.attributes.clone(),
        })
    }

    async fn create_collection(&self, database: &str, collection: &str, name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        if !state.databases.contains(database) {
            return Err(StoreError::NotFound(format!("database {database}")));
        }
        state.stats.collection_creates += 1;
        let k = key(database, collection);
        if state.collections.contains_key(&k) {
            return Err(StoreError::AlreadyExists(format!("collection {collection}")));
        }
        state.collections.insert(
            k,
            Collection {
                name: name.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.stats.collection_deletes += 1;
        state
            .collections
            .remove(&key(database, collection))
            .map(|_| ())
            .ok_or_else(|| missing_collection(database, collection))
    }

    async fn create_attribute(
        &self,
        database: &str,
        collection: &str,
        attribute: &AttributeDefinition,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        state.stats.attribute_creates += 1;
        let name = attribute.name.clone();

        let scripted = state
            .attribute_faults
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        let unsettled = state.unsettled_attributes.remove(&name);

        let coll = state
            .collections
            .get_mut(&key(database, collection))
            .ok_or_else(|| missing_collection(database, collection))?;

        if let Some(err) = scripted {
            if matches!(err, StoreError::AlreadyExists(_)) && !coll.attributes.contains(&name) {
                coll.attributes.push(name);
            }
            return Err(err);
        }
        if coll.attributes.contains(&name) {
            return Err(StoreError::AlreadyExists(format!("attribute {name}")));
        }
        if !unsettled {
            coll.attributes.push(name);
        }
        Ok(())
    }

    async fn delete_attribute(&self, database: &str, collection: &str, key_name: &str) -> StoreResult<()> {
        let mut state = self.lock();
        let coll = state
            .collections
            .get_mut(&key(database, collection))
            .ok_or_else(|| missing_collection(database, collection))?;
        let before = coll.attributes.len();
        coll.attributes.retain(|a| a != key_name);
        if coll.attributes.len() == before {
            return Err(StoreError::NotFound(format!("attribute {key_name}")));
        }
        for doc in coll.documents.values_mut() {
            doc.remove(key_name);
        }
        Ok(())
    }

    async fn create_index(&self, database: &str, collection: &str, index: &IndexDefinition) -> StoreResult<()> {
        let mut state = self.lock();
        if let Some(err) = state
            .index_faults
            .get_mut(&index.key)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        let coll = state
            .collections
            .get_mut(&key(database, collection))
            .ok_or_else(|| missing_collection(database, collection))?;
        if coll.indexes.contains(&index.key) {
            return Err(StoreError::AlreadyExists(format!("index {}", index.key)));
        }
        coll.indexes.push(index.key.clone());
        Ok(())
    }

    async fn list_documents(
        &self,
        database: &str,
        collection: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<DocumentPage> {
        let mut state = self.lock();
        let coll = state
            .collections
            .get(&key(database, collection))
            .ok_or_else(|| missing_collection(database, collection))?;

        let lower = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Unbounded,
        };
        let documents: Vec<StoredDocument> = coll
            .documents
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, fields)| StoredDocument {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        state.stats.list_sizes.push(documents.len());
        let next_cursor = documents.last().map(|d| d.id.clone());
        Ok(DocumentPage {
            documents,
            next_cursor,
        })
    }

    async fn create_document(
        &self,
        database: &str,
        collection: &str,
        document_id: &str,
        fields: &Fields,
    ) -> StoreResult<()> {
        {
            let mut state = self.lock();
            state.stats.document_creates += 1;
            state.creates_in_flight += 1;
            state.stats.max_concurrent_creates =
                state.stats.max_concurrent_creates.max(state.creates_in_flight);
        }
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let mut state = self.lock();
        state.creates_in_flight -= 1;

        let rejected = state.failing_writes.iter().any(|(field, value)| {
            fields.get(field).and_then(|v| v.as_str()) == Some(value.as_str())
        });
        if rejected {
            return Err(StoreError::Fatal(format!("document {document_id} rejected")));
        }

        let coll = state
            .collections
            .get_mut(&key(database, collection))
            .ok_or_else(|| missing_collection(database, collection))?;
        if coll.documents.contains_key(document_id) {
            return Err(StoreError::AlreadyExists(format!("document {document_id}")));
        }
        coll.documents.insert(document_id.to_string(), fields.clone());
        Ok(())
    }

    async fn delete_document(&self, database: &str, collection: &str, document_id: &str) -> StoreResult<()> {
        {
            let mut state = self.lock();
            state.stats.document_deletes += 1;
            state.stats.delete_starts.push(Instant::now());
            state.deletes_in_flight += 1;
            state.stats.max_concurrent_deletes =
                state.stats.max_concurrent_deletes.max(state.deletes_in_flight);
        }
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let mut state = self.lock();
        state.deletes_in_flight -= 1;
        if state.failing_deletes.contains(document_id) {
            return Err(StoreError::Fatal(format!("document {document_id} is locked")));
        }
        let coll = state
            .collections
            .get_mut(&key(database, collection))
            .ok_or_else(|| missing_collection(database, collection))?;
        coll.documents
            .remove(document_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))
    }
}

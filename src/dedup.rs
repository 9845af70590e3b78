use crate::store::DocumentStore;
use crate::SyncResult;
use std::collections::HashSet;
use tracing::{debug, info};

/// Natural keys already present in the target collection or accepted during
/// this run. One instance per run; every key must fit in memory.
#[derive(Debug, Default)]
pub struct DedupCache {
    keys: HashSet<String>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page through every stored document and collect its `key_field`.
    ///
    /// The cursor is the id of the last document of the previous page; the
    /// walk ends on the first empty page.
    pub async fn warm<S>(
        store: &S,
        database: &str,
        collection: &str,
        key_field: &str,
        page_size: usize,
    ) -> SyncResult<Self>
    where
        S: DocumentStore + ?Sized,
    {
        let mut cache = Self::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = store
                .list_documents(database, collection, cursor.as_deref(), page_size)
                .await?;
            if page.documents.is_empty() {
                break;
            }
            cursor = page.next_cursor;
            pages += 1;

            for doc in &page.documents {
                if let Some(key) = doc.fields.get(key_field).and_then(|v| v.as_str()) {
                    cache.keys.insert(key.to_string());
                }
            }
            debug!(pages, cached = cache.keys.len(), "cached existing keys");
        }

        info!(cached = cache.keys.len(), pages, collection, "dedup cache warmed");
        Ok(cache)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already known.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Fields, MemoryStore};
    use serde_json::json;

    #[tokio::test]
    async fn warm_walks_every_page() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.seed_collection("db", "c", &["NPI"]);
        for i in 0..5 {
            let mut fields = Fields::new();
            fields.insert("NPI".into(), json!(format!("{i}")));
            store.seed_document("db", "c", &format!("d{i}"), fields);
        }
        // keyless documents are ignored
        store.seed_document("db", "c", "d9", Fields::new());

        let cache = DedupCache::warm(&store, "db", "c", "NPI", 2).await?;
        assert_eq!(cache.len(), 5);
        assert!(cache.contains("4"));
        assert_eq!(store.stats().list_sizes, [2, 2, 2, 0]);
        Ok(())
    }

    #[test]
    fn insert_reports_new_keys() {
        let mut cache = DedupCache::new();
        assert!(cache.insert("1"));
        assert!(!cache.insert("1"));
        assert!(!cache.is_empty());
    }
}

//! `DocumentStore` over the Appwrite Databases REST API.
//!
//! Status codes are classified once, here:
//! 409 -> `AlreadyExists`, 404 -> `NotFound`, 408/429/5xx and transport
//! failures -> `Transient`, anything else -> `Fatal`.

use super::{
    CollectionInfo, DocumentPage, DocumentStore, Fields, StoreError, StoreResult, StoredDocument,
};
use crate::config::AppwriteConfig;
use crate::schema::{AttributeDefinition, AttributeKind, IndexDefinition};
use crate::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

const CLIENT_USER_AGENT: &str = concat!("nppes-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct WireAttribute {
    key: String,
}

#[derive(Debug, Deserialize)]
struct WireCollection {
    #[serde(rename = "$id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    attributes: Vec<WireAttribute>,
}

#[derive(Debug, Deserialize)]
struct WireDocumentList {
    documents: Vec<Fields>,
}

pub struct AppwriteStore {
    http: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for AppwriteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppwriteStore")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl AppwriteStore {
    pub fn new(config: &AppwriteConfig) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-appwrite-project",
            HeaderValue::from_str(&config.project_id)
                .map_err(|_| SyncError::Config("APPWRITE_PROJECT_ID is not a valid header".into()))?,
        );
        let mut key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|_| SyncError::Config("APPWRITE_API_KEY is not a valid header".into()))?;
        key.set_sensitive(true);
        headers.insert("x-appwrite-key", key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn collection_path(database: &str, collection: &str) -> String {
        format!("/databases/{database}/collections/{collection}")
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> StoreResult<Response> {
        trace!(%method, path, "store request");
        let mut request = self
            .http
            .request(method, format!("{}{}", self.endpoint, path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<WireError>(&body) {
            Ok(e) if !e.message.is_empty() => format!("{} ({})", e.message, e.kind),
            _ => format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            ),
        };
        Err(classify(status, detail))
    }

    async fn send_empty(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> StoreResult<()> {
        self.send(method, path, &[], body).await.map(|_| ())
    }
}

fn classify(status: StatusCode, detail: String) -> StoreError {
    match status {
        StatusCode::CONFLICT => StoreError::AlreadyExists(detail),
        StatusCode::NOT_FOUND => StoreError::NotFound(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => StoreError::Transient(detail),
        s if s.is_server_error() => StoreError::Transient(detail),
        _ => StoreError::Fatal(detail),
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        StoreError::Transient(err.to_string())
    } else {
        StoreError::Fatal(err.to_string())
    }
}

fn decode_error(err: reqwest::Error) -> StoreError {
    StoreError::Fatal(format!("unexpected response body: {err}"))
}

#[async_trait]
impl DocumentStore for AppwriteStore {
    async fn get_database(&self, database: &str) -> StoreResult<()> {
        self.send_empty(Method::GET, &format!("/databases/{database}"), None)
            .await
    }

    async fn create_database(&self, database: &str, name: &str) -> StoreResult<()> {
        let body = json!({ "databaseId": database, "name": name });
        self.send_empty(Method::POST, "/databases", Some(body)).await
    }

    async fn get_collection(&self, database: &str, collection: &str) -> StoreResult<CollectionInfo> {
        let wire: WireCollection = self
            .send(Method::GET, &Self::collection_path(database, collection), &[], None)
            .await?
            .json()
            .await
            .map_err(decode_error)?;
        Ok(CollectionInfo {
            id: wire.id,
            name: wire.name,
            attributes: wire.attributes.into_iter().map(|a| a.key).collect(),
        })
    }

    async fn create_collection(&self, database: &str, collection: &str, name: &str) -> StoreResult<()> {
        let body = json!({ "collectionId": collection, "name": name });
        self.send_empty(
            Method::POST,
            &format!("/databases/{database}/collections"),
            Some(body),
        )
        .await
    }

    async fn delete_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        self.send_empty(Method::DELETE, &Self::collection_path(database, collection), None)
            .await
    }

    async fn create_attribute(
        &self,
        database: &str,
        collection: &str,
        attribute: &AttributeDefinition,
    ) -> StoreResult<()> {
        let base = Self::collection_path(database, collection);
        let (path, body) = match attribute.kind {
            AttributeKind::Text { max_len } => (
                format!("{base}/attributes/string"),
                json!({ "key": attribute.name, "size": max_len, "required": attribute.required }),
            ),
            AttributeKind::Boolean => (
                format!("{base}/attributes/boolean"),
                json!({ "key": attribute.name, "required": attribute.required }),
            ),
        };
        self.send_empty(Method::POST, &path, Some(body)).await
    }

    async fn delete_attribute(&self, database: &str, collection: &str, key: &str) -> StoreResult<()> {
        let path = format!("{}/attributes/{key}", Self::collection_path(database, collection));
        self.send_empty(Method::DELETE, &path, None).await
    }

    async fn create_index(&self, database: &str, collection: &str, index: &IndexDefinition) -> StoreResult<()> {
        let order = if index.descending { "DESC" } else { "ASC" };
        let body = json!({
            "key": index.key,
            "type": "key",
            "attributes": index.attributes,
            "orders": vec![order; index.attributes.len()],
        });
        let path = format!("{}/indexes", Self::collection_path(database, collection));
        self.send_empty(Method::POST, &path, Some(body)).await
    }

    async fn list_documents(
        &self,
        database: &str,
        collection: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<DocumentPage> {
        let mut query = vec![(
            "queries[]",
            json!({ "method": "limit", "values": [limit] }).to_string(),
        )];
        if let Some(cursor) = cursor {
            query.push((
                "queries[]",
                json!({ "method": "cursorAfter", "values": [cursor] }).to_string(),
            ));
        }

        let path = format!("{}/documents", Self::collection_path(database, collection));
        let wire: WireDocumentList = self
            .send(Method::GET, &path, &query, None)
            .await?
            .json()
            .await
            .map_err(decode_error)?;

        let documents: Vec<StoredDocument> = wire
            .documents
            .into_iter()
            .filter_map(|mut raw| {
                let id = raw.remove("$id")?.as_str()?.to_string();
                raw.retain(|k, _| !k.starts_with('$'));
                Some(StoredDocument { id, fields: raw })
            })
            .collect();
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
        let body = json!({ "documentId": document_id, "data": fields });
        let path = format!("{}/documents", Self::collection_path(database, collection));
        self.send_empty(Method::POST, &path, Some(body)).await
    }

    async fn delete_document(&self, database: &str, collection: &str, document_id: &str) -> StoreResult<()> {
        let path = format!(
            "{}/documents/{document_id}",
            Self::collection_path(database, collection)
        );
        self.send_empty(Method::DELETE, &path, None).await
    }
}

//! FirestoreStore - `DocumentStore` over the Firestore REST API.
//!
//! Documents live at `{endpoint}/projects/{p}/databases/{d}/documents/{collection}/{id}`.
//! Plain JSON is mapped onto Firestore's typed values and back; integers
//! travel as strings on the wire.
//!
//! `transaction` runs beginTransaction, a transactional read, the update,
//! then commit. A commit aborted by contention is retried from the start.

use async_trait::async_trait;
use mutation_core::domain::MutationError;
use mutation_core::ports::{DocPath, DocumentStore, StoreError, TxUpdate};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_DATABASE: &str = "(default)";

const MAX_TX_ATTEMPTS: u32 = 5;
const PAGE_SIZE: u32 = 300;

pub struct FirestoreStore {
    client: reqwest::Client,
    /// `{endpoint}/projects/{p}/databases/{d}/documents`
    documents_url: String,
    /// `projects/{p}/databases/{d}/documents`, the prefix of document names.
    documents_name: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BeginTransaction {
    transaction: String,
}

enum CommitError {
    Contention,
    Store(StoreError),
}

fn unavailable(error: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

/// Plain JSON to a Firestore value.
fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

fn encode_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Firestore value to plain JSON. Unknown value kinds decode to null.
fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|m| m.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "booleanValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or(Value::Null),
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

/// Top-level field map of a document body; non-objects are rejected.
fn document_fields(path: &DocPath, value: &Value) -> Result<Map<String, Value>, StoreError> {
    match value {
        Value::Object(map) => Ok(encode_fields(map)),
        _ => Err(StoreError::Malformed {
            path: path.to_string(),
            message: "documents must be JSON objects".into(),
        }),
    }
}

/// `updateMask.fieldPaths` for a shallow merge. Field names are backquoted.
fn field_path(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

impl FirestoreStore {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        project_id: &str,
        database: &str,
        access_token: Option<String>,
    ) -> Self {
        let documents_name = format!("projects/{project_id}/databases/{database}/documents");
        Self {
            client,
            documents_url: format!("{}/{documents_name}", endpoint.trim_end_matches('/')),
            documents_name,
            access_token,
        }
    }

    fn document_url(&self, path: &DocPath) -> String {
        format!("{}/{}/{}", self.documents_url, path.collection, path.id)
    }

    fn document_name(&self, path: &DocPath) -> String {
        format!("{}/{}/{}", self.documents_name, path.collection, path.id)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = self.authed(request).send().await.map_err(unavailable)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Unavailable(format!("firestore responded {status}: {body}")))
    }

    async fn read(
        &self,
        path: &DocPath,
        transaction: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        let mut request = self.client.get(self.document_url(path));
        if let Some(transaction) = transaction {
            request = request.query(&[("transaction", transaction)]);
        }
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Document = response.json().await.map_err(unavailable)?;
        Ok(Some(Value::Object(decode_fields(&doc.fields))))
    }

    async fn begin_transaction(&self) -> Result<String, StoreError> {
        let url = format!("{}:beginTransaction", self.documents_url);
        let response = self.send(self.client.post(url).json(&json!({}))).await?;
        let begun: BeginTransaction = response.json().await.map_err(unavailable)?;
        Ok(begun.transaction)
    }

    async fn rollback(&self, transaction: &str) {
        let url = format!("{}:rollback", self.documents_url);
        let request = self.client.post(url).json(&json!({ "transaction": transaction }));
        if let Err(error) = self.send(request).await {
            debug!(error = %error, "transaction rollback failed");
        }
    }

    async fn commit(
        &self,
        transaction: &str,
        path: &DocPath,
        value: &Value,
    ) -> Result<(), CommitError> {
        let fields = document_fields(path, value).map_err(CommitError::Store)?;
        let body = json!({
            "transaction": transaction,
            "writes": [{
                "update": { "name": self.document_name(path), "fields": fields },
            }],
        });
        let url = format!("{}:commit", self.documents_url);
        let response = self
            .authed(self.client.post(url).json(&body))
            .send()
            .await
            .map_err(|e| CommitError::Store(unavailable(e)))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CommitError::Contention),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(CommitError::Store(StoreError::Unavailable(format!(
                    "firestore commit responded {s}: {body}"
                ))))
            }
        }
    }

    fn document_id<'a>(&self, collection: &str, name: &'a str) -> Option<&'a str> {
        name.strip_prefix(&self.documents_name)?
            .strip_prefix('/')?
            .strip_prefix(collection)?
            .strip_prefix('/')
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        self.read(path, None).await
    }

    async fn set(&self, path: &DocPath, value: Value) -> Result<(), StoreError> {
        let fields = document_fields(path, &value)?;
        let request = self
            .client
            .patch(self.document_url(path))
            .json(&json!({ "fields": fields }));
        self.send(request).await?;
        Ok(())
    }

    async fn merge(&self, path: &DocPath, fields: Value) -> Result<(), StoreError> {
        let encoded = document_fields(path, &fields)?;
        let mask: Vec<(&str, String)> = encoded
            .keys()
            .map(|key| ("updateMask.fieldPaths", field_path(key)))
            .collect();
        let request = self
            .client
            .patch(self.document_url(path))
            .query(&mask)
            .json(&json!({ "fields": encoded }));
        self.send(request).await?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let url = format!("{}/{collection}", self.documents_url);
        let mut docs = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = self.send(request).await?;
            if response.status() == StatusCode::NOT_FOUND {
                break;
            }
            let page: ListPage = response.json().await.map_err(unavailable)?;
            for doc in page.documents {
                match self.document_id(collection, &doc.name) {
                    Some(id) => {
                        docs.push((id.to_string(), Value::Object(decode_fields(&doc.fields))))
                    }
                    None => warn!(name = %doc.name, "ignoring document outside the collection"),
                }
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(docs)
    }

    async fn transaction(
        &self,
        path: &DocPath,
        update: TxUpdate<'_>,
    ) -> Result<Option<Value>, MutationError> {
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let transaction = self.begin_transaction().await?;
            let current = match self.read(path, Some(&transaction)).await {
                Ok(current) => current,
                Err(error) => {
                    self.rollback(&transaction).await;
                    return Err(error.into());
                }
            };
            let next = match update(current.as_ref()) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    self.rollback(&transaction).await;
                    return Ok(current);
                }
                Err(error) => {
                    self.rollback(&transaction).await;
                    return Err(error);
                }
            };
            match self.commit(&transaction, path, &next).await {
                Ok(()) => return Ok(Some(next)),
                Err(CommitError::Contention) => {
                    debug!(path = %path, attempt, "transaction aborted by contention, retrying");
                }
                Err(CommitError::Store(error)) => return Err(error.into()),
            }
        }
        Err(StoreError::Unavailable(format!(
            "transaction on {path} still contended after {MAX_TX_ATTEMPTS} attempts"
        ))
        .into())
    }
}

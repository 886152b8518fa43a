//! Cosmos DB REST client
//!
//! Speaks the SQL API over HTTP(S). Every request is signed with the account
//! master key; point operations on documents of a partitioned collection carry
//! the partition key header.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use super::signature::{authorization_token, rfc1123_date};
use super::store::{DocumentStore, FeedPage};
use crate::core::config::StoreConfig;
use crate::core::links::{CollectionLink, DatabaseLink, DocumentLink};
use crate::core::models::{PARTITION_KEY_PATH, StoreReceipt};
use crate::errors::StoreError;
use crate::query::filter::Filter;

pub const API_VERSION: &str = "2018-12-31";

const HEADER_ACTIVITY_ID: &str = "x-ms-activity-id";
const HEADER_CONTINUATION: &str = "x-ms-continuation";
const HEADER_REQUEST_CHARGE: &str = "x-ms-request-charge";
const HEADER_SUB_STATUS: &str = "x-ms-substatus";
const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";

#[derive(Debug, Clone, Copy)]
enum ResourceType {
    Database,
    Collection,
    Document,
}

impl ResourceType {
    fn as_str(self) -> &'static str {
        match self {
            ResourceType::Database => "dbs",
            ResourceType::Collection => "colls",
            ResourceType::Document => "docs",
        }
    }
}

struct StoreRequest {
    method: Method,
    resource_type: ResourceType,
    /// Unencoded link the signature covers.
    resource_link: String,
    path: String,
    headers: Vec<(&'static str, String)>,
    body: Option<Value>,
    content_type: &'static str,
}

impl StoreRequest {
    fn new(method: Method, resource_type: ResourceType, resource_link: String, path: String) -> Self {
        Self {
            method,
            resource_type,
            resource_link,
            path,
            headers: Vec::new(),
            body: None,
            content_type: "application/json",
        }
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn partition_key(self, key: Option<&str>) -> Self {
        match key {
            Some(key) => self.header(HEADER_PARTITION_KEY, partition_key_header(key)),
            None => self,
        }
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "Documents", default)]
    documents: Vec<Value>,
}

/// HTTP client for one store account, shared by every operation of a repository.
pub struct CosmosClient {
    http: Client,
    endpoint: Url,
    key: Vec<u8>,
}

impl CosmosClient {
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an invalid endpoint or key, or
    /// `HttpError` if the HTTP client cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut endpoint = config.endpoint_url()?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            http,
            endpoint,
            key: config.decoded_key()?,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, request: StoreRequest) -> Result<Response, StoreError> {
        let url = self.endpoint.join(&request.path).map_err(|e| {
            StoreError::ConfigurationError(format!("bad resource path '{}': {e}", request.path))
        })?;

        let date = rfc1123_date(Utc::now());
        let token = authorization_token(
            &self.key,
            request.method.as_str(),
            request.resource_type.as_str(),
            &request.resource_link,
            &date,
        )?;

        debug!(
            method = %request.method,
            link = %request.resource_link,
            "Sending store request"
        );

        let mut builder = self
            .http
            .request(request.method, url)
            .header("authorization", token)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header("accept", "application/json");

        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = request.body {
            builder = builder
                .header("content-type", request.content_type)
                .body(serde_json::to_vec(&body)?);
        }

        let response = builder.send().await?;
        check_status(response, &request.resource_link).await
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

async fn check_status(response: Response, resource_link: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound(resource_link.to_string()));
    }

    let headers = response.headers();
    let sub_status = header_string(headers, HEADER_SUB_STATUS).and_then(|s| s.parse().ok());
    let activity_id = header_string(headers, HEADER_ACTIVITY_ID);

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or(body);

    warn!(
        status = status.as_u16(),
        link = resource_link,
        "Store rejected request"
    );

    Err(StoreError::StoreFailure {
        status: status.as_u16(),
        sub_status,
        activity_id,
        message,
    })
}

async fn receipt(response: Response) -> Result<StoreReceipt, StoreError> {
    let request_charge =
        header_string(response.headers(), HEADER_REQUEST_CHARGE).and_then(|s| s.parse().ok());
    let activity_id = header_string(response.headers(), HEADER_ACTIVITY_ID);

    let mut receipt: StoreReceipt = response.json().await?;
    receipt.request_charge = request_charge;
    receipt.activity_id = activity_id;
    Ok(receipt)
}

/// The partition key header is a JSON array; non-ASCII characters are
/// escaped because header values must be visible ASCII.
fn partition_key_header(id: &str) -> String {
    let mut out = String::from("[\"");
    for c in id.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push_str("\"]");
    out
}

#[async_trait]
impl DocumentStore for CosmosClient {
    async fn read_database(&self, database: &DatabaseLink) -> Result<StoreReceipt, StoreError> {
        let request = StoreRequest::new(
            Method::GET,
            ResourceType::Database,
            database.to_string(),
            database.url_path(),
        );
        receipt(self.send(request).await?).await
    }

    async fn create_database(&self, database: &DatabaseLink) -> Result<StoreReceipt, StoreError> {
        let request = StoreRequest::new(
            Method::POST,
            ResourceType::Database,
            String::new(),
            "dbs".to_string(),
        )
        .json(json!({ "id": database.id() }));
        receipt(self.send(request).await?).await
    }

    async fn read_collection(
        &self,
        collection: &CollectionLink,
    ) -> Result<StoreReceipt, StoreError> {
        let request = StoreRequest::new(
            Method::GET,
            ResourceType::Collection,
            collection.to_string(),
            collection.url_path(),
        );
        receipt(self.send(request).await?).await
    }

    async fn create_collection(
        &self,
        collection: &CollectionLink,
        offer_throughput: u32,
    ) -> Result<StoreReceipt, StoreError> {
        let database = collection.database();
        let request = StoreRequest::new(
            Method::POST,
            ResourceType::Collection,
            database.to_string(),
            format!("{}/colls", database.url_path()),
        )
        .header("x-ms-offer-throughput", offer_throughput.to_string())
        .json(json!({
            "id": collection.id(),
            "partitionKey": {
                "paths": [PARTITION_KEY_PATH],
                "kind": "Hash",
            },
        }));
        receipt(self.send(request).await?).await
    }

    async fn read_document(
        &self,
        document: &DocumentLink,
        partition_key: Option<&str>,
    ) -> Result<Value, StoreError> {
        let request = StoreRequest::new(
            Method::GET,
            ResourceType::Document,
            document.to_string(),
            document.url_path(),
        )
        .partition_key(partition_key);
        Ok(self.send(request).await?.json().await?)
    }

    async fn create_document(
        &self,
        collection: &CollectionLink,
        body: Value,
        partition_key: Option<&str>,
    ) -> Result<StoreReceipt, StoreError> {
        let request = StoreRequest::new(
            Method::POST,
            ResourceType::Document,
            collection.to_string(),
            format!("{}/docs", collection.url_path()),
        )
        .partition_key(partition_key)
        .json(body);
        receipt(self.send(request).await?).await
    }

    async fn replace_document(
        &self,
        document: &DocumentLink,
        body: Value,
        partition_key: Option<&str>,
    ) -> Result<StoreReceipt, StoreError> {
        let request = StoreRequest::new(
            Method::PUT,
            ResourceType::Document,
            document.to_string(),
            document.url_path(),
        )
        .partition_key(partition_key)
        .json(body);
        receipt(self.send(request).await?).await
    }

    async fn delete_document(
        &self,
        document: &DocumentLink,
        partition_key: Option<&str>,
    ) -> Result<(), StoreError> {
        let request = StoreRequest::new(
            Method::DELETE,
            ResourceType::Document,
            document.to_string(),
            document.url_path(),
        )
        .partition_key(partition_key);
        self.send(request).await?;
        Ok(())
    }

    async fn query_documents(
        &self,
        collection: &CollectionLink,
        filter: &Filter,
        continuation: Option<&str>,
    ) -> Result<FeedPage, StoreError> {
        let sql = filter.to_sql_query()?;
        let mut request = StoreRequest::new(
            Method::POST,
            ResourceType::Document,
            collection.to_string(),
            format!("{}/docs", collection.url_path()),
        )
        .header("x-ms-documentdb-isquery", "True")
        .header("x-ms-documentdb-query-enablecrosspartition", "True")
        .header("x-ms-max-item-count", "-1")
        .json(serde_json::to_value(&sql)?);
        request.content_type = "application/query+json";

        if let Some(token) = continuation {
            request = request.header(HEADER_CONTINUATION, token);
        }

        let response = self.send(request).await?;
        let next = header_string(response.headers(), HEADER_CONTINUATION);
        let page: QueryResponse = response.json().await?;

        debug!(
            link = %collection,
            count = page.documents.len(),
            has_more = next.is_some(),
            "Fetched query page"
        );

        Ok(FeedPage {
            documents: page.documents,
            continuation: next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_key_header_is_json_array() {
        assert_eq!(partition_key_header("item-1"), r#"["item-1"]"#);
        assert_eq!(partition_key_header(r#"a"b"#), r#"["a\"b"]"#);
    }

    #[test]
    fn partition_key_header_escapes_non_ascii() {
        assert_eq!(partition_key_header("caf\u{e9}"), r#"["caf\u00e9"]"#);
        assert_eq!(partition_key_header("\u{1f600}"), r#"["\ud83d\ude00"]"#);
    }
}

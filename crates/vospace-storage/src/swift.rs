//! OpenStack Swift HTTP client

use crate::client::{AccountInfo, ContainerInfo, ListQuery, ObjectClient, ObjectEntry, ObjectMeta};
use crate::{ByteStream, Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{Body, Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

const AUTH_TOKEN: &str = "X-Auth-Token";
const OBJECT_MANIFEST: &str = "X-Object-Manifest";
const COPY_FROM: &str = "X-Copy-From";
const CONTAINER_SYNC_TO: &str = "X-Container-Sync-To";
const CONTAINER_SYNC_KEY: &str = "X-Container-Sync-Key";
const CONTAINER_BYTES_USED: &str = "X-Container-Bytes-Used";
const CONTAINER_OBJECT_COUNT: &str = "X-Container-Object-Count";
const ACCOUNT_BYTES_USED: &str = "X-Account-Bytes-Used";
const ACCOUNT_OBJECT_COUNT: &str = "X-Account-Object-Count";
const ACCOUNT_CONTAINER_COUNT: &str = "X-Account-Container-Count";

/// Configuration for a Swift account connection
#[derive(Clone, Debug)]
pub struct SwiftConfig {
    /// Account storage URL (e.g., "http://swift:8080/v1/AUTH_test")
    pub storage_url: String,
    /// Token sent as `X-Auth-Token`
    pub auth_token: String,
    /// Request timeout, long enough for large uploads
    pub timeout: Duration,
    /// Idle connections kept per host
    pub max_connections_per_host: usize,
}

impl Default for SwiftConfig {
    fn default() -> Self {
        Self {
            storage_url: "http://localhost:8080/v1/AUTH_test".to_string(),
            auth_token: String::new(),
            timeout: Duration::from_secs(600),
            max_connections_per_host: 50,
        }
    }
}

impl SwiftConfig {
    pub fn new(storage_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            storage_url: storage_url.into(),
            auth_token: auth_token.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections_per_host = max;
        self
    }
}

/// Swift object client over a shared connection pool
#[derive(Clone)]
pub struct SwiftClient {
    http: Client,
    config: SwiftConfig,
}

impl SwiftClient {
    /// Create a client with its own connection pool
    pub fn new(config: SwiftConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self::with_http_client(http, config))
    }

    /// Reuse an existing pool
    pub fn with_http_client(http: Client, config: SwiftConfig) -> Self {
        let mut config = config;
        config.storage_url = config.storage_url.trim_end_matches('/').to_string();
        Self { http, config }
    }

    pub fn config(&self) -> &SwiftConfig {
        &self.config
    }

    fn container_url(&self, container: &str) -> String {
        format!("{}/{}", self.config.storage_url, urlencoding::encode(container))
    }

    fn object_url(&self, container: &str, name: &str) -> String {
        format!("{}/{}", self.container_url(container), encode_object_name(name))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTH_TOKEN, &self.config.auth_token)
    }
}

/// Percent-encode each segment, keeping the separators
fn encode_object_name(name: &str) -> String {
    name.split('/')
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Turn a failed response into the matching error
async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => StorageError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StorageError::Unauthorized(format!("{}: {}", what, status))
        }
        StatusCode::BAD_REQUEST => StorageError::BadRequest(format!("{}: {}", what, body)),
        _ => StorageError::Api(format!("{} failed with {}: {}", what, status, body)),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> u64 {
    header_str(headers, name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn header_date(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    header_str(headers, LAST_MODIFIED.as_str())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|d| d.with_timezone(&Utc))
}

#[async_trait]
impl ObjectClient for SwiftClient {
    #[instrument(skip(self))]
    async fn account_info(&self) -> Result<AccountInfo> {
        let response = self
            .request(Method::HEAD, &self.config.storage_url)
            .send()
            .await?;
        let response = check(response, "account").await?;
        let headers = response.headers();
        Ok(AccountInfo {
            container_count: header_u64(headers, ACCOUNT_CONTAINER_COUNT),
            object_count: header_u64(headers, ACCOUNT_OBJECT_COUNT),
            bytes_used: header_u64(headers, ACCOUNT_BYTES_USED),
        })
    }

    #[instrument(skip(self))]
    async fn container_info(&self, container: &str) -> Result<Option<ContainerInfo>> {
        let response = self
            .request(Method::HEAD, &self.container_url(container))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response, container).await?;
        let headers = response.headers();
        Ok(Some(ContainerInfo {
            object_count: header_u64(headers, CONTAINER_OBJECT_COUNT),
            bytes_used: header_u64(headers, CONTAINER_BYTES_USED),
            sync_to: header_str(headers, CONTAINER_SYNC_TO)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        }))
    }

    #[instrument(skip(self))]
    async fn create_container(&self, container: &str) -> Result<()> {
        let response = self
            .request(Method::PUT, &self.container_url(container))
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        check(response, container).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_container(&self, container: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &self.container_url(container))
            .send()
            .await?;
        check(response, container).await?;
        Ok(())
    }

    #[instrument(skip(self, key))]
    async fn set_container_sync(&self, container: &str, sync_to: &str, key: &str) -> Result<()> {
        let response = self
            .request(Method::POST, &self.container_url(container))
            .header(CONTAINER_SYNC_TO, sync_to)
            .header(CONTAINER_SYNC_KEY, key)
            .send()
            .await?;
        check(response, container).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_objects(&self, container: &str, query: &ListQuery) -> Result<Vec<ObjectEntry>> {
        let mut params = vec![
            ("format", "json".to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(prefix) = &query.prefix {
            params.push(("prefix", prefix.clone()));
        }
        if let Some(marker) = &query.marker {
            params.push(("marker", marker.clone()));
        }

        let response = self
            .request(Method::GET, &self.container_url(container))
            .query(&params)
            .send()
            .await?;
        let response = check(response, container).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }

        let entries: Vec<ObjectEntry> = response.json().await?;
        debug!(count = entries.len(), "listed objects");
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn head_object(&self, container: &str, name: &str) -> Result<Option<ObjectMeta>> {
        let response = self
            .request(Method::HEAD, &self.object_url(container, name))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response, name).await?;
        let headers = response.headers();
        Ok(Some(ObjectMeta {
            content_length: header_u64(headers, CONTENT_LENGTH.as_str()),
            content_type: header_str(headers, CONTENT_TYPE.as_str())
                .unwrap_or(crate::FILE_CONTENT_TYPE)
                .to_string(),
            manifest: header_str(headers, OBJECT_MANIFEST).map(str::to_string),
            etag: header_str(headers, ETAG.as_str()).map(|e| e.trim_matches('"').to_string()),
            last_modified: header_date(headers),
        }))
    }

    #[instrument(skip(self))]
    async fn get_object(&self, container: &str, name: &str) -> Result<Option<ByteStream>> {
        let response = self
            .request(Method::GET, &self.object_url(container, name))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response, name).await?;
        let stream = response
            .bytes_stream()
            .map_err(std::io::Error::other);
        Ok(Some(Box::pin(stream)))
    }

    #[instrument(skip(self, data))]
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        data: ByteStream,
        content_type: &str,
    ) -> Result<()> {
        let response = self
            .request(Method::PUT, &self.object_url(container, name))
            .header(CONTENT_TYPE, content_type)
            .body(Body::wrap_stream(data))
            .send()
            .await?;
        check(response, name).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn put_manifest(
        &self,
        container: &str,
        name: &str,
        manifest: &str,
        content_type: &str,
    ) -> Result<()> {
        let response = self
            .request(Method::PUT, &self.object_url(container, name))
            .header(CONTENT_TYPE, content_type)
            .header(OBJECT_MANIFEST, manifest)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        check(response, name).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy_object(
        &self,
        src_container: &str,
        src_name: &str,
        dst_container: &str,
        dst_name: &str,
    ) -> Result<()> {
        let source = format!(
            "/{}/{}",
            urlencoding::encode(src_container),
            encode_object_name(src_name)
        );
        let response = self
            .request(Method::PUT, &self.object_url(dst_container, dst_name))
            .header(COPY_FROM, source)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        check(response, src_name).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, container: &str, name: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &self.object_url(container, name))
            .send()
            .await?;
        check(response, name).await?;
        Ok(())
    }

    fn storage_url(&self) -> &str {
        &self.config.storage_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collect_bytes, NodePath, ObjectStorage, StorageBackend};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> SwiftClient {
        SwiftClient::new(SwiftConfig::new(
            format!("{}/v1/AUTH_test", server.uri()),
            "tk",
        ))
        .unwrap()
    }

    #[test]
    fn test_encode_object_name_keeps_separators() {
        assert_eq!(encode_object_name("a b/c&d"), "a%20b/c%26d");
    }

    #[tokio::test]
    async fn test_head_missing_object_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/v1/AUTH_test/cont/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.head_object("cont", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_objects_sends_paging_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/AUTH_test/cont"))
            .and(query_param("format", "json"))
            .and(query_param("limit", "2"))
            .and(query_param("prefix", "dir/"))
            .and(query_param("marker", "dir/a"))
            .and(header("X-Auth-Token", "tk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "dir/b", "bytes": 3, "content_type": "text/plain", "hash": "x"},
                {"name": "dir/c", "bytes": 0}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let query = ListQuery::new(2)
            .with_prefix("dir/")
            .with_marker(Some("dir/a".to_string()));
        let entries = client.list_objects("cont", &query).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "dir/b");
        assert_eq!(entries[0].bytes, 3);
        assert_eq!(entries[1].content_type, "");
    }

    #[tokio::test]
    async fn test_account_bytes_used() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/v1/AUTH_test"))
            .respond_with(
                ResponseTemplate::new(204)
                    .insert_header("X-Account-Bytes-Used", "4096")
                    .insert_header("X-Account-Container-Count", "3"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let info = client.account_info().await.unwrap();
        assert_eq!(info.bytes_used, 4096);
        assert_eq!(info.container_count, 3);
    }

    #[tokio::test]
    async fn test_get_bytes_on_missing_object_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/AUTH_test/cont/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let storage = ObjectStorage::new(client_for(&server).await);
        let data = storage
            .get_bytes(&NodePath::parse("/cont/gone").unwrap())
            .await
            .unwrap();
        assert!(collect_bytes(data).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_chunked_bytes_writes_manifest_header() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/v1/AUTH_test/cont/big"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/AUTH_test/cont/big"))
            .and(header("X-Object-Manifest", "chunked/upload-7/"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let storage = ObjectStorage::new(client_for(&server).await);
        storage
            .put_chunked_bytes(&NodePath::parse("/cont/big").unwrap(), "upload-7")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_token_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/AUTH_test/cont"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.create_container("cont").await.unwrap_err();
        assert!(matches!(err, StorageError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_copy_sends_copy_from() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/AUTH_test/dst/b"))
            .and(header("X-Copy-From", "/src/a%20b"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.copy_object("src", "a b", "dst", "b").await.unwrap();
    }
}

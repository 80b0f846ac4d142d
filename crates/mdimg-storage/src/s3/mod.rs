//! S3-compatible object storage (Cloudflare R2, `MinIO`, AWS S3).
//!
//! Requests are path-style (`{endpoint}/{bucket}/{key}`) and signed with
//! AWS Signature Version 4. Only single-part `PUT` and `DELETE` are used.

mod sigv4;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mdimg_core::{StorageError, StoragePort};
use url::Url;

use sigv4::{CanonicalRequest, EMPTY_PAYLOAD_HASH, Signer, encode_key, sha256_hex};

const SERVICE: &str = "s3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Longest error body kept in a `Rejected` message.
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for an S3-compatible bucket.
#[derive(Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub public_url: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("public_url", &self.public_url)
            .finish()
    }
}

/// Storage adapter speaking the S3 REST API.
#[derive(Debug, Clone)]
pub struct S3CompatibleStorage {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    config: S3Config,
    public_base: String,
}

impl S3CompatibleStorage {
    pub fn new(config: S3Config) -> Result<Self, StorageError> {
        for (name, value) in [
            ("bucket", &config.bucket),
            ("region", &config.region),
            ("access key id", &config.access_key_id),
            ("secret access key", &config.secret_access_key),
        ] {
            if value.trim().is_empty() {
                return Err(StorageError::Configuration(format!("missing S3 {name}")));
            }
        }

        let endpoint = Url::parse(config.endpoint.trim_end_matches('/')).map_err(|e| {
            StorageError::Configuration(format!("invalid endpoint '{}': {e}", config.endpoint))
        })?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(StorageError::Configuration(format!(
                    "endpoint '{}' has no host",
                    config.endpoint
                )));
            }
        };

        let public_base = config.public_url.as_deref().map_or_else(
            || format!("{}/{}", endpoint.as_str().trim_end_matches('/'), config.bucket),
            |url| url.trim_end_matches('/').to_string(),
        );

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            host,
            config,
            public_base,
        })
    }

    /// Encoded request path for `key`, including the endpoint's own path.
    fn object_path(&self, key: &str) -> String {
        let prefix = self.endpoint.path().trim_end_matches('/');
        format!(
            "{prefix}/{}/{}",
            urlencoding::encode(&self.config.bucket),
            encode_key(key.trim_start_matches('/'))
        )
    }

    fn signer(&self) -> Signer<'_> {
        Signer {
            access_key_id: &self.config.access_key_id,
            secret_access_key: &self.config.secret_access_key,
            region: &self.config.region,
            service: SERVICE,
        }
    }

    /// Build and sign a request. `extra` headers are signed as well.
    fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        payload_hash: &str,
        extra: Vec<(String, String)>,
    ) -> Result<reqwest::RequestBuilder, StorageError> {
        let path = self.object_path(key);
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = vec![
            ("host".to_string(), self.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        headers.extend(extra);

        let canonical = CanonicalRequest {
            method: method.as_str(),
            path: &path,
            query: "",
            headers,
            payload_hash,
        };
        let authorization = self.signer().authorization(&canonical, &amz_date)?;

        let url = format!(
            "{}://{}{path}",
            self.endpoint.scheme(),
            self.host
        );
        let mut builder = self.client.request(method.clone(), url);
        for (name, value) in canonical.headers {
            if name != "host" {
                builder = builder.header(name, value);
            }
        }
        Ok(builder.header("authorization", authorization))
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StorageError> {
        builder
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))
    }
}

async fn rejection(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    StorageError::Rejected { status, message }
}

#[async_trait]
impl StoragePort for S3CompatibleStorage {
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::Io(format!("read {}: {e}", local_path.display())))?;
        let payload_hash = sha256_hex(&body);
        let size = body.len();

        let builder = self.signed_request(
            reqwest::Method::PUT,
            key,
            &payload_hash,
            vec![("content-type".to_string(), content_type.to_string())],
        )?;
        let response = self.send(builder.body(body)).await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        tracing::debug!(
            target: "mdimg.storage",
            backend = "s3",
            bucket = %self.config.bucket,
            key = %key,
            content_type,
            size,
            "Stored object"
        );
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let builder =
            self.signed_request(reqwest::Method::DELETE, key, EMPTY_PAYLOAD_HASH, Vec::new())?;
        let response = self.send(builder).await?;
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(target: "mdimg.storage", backend = "s3", key = %key, "Deleted object");
            return Ok(());
        }
        Err(rejection(response).await)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }
}

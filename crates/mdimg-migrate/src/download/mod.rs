//! Fetching and staging of source images.
//!
//! [`DownloadWorker::fetch`] performs one attempt at retrieving an image and
//! [`DownloadWorker::stage`] validates (and optionally optimizes) the bytes
//! and writes them to the staging directory. Retrying is the caller's job.

mod headers;
mod known_bad;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mdimg_core::{FetchRequest, HttpFetcher, MigrationError, ValidationFailure};
use sha2::{Digest, Sha256};

use crate::atomic::atomic_write;
use crate::cache::Cache;
use crate::optimize::ImageOptimizer;
use crate::validate::{ContentValidator, ImageKind};

pub use headers::{HeaderSet, OriginHeaders, OriginRule};
pub use known_bad::KnownBadUrls;

/// Upper bound for the per-attempt timeout.
pub const MAX_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Bytes received for one URL, not yet validated.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub url: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// A validated image written to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub path: PathBuf,
    pub kind: ImageKind,
    pub content_type: String,
    pub size: u64,
    /// SHA-256 of the content, lowercase hex.
    pub checksum: String,
}

/// Per-run download worker.
pub struct DownloadWorker {
    fetcher: Arc<dyn HttpFetcher>,
    validator: ContentValidator,
    origin_headers: OriginHeaders,
    header_cache: Arc<Cache<String, HeaderSet>>,
    staging_dir: PathBuf,
    base_timeout: Duration,
    optimizer: Option<ImageOptimizer>,
}

impl std::fmt::Debug for DownloadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadWorker")
            .field("staging_dir", &self.staging_dir)
            .field("base_timeout", &self.base_timeout)
            .field("max_file_size", &self.validator.max_file_size())
            .field("optimizer", &self.optimizer)
            .finish_non_exhaustive()
    }
}

impl DownloadWorker {
    pub fn new(
        fetcher: Arc<dyn HttpFetcher>,
        validator: ContentValidator,
        origin_headers: OriginHeaders,
        header_cache: Arc<Cache<String, HeaderSet>>,
        staging_dir: impl Into<PathBuf>,
        base_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            validator,
            origin_headers,
            header_cache,
            staging_dir: staging_dir.into(),
            base_timeout,
            optimizer: None,
        }
    }

    /// Resize and recompress images after validation.
    #[must_use]
    pub const fn with_optimizer(mut self, optimizer: Option<ImageOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Timeout for attempt number `attempt` (1-based).
    #[must_use]
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        self.base_timeout
            .saturating_mul(attempt.max(1))
            .min(MAX_ATTEMPT_TIMEOUT)
    }

    async fn headers_for(&self, url: &str, timeout: Duration) -> HeaderSet {
        let Some(origin) = OriginHeaders::origin_key(url) else {
            return self
                .origin_headers
                .resolve(url, self.fetcher.as_ref(), timeout)
                .await;
        };
        if let Some(headers) = self.header_cache.get(&origin).await {
            return headers;
        }
        let headers = self
            .origin_headers
            .resolve(url, self.fetcher.as_ref(), timeout)
            .await;
        self.header_cache.set(origin, headers.clone()).await;
        headers
    }

    /// One attempt at fetching `url`.
    ///
    /// Declared headers are checked before the body is read, and the body is
    /// read with a hard limit of the maximum file size.
    pub async fn fetch(&self, url: &str, attempt: u32) -> Result<FetchedPayload, MigrationError> {
        let timeout = self.attempt_timeout(attempt);
        let headers = self.headers_for(url, timeout).await;
        let request = FetchRequest::new(url, timeout).with_headers(headers);

        let result = tokio::time::timeout(timeout, self.fetch_once(url, request)).await;

        match result {
            Ok(Ok(payload)) => {
                tracing::debug!(
                    target: "mdimg.download",
                    url = %url,
                    attempt,
                    bytes = payload.bytes.len(),
                    "Fetched image"
                );
                Ok(payload)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MigrationError::network(format!(
                "timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        request: FetchRequest,
    ) -> Result<FetchedPayload, MigrationError> {
        let response = self.fetcher.fetch(request).await?;
        if !response.is_success() {
            return Err(MigrationError::http_status(response.status));
        }

        self.validator
            .check_declared(response.content_type.as_deref(), response.content_length)?;

        let declared_length = response.content_length;
        let content_type = response.content_type;
        let bytes = response
            .body
            .read_all(self.validator.max_file_size())
            .await?;

        if let Some(declared) = declared_length {
            if declared != bytes.len() as u64 {
                return Err(MigrationError::network(format!(
                    "received {} bytes, expected {declared}",
                    bytes.len()
                )));
            }
        }

        Ok(FetchedPayload {
            url: url.to_string(),
            bytes,
            content_type,
        })
    }

    /// Validate `payload` and write it to `{staging_dir}/{staging_name}`.
    ///
    /// Nothing is written unless validation passes. With an optimizer set,
    /// the staged bytes (and so the checksum) are those of the re-encoded
    /// image.
    pub async fn stage(
        &self,
        payload: FetchedPayload,
        staging_name: &str,
    ) -> Result<StagedImage, MigrationError> {
        let FetchedPayload {
            url,
            bytes,
            content_type,
        } = payload;

        let validator = self.validator.clone();
        let optimizer = self.optimizer;
        let (kind, bytes) = tokio::task::spawn_blocking(move || -> Result<_, MigrationError> {
            let kind = validator.validate(&bytes, content_type.as_deref())?;
            match optimizer.filter(|_| ImageOptimizer::applies_to(kind)) {
                Some(optimizer) => optimizer.optimize(bytes, kind).map(|o| (kind, o.bytes)),
                None => Ok((kind, bytes)),
            }
        })
        .await
        .map_err(|e| {
            MigrationError::validation(
                ValidationFailure::Corrupt,
                format!("decoder aborted: {e}"),
            )
        })??;

        let checksum = hex::encode(Sha256::digest(&bytes));
        let path = self.staging_dir.join(staging_name);
        atomic_write(&path, &bytes, false).await?;

        tracing::debug!(
            target: "mdimg.download",
            url = %url,
            path = %path.display(),
            kind = kind.mime_type(),
            checksum = %checksum,
            "Staged image"
        );

        Ok(StagedImage {
            path,
            kind,
            content_type: kind.mime_type().to_string(),
            size: bytes.len() as u64,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{ImageFormat, RgbImage};
    use mdimg_core::{BufferedBody, FetchError, FetchResponse};
    use std::io::Cursor;
    use std::sync::Mutex;

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    struct Fixed {
        status: u16,
        content_type: Option<String>,
        content_length: Option<u64>,
        body: Vec<u8>,
        seen_headers: Mutex<Vec<HeaderSet>>,
    }

    impl Fixed {
        fn ok(body: Vec<u8>) -> Self {
            Self {
                status: 200,
                content_type: Some("image/png".to_string()),
                content_length: Some(body.len() as u64),
                body,
                seen_headers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpFetcher for Fixed {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
            self.seen_headers.lock().unwrap().push(request.headers);
            Ok(FetchResponse {
                status: self.status,
                content_type: self.content_type.clone(),
                content_length: self.content_length,
                set_cookies: Vec::new(),
                body: Box::new(BufferedBody(self.body.clone())),
            })
        }
    }

    fn worker(fetcher: Arc<dyn HttpFetcher>, dir: &Path, max_size: u64) -> DownloadWorker {
        DownloadWorker::new(
            fetcher,
            ContentValidator::new(["image/png", "image/jpeg"], max_size),
            OriginHeaders::default(),
            Arc::new(Cache::new("headers", 16, Duration::from_secs(60))),
            dir,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_fetch_and_stage() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = png_bytes();
        let worker = worker(Arc::new(Fixed::ok(bytes.clone())), dir.path(), 1024 * 1024);

        let payload = worker.fetch("http://img.example/a.png", 1).await.unwrap();
        let staged = worker.stage(payload, "job_image_0.png").await.unwrap();

        assert_eq!(staged.kind, ImageKind::Png);
        assert_eq!(staged.size, bytes.len() as u64);
        assert_eq!(staged.checksum, hex::encode(Sha256::digest(&bytes)));
        assert_eq!(std::fs::read(&staged.path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_stage_with_optimizer_writes_resized_image() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_pixel(64, 48, image::Rgb([90, 120, 150]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        let bytes = out.into_inner();

        let worker = worker(Arc::new(Fixed::ok(Vec::new())), dir.path(), 1024 * 1024)
            .with_optimizer(Some(ImageOptimizer::new(mdimg_core::OptimizeSettings {
                max_width: 16,
                max_height: 16,
                quality: 80,
            })));
        let payload = FetchedPayload {
            url: "http://img.example/big.png".to_string(),
            bytes: bytes.clone(),
            content_type: Some("image/png".to_string()),
        };
        let staged = worker.stage(payload, "job_image_0.png").await.unwrap();

        assert_eq!(staged.kind, ImageKind::Png);
        let written = std::fs::read(&staged.path).unwrap();
        assert_ne!(written, bytes);
        assert_eq!(staged.size, written.len() as u64);
        assert_eq!(staged.checksum, hex::encode(Sha256::digest(&written)));
        let decoded = image::load_from_memory(&written).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[tokio::test]
    async fn test_non_success_status_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let mut fixed = Fixed::ok(Vec::new());
        fixed.status = 404;
        let worker = worker(Arc::new(fixed), dir.path(), 1024);

        let err = worker.fetch("http://img.example/a.png", 1).await.unwrap_err();
        assert_eq!(err, MigrationError::http_status(404));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_declared_oversize_is_rejected_before_body() {
        let dir = tempfile::tempdir().unwrap();
        let mut fixed = Fixed::ok(vec![0; 16]);
        fixed.content_length = Some(10_000);
        let worker = worker(Arc::new(fixed), dir.path(), 100);

        let err = worker.fetch("http://img.example/a.png", 1).await.unwrap_err();
        assert_eq!(err.failure_kind(), mdimg_core::FailureKind::Oversized);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_length_mismatch_is_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut fixed = Fixed::ok(png_bytes());
        fixed.content_length = Some(3);
        let worker = worker(Arc::new(fixed), dir.path(), 1024 * 1024);

        let err = worker.fetch("http://img.example/a.png", 1).await.unwrap_err();
        assert!(matches!(err, MigrationError::Network { status_code: None, .. }));
    }

    #[tokio::test]
    async fn test_invalid_content_is_not_staged() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(Arc::new(Fixed::ok(Vec::new())), dir.path(), 1024);
        let payload = FetchedPayload {
            url: "http://img.example/a.png".to_string(),
            bytes: b"\x89PNG\r\n\x1a\n garbage".to_vec(),
            content_type: Some("image/png".to_string()),
        };

        let err = worker.stage(payload, "x.png").await.unwrap_err();
        assert_eq!(err.failure_kind(), mdimg_core::FailureKind::Corrupt);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_headers_resolved_once_per_origin() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = Arc::new(Fixed::ok(png_bytes()));
        let worker = worker(fixed.clone(), dir.path(), 1024 * 1024);

        worker.fetch("https://mmbiz.qpic.cn/a/640?wx_fmt=png", 1).await.unwrap();
        worker.fetch("https://mmbiz.qpic.cn/b/640?wx_fmt=png", 2).await.unwrap();

        let seen = fixed.seen_headers.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert!(seen[0].iter().any(|(n, v)| n == "Referer" && v == "https://mp.weixin.qq.com/"));
        drop(seen);
        assert_eq!(worker.header_cache.stats().await.hits, 1);
    }

    #[test]
    fn test_attempt_timeout_is_capped() {
        let dir = std::env::temp_dir();
        let worker = worker(Arc::new(Fixed::ok(Vec::new())), &dir, 1);
        assert_eq!(worker.attempt_timeout(1), Duration::from_secs(30));
        assert_eq!(worker.attempt_timeout(3), Duration::from_secs(90));
        assert_eq!(worker.attempt_timeout(5), MAX_ATTEMPT_TIMEOUT);
    }
}

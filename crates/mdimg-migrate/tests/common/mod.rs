#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use mdimg_core::{
    BufferedBody, FetchError, FetchRequest, FetchResponse, HttpFetcher, MigrationSettings,
    StorageError, StoragePort,
};
use mdimg_migrate::RetryPolicy;
use mockall::mock;
use tokio_util::sync::CancellationToken;

mock! {
    pub Storage {}

    #[async_trait]
    impl StoragePort for Storage {
        async fn upload(&self, local_path: &Path, key: &str, content_type: &str) -> Result<String, StorageError>;
        async fn delete(&self, key: &str) -> Result<(), StorageError>;
        fn public_url(&self, key: &str) -> String;
    }
}

pub const CDN: &str = "https://cdn.test";

/// Storage that accepts every upload and counts them.
pub fn counting_storage(uploads: Arc<AtomicUsize>) -> MockStorage {
    let mut storage = MockStorage::new();
    storage.expect_upload().returning(move |_, key, _| {
        uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{CDN}/{key}"))
    });
    storage
        .expect_public_url()
        .returning(|key| format!("{CDN}/{key}"));
    storage
}

pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([shade, shade / 2, 255 - shade]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[derive(Debug, Clone)]
pub enum Reply {
    Body {
        bytes: Vec<u8>,
        content_type: &'static str,
        declare_length: bool,
    },
    Status(u16),
}

impl Reply {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self::Body {
            bytes,
            content_type: "image/png",
            declare_length: true,
        }
    }
}

/// Hand-written fetcher serving canned replies per URL.
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
    cancel_on_fetch: Mutex<Option<CancellationToken>>,
    total: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(url.to_string(), reply);
    }

    /// Cancel `token` as soon as the first request arrives.
    pub fn cancel_on_fetch(&self, token: CancellationToken) {
        *self.cancel_on_fetch.lock().unwrap() = Some(token);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetcher for FakeFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.url.clone())
            .or_default() += 1;
        if let Some(token) = self.cancel_on_fetch.lock().unwrap().as_ref() {
            token.cancel();
        }

        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or(Reply::Status(404));
        Ok(match reply {
            Reply::Body {
                bytes,
                content_type,
                declare_length,
            } => FetchResponse {
                status: 200,
                content_type: Some(content_type.to_string()),
                content_length: declare_length.then_some(bytes.len() as u64),
                set_cookies: Vec::new(),
                body: Box::new(BufferedBody(bytes)),
            },
            Reply::Status(status) => FetchResponse {
                status,
                content_type: Some("text/html".to_string()),
                content_length: None,
                set_cookies: Vec::new(),
                body: Box::new(BufferedBody(b"<html>error</html>".to_vec())),
            },
        })
    }
}

pub fn settings(dir: &Path) -> MigrationSettings {
    MigrationSettings {
        staging_dir: dir.join("temp"),
        state_dir: dir.join("state"),
        max_retries: 1,
        ..MigrationSettings::default()
    }
}

pub fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(max_retries)
        .with_delays(Duration::from_millis(1), Duration::from_millis(5))
        .with_jitter(0.0)
}

pub fn staged_files(settings: &MigrationSettings) -> Vec<PathBuf> {
    std::fs::read_dir(&settings.staging_dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default()
}

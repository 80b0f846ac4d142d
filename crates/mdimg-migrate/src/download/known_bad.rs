use std::collections::HashMap;

use mdimg_core::MigrationError;
use tokio::sync::Mutex;

/// URLs that failed permanently during the current run.
///
/// When a document links the same image several times, the first permanent
/// failure is recorded and the other tasks fail with the same reason without
/// touching the network again.
#[derive(Debug, Default)]
pub struct KnownBadUrls {
    urls: Mutex<HashMap<String, MigrationError>>,
}

impl KnownBadUrls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `url` as permanently failed. The first reason wins.
    pub async fn record(&self, url: &str, error: &MigrationError) {
        let mut urls = self.urls.lock().await;
        if !urls.contains_key(url) {
            tracing::debug!(target: "mdimg.download", url = %url, reason = %error, "Marking URL as known bad");
            urls.insert(url.to_string(), error.clone());
        }
    }

    /// The recorded failure for `url`, if any.
    pub async fn check(&self, url: &str) -> Option<MigrationError> {
        self.urls.lock().await.get(url).cloned()
    }

    pub async fn len(&self) -> usize {
        self.urls.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.urls.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdimg_core::ValidationFailure;

    #[tokio::test]
    async fn test_first_reason_wins() {
        let bad = KnownBadUrls::new();
        assert!(bad.check("http://x/a.png").await.is_none());

        let corrupt = MigrationError::validation(ValidationFailure::Corrupt, "truncated");
        bad.record("http://x/a.png", &corrupt).await;
        bad.record("http://x/a.png", &MigrationError::http_status(404)).await;

        assert_eq!(bad.check("http://x/a.png").await, Some(corrupt));
        assert_eq!(bad.len().await, 1);
    }
}

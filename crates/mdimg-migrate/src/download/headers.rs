//! Per-origin request headers.
//!
//! Many image hosts refuse hotlinked requests unless they look like they come
//! from a browser on the host's own site. [`OriginHeaders`] combines a
//! browser-like default header set with rules matched on the URL's host
//! suffix.

use std::time::Duration;

use mdimg_core::{FetchRequest, HttpFetcher};
use url::Url;

/// Header name/value pairs in send order.
pub type HeaderSet = Vec<(String, String)>;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Extra headers for hosts ending in `host_suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRule {
    pub host_suffix: String,
    pub referer: Option<String>,
    pub origin: Option<String>,
    /// Fetched once per run; its `Set-Cookie` values become a `Cookie` header.
    pub cookie_bootstrap_url: Option<String>,
    pub extra_headers: HeaderSet,
}

impl OriginRule {
    pub fn new(host_suffix: impl Into<String>) -> Self {
        Self {
            host_suffix: host_suffix.into(),
            referer: None,
            origin: None,
            cookie_bootstrap_url: None,
            extra_headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_cookie_bootstrap(mut self, url: impl Into<String>) -> Self {
        self.cookie_bootstrap_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    fn matches(&self, host: &str) -> bool {
        let suffix = self.host_suffix.trim_start_matches('.');
        host == suffix || host.ends_with(&format!(".{suffix}"))
    }
}

/// Default headers plus origin-specific rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginHeaders {
    defaults: HeaderSet,
    rules: Vec<OriginRule>,
}

impl Default for OriginHeaders {
    fn default() -> Self {
        Self::new(browser_defaults()).with_rule(
            OriginRule::new("mmbiz.qpic.cn")
                .with_referer("https://mp.weixin.qq.com/")
                .with_origin("https://mp.weixin.qq.com")
                .with_header("Cache-Control", "no-cache")
                .with_header("Pragma", "no-cache"),
        )
    }
}

fn browser_defaults() -> HeaderSet {
    [
        ("User-Agent", BROWSER_USER_AGENT),
        (
            "Accept",
            "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Sec-Fetch-Dest", "image"),
        ("Sec-Fetch-Mode", "no-cors"),
        ("Sec-Fetch-Site", "cross-site"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl OriginHeaders {
    #[must_use]
    pub const fn new(defaults: HeaderSet) -> Self {
        Self {
            defaults,
            rules: Vec::new(),
        }
    }

    /// Add a rule. Later rules are consulted after earlier ones.
    #[must_use]
    pub fn with_rule(mut self, rule: OriginRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Cache key for `url`: scheme, host and port.
    #[must_use]
    pub fn origin_key(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        Some(match parsed.port() {
            Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
            None => format!("{}://{host}", parsed.scheme()),
        })
    }

    fn rule_for(&self, url: &str) -> Option<&OriginRule> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        self.rules.iter().find(|rule| rule.matches(&host))
    }

    /// Resolve the headers to send for `url`.
    ///
    /// Performs the rule's cookie bootstrap request, if any. A failed
    /// bootstrap is logged and the headers are returned without a cookie.
    pub async fn resolve(
        &self,
        url: &str,
        fetcher: &dyn HttpFetcher,
        timeout: Duration,
    ) -> HeaderSet {
        let mut headers = self.defaults.clone();
        let Some(rule) = self.rule_for(url) else {
            return headers;
        };

        if let Some(referer) = &rule.referer {
            set_header(&mut headers, "Referer", referer);
        }
        if let Some(origin) = &rule.origin {
            set_header(&mut headers, "Origin", origin);
        }
        for (name, value) in &rule.extra_headers {
            set_header(&mut headers, name, value);
        }

        if let Some(bootstrap) = &rule.cookie_bootstrap_url {
            let request = FetchRequest::new(bootstrap.clone(), timeout)
                .with_headers(self.defaults.clone());
            match fetcher.fetch(request).await {
                Ok(response) if response.is_success() => {
                    let cookie = cookie_header(&response.set_cookies);
                    if cookie.is_empty() {
                        tracing::debug!(target: "mdimg.download", bootstrap = %bootstrap, "Cookie bootstrap returned no cookies");
                    } else {
                        set_header(&mut headers, "Cookie", &cookie);
                    }
                }
                Ok(response) => {
                    tracing::warn!(
                        target: "mdimg.download",
                        bootstrap = %bootstrap,
                        status = response.status,
                        "Cookie bootstrap failed"
                    );
                }
                Err(e) => {
                    tracing::warn!(target: "mdimg.download", bootstrap = %bootstrap, error = %e, "Cookie bootstrap failed");
                }
            }
        }
        headers
    }
}

fn set_header(headers: &mut HeaderSet, name: &str, value: &str) {
    if let Some(existing) = headers
        .iter_mut()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
    {
        existing.1 = value.to_string();
    } else {
        headers.push((name.to_string(), value.to_string()));
    }
}

/// Turn `Set-Cookie` values into a single `Cookie` header value.
fn cookie_header(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .filter_map(|c| c.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mdimg_core::{BufferedBody, FetchError, FetchResponse};
    use std::sync::Mutex;

    struct CookieServer {
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpFetcher for CookieServer {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
            self.requests.lock().unwrap().push(request.url);
            Ok(FetchResponse {
                status: 200,
                content_type: Some("text/html".to_string()),
                content_length: None,
                set_cookies: vec![
                    "sid=abc; Path=/; HttpOnly".to_string(),
                    "lang=en".to_string(),
                ],
                body: Box::new(BufferedBody::default()),
            })
        }
    }

    fn header<'a>(headers: &'a HeaderSet, name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn test_wechat_host_gets_referer() {
        let server = CookieServer {
            requests: Mutex::new(Vec::new()),
        };
        let headers = OriginHeaders::default()
            .resolve(
                "https://mmbiz.qpic.cn/mmbiz_png/xyz/640?wx_fmt=png",
                &server,
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(header(&headers, "Referer"), Some("https://mp.weixin.qq.com/"));
        assert!(header(&headers, "User-Agent").is_some());
        assert!(server.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_hosts_get_defaults_only() {
        let server = CookieServer {
            requests: Mutex::new(Vec::new()),
        };
        let headers = OriginHeaders::default()
            .resolve("https://notmmbiz.qpic.cn.example.com/a.png", &server, Duration::from_secs(5))
            .await;
        assert!(header(&headers, "Referer").is_none());
    }

    #[tokio::test]
    async fn test_cookie_bootstrap() {
        let server = CookieServer {
            requests: Mutex::new(Vec::new()),
        };
        let origin = OriginHeaders::new(Vec::new()).with_rule(
            OriginRule::new("cdn.example.com").with_cookie_bootstrap("https://example.com/login"),
        );
        let headers = origin
            .resolve("https://img.cdn.example.com/a.png", &server, Duration::from_secs(5))
            .await;
        assert_eq!(header(&headers, "Cookie"), Some("sid=abc; lang=en"));
        assert_eq!(
            server.requests.lock().unwrap().as_slice(),
            ["https://example.com/login".to_string()]
        );
    }

    #[test]
    fn test_origin_key() {
        assert_eq!(
            OriginHeaders::origin_key("https://a.example.com:8443/x/y.png").as_deref(),
            Some("https://a.example.com:8443")
        );
        assert_eq!(
            OriginHeaders::origin_key("http://a.example.com/x.png").as_deref(),
            Some("http://a.example.com")
        );
    }
}

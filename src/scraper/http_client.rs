use crate::config::ScraperConfig;
use crate::error::{ScrapeError, ScrapeResult};
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::PageFetcher;

/// Headers the directory's JSON endpoints expect on XHR-style requests.
const XHR_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// One shared session for a whole run: browser-like headers, fixed timeout,
/// cookie store. No retries; a failed request is the caller's problem.
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> ScrapeResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, header_value(&config.accept)?);
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header_value(&config.accept_language)?,
        );

        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()?;

        Ok(Self { inner })
    }

    async fn read_body(url: &str, resp: reqwest::Response) -> ScrapeResult<String> {
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn get(&self, url: &str) -> ScrapeResult<String> {
        debug!("GET {}", url);
        let resp = self.inner.get(url).send().await?;
        Self::read_body(url, resp).await
    }

    async fn post_form(&self, url: &str, form: &[(String, String)]) -> ScrapeResult<String> {
        debug!("POST {} ({} fields)", url, form.len());
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();

        let resp = self
            .inner
            .post(url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, XHR_ACCEPT)
            .header("X-Requested-With", "XMLHttpRequest")
            .body(body)
            .send()
            .await?;
        Self::read_body(url, resp).await
    }
}

fn header_value(v: &str) -> ScrapeResult<HeaderValue> {
    HeaderValue::from_str(v).map_err(|e| ScrapeError::parse(format!("header value {:?}: {}", v, e)))
}

// ── Politeness ────────────────────────────────────────────────────────────────

/// Fixed pause between consecutive requests, plus optional random jitter.
/// Drivers call [`Pacer::pause`] between pages, never after the last one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pacer {
    delay: Duration,
    jitter_ms: u64,
}

impl Pacer {
    pub fn new(delay: Duration, jitter_ms: u64) -> Self {
        Self { delay, jitter_ms }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(config.request_delay(), config.jitter_ms)
    }

    /// No waiting at all.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::default()
    }

    /// Same pacer with the base delay multiplied (used between conferences).
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            delay: self.delay * factor,
            jitter_ms: self.jitter_ms,
        }
    }

    pub async fn pause(&self) {
        let jitter = if self.jitter_ms > 0 {
            rand::rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        let total = self.delay + Duration::from_millis(jitter);
        if !total.is_zero() {
            sleep(total).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(&ScraperConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_browser_headers() {
        let server = MockServer::start().await;
        let cfg = ScraperConfig::default();

        Mock::given(method("GET"))
            .and(path("/statistics"))
            .and(header_exists("user-agent"))
            .and(header_exists("accept-language"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .expect(1)
            .mount(&server)
            .await;

        let body = client()
            .get(&format!("{}/statistics", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<table></table>");

        let requests = server.received_requests().await.unwrap();
        let sent = &requests[0].headers;
        assert_eq!(sent.get("user-agent").unwrap().to_str().unwrap(), cfg.user_agent);
        assert_eq!(
            sent.get("accept-language").unwrap().to_str().unwrap(),
            "en-US,en;q=0.9"
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = assert_err!(client().get(&format!("{}/people", server.uri())).await);
        assert!(err.is_transport());
        assert!(matches!(err, ScrapeError::HttpStatus { status, .. } if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn test_post_form_encodes_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/people-ajax"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(body_string_contains("conf=3067919"))
            .and(body_string_contains("historic=true"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let form = vec![
            ("conf".to_string(), "3067919".to_string()),
            ("historic".to_string(), "true".to_string()),
        ];
        let body = assert_ok!(
            client()
                .post_form(&format!("{}/people-ajax", server.uri()), &form)
                .await
        );
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn test_pacer_scaled() {
        let p = Pacer::new(Duration::from_millis(5), 0).scaled(2);
        let started = std::time::Instant::now();
        p.pause().await;
        assert!(started.elapsed() >= Duration::from_millis(10));
        Pacer::none().pause().await;
    }
}

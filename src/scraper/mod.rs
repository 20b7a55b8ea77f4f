pub mod church;
pub mod cleaner;
pub mod http_client;
pub mod megachurch;
pub mod pagination;
pub mod parsers;
pub mod people;
pub mod stats;
pub mod work_history;

use crate::error::ScrapeResult;
use async_trait::async_trait;

// ── Fetcher trait ─────────────────────────────────────────────────────────────

/// Where pages come from. [`http_client::HttpClient`] in production, an
/// in-memory site in tests.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url`; the body on 2xx, an error otherwise.
    async fn get(&self, url: &str) -> ScrapeResult<String>;

    /// POST `form` url-encoded to `url`, flagged as an XHR request.
    async fn post_form(&self, url: &str, form: &[(String, String)]) -> ScrapeResult<String>;
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use crate::error::ScrapeError;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct FakeRequest {
        pub method: &'static str,
        pub url: String,
        pub form: Vec<(String, String)>,
    }

    type Responder = Box<dyn Fn(&FakeRequest) -> Option<String> + Send + Sync>;

    /// Serves whatever the responder returns; `None` becomes a 404.
    pub struct FakeSite {
        responder: Responder,
        requests: Mutex<Vec<FakeRequest>>,
    }

    impl FakeSite {
        pub fn new(responder: impl Fn(&FakeRequest) -> Option<String> + Send + Sync + 'static) -> Self {
            Self {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<FakeRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn urls(&self) -> Vec<String> {
            self.requests().into_iter().map(|r| r.url).collect()
        }

        fn serve(&self, req: FakeRequest) -> ScrapeResult<String> {
            let body = (self.responder)(&req);
            let url = req.url.clone();
            self.requests.lock().unwrap().push(req);
            body.ok_or(ScrapeError::HttpStatus {
                status: StatusCode::NOT_FOUND,
                url,
            })
        }
    }

    #[async_trait]
    impl PageFetcher for FakeSite {
        async fn get(&self, url: &str) -> ScrapeResult<String> {
            self.serve(FakeRequest {
                method: "GET",
                url: url.to_string(),
                form: Vec::new(),
            })
        }

        async fn post_form(&self, url: &str, form: &[(String, String)]) -> ScrapeResult<String> {
            self.serve(FakeRequest {
                method: "POST",
                url: url.to_string(),
                form: form.to_vec(),
            })
        }
    }
}

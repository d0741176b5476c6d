//! HTTP transport abstraction
//!
//! The engine never builds its own HTTP client. Callers inject an
//! [`HttpTransport`], which is a `reqwest` client in production and a
//! scripted fake in tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Response as seen by the engine: status plus opaque body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Statuses worth retrying: throttling and server-side failures
    pub fn is_transient_failure(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("invalid url `{0}`")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }
}

/// Minimal HTTP capability needed by the monitoring and decision clients
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url` with the given query parameters
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, TransportError>;

    /// POST a JSON body to `url`
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError>;
}

/// Join a base URI and a fixed sub-path, tolerating trailing slashes
pub fn endpoint(base: &str, path: &str) -> Result<Url, TransportError> {
    let joined = format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|_| TransportError::InvalidUrl(joined))
}

/// Production transport backed by a shared `reqwest` client
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }

    async fn finish(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, TransportError> {
        let url = Url::parse(url).map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::finish(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        let url = Url::parse(url).map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::finish(response).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for deterministic tests

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: &'static str,
        pub url: String,
        pub query: Vec<(String, String)>,
        pub body: Option<serde_json::Value>,
    }

    impl RecordedRequest {
        pub fn query_param(&self, name: &str) -> Option<&str> {
            self.query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        }
    }

    type Responder =
        Box<dyn Fn(&RecordedRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

    /// Transport that answers every request through a closure and records it
    pub struct ScriptedTransport {
        responder: Responder,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(
            responder: impl Fn(&RecordedRequest) -> Result<HttpResponse, TransportError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Answer every request with the same status and body
        pub fn always(status: u16, body: &str) -> Self {
            let body = body.to_string();
            Self::new(move |_| Ok(HttpResponse::new(status, body.clone())))
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn handle(&self, request: RecordedRequest) -> Result<HttpResponse, TransportError> {
            let result = (self.responder)(&request);
            self.requests.lock().unwrap().push(request);
            result
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            url: &str,
            query: &[(String, String)],
        ) -> Result<HttpResponse, TransportError> {
            self.handle(RecordedRequest {
                method: "GET",
                url: url.to_string(),
                query: query.to_vec(),
                body: None,
            })
        }

        async fn post_json(
            &self,
            url: &str,
            body: &serde_json::Value,
        ) -> Result<HttpResponse, TransportError> {
            self.handle(RecordedRequest {
                method: "POST",
                url: url.to_string(),
                query: Vec::new(),
                body: Some(body.clone()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("http://prometheus:9090/", "/api/v1/query_range")
                .unwrap()
                .as_str(),
            "http://prometheus:9090/api/v1/query_range"
        );
        assert_eq!(
            endpoint("http://decision:5000", "askllm").unwrap().as_str(),
            "http://decision:5000/askllm"
        );
        assert!(matches!(
            endpoint("not a url", "askllm"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(HttpResponse::new(503, "").is_transient_failure());
        assert!(HttpResponse::new(429, "").is_transient_failure());
        assert!(!HttpResponse::new(400, "").is_transient_failure());
        assert!(TransportError::Timeout.is_transient());
        assert!(!TransportError::Request("bad".into()).is_transient());
    }

    #[tokio::test]
    async fn test_reqwest_transport_get_passes_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(mockito::Matcher::UrlEncoded("step".into(), "60s".into()))
            .with_status(200)
            .with_body(r#"{"status":"success"}"#)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/api/v1/query_range", server.url());
        let response = transport
            .get(&url, &[("step".to_string(), "60s".to_string())])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert!(response.body.contains("success"));
    }

    #[tokio::test]
    async fn test_reqwest_transport_post_json_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/askllm")
            .match_header("content-type", "application/json")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/askllm", server.url());
        let response = transport
            .post_json(&url, &serde_json::json!({"metrics": "x"}))
            .await
            .unwrap();

        assert_eq!(response.status, 502);
        assert_eq!(response.body, "bad gateway");
    }
}

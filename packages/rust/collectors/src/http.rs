//! Shared HTTP client with per-call timeouts and error classification.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use jobcompass_shared::{JobCompassError, Result, Source};

/// Thin wrapper over [`reqwest::Client`] that maps failures onto
/// [`JobCompassError`] so the retry policy can classify them.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Build a client with the given User-Agent and per-call timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| JobCompassError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(
        &self,
        source: Source,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<String> {
        let response = self.send(source, url, self.request(url, query, headers)).await?;
        response
            .text()
            .await
            .map_err(|e| classify(source, url, e))
    }

    /// GET `url` and return the raw body bytes.
    pub async fn get_bytes(
        &self,
        source: Source,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>> {
        let response = self.send(source, url, self.request(url, query, headers)).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| classify(source, url, e))
    }

    fn request(&self, url: &str, query: &[(&str, String)], headers: &[(&str, &str)]) -> RequestBuilder {
        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request
    }

    async fn send(
        &self,
        source: Source,
        url: &str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| classify(source, url, e))?;
        let status = response.status();
        debug!(%source, url, status = status.as_u16(), "response received");

        if status.is_success() {
            return Ok(response);
        }
        Err(status_error(source, url, status))
    }
}

/// Map a non-success status onto the error taxonomy.
fn status_error(source: Source, url: &str, status: StatusCode) -> JobCompassError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => JobCompassError::auth(
            source.as_str(),
            format!("{url}: HTTP {status}, check credentials"),
        ),
        _ => JobCompassError::Http {
            status: status.as_u16(),
            message: format!("{url}: HTTP {status}"),
        },
    }
}

/// Map a transport-level reqwest error onto the error taxonomy.
fn classify(source: Source, url: &str, err: reqwest::Error) -> JobCompassError {
    if err.is_timeout() {
        JobCompassError::Timeout(format!("{source} {url}: {err}"))
    } else if err.is_decode() || err.is_body() {
        JobCompassError::parse(format!("{source} {url}: {err}"))
    } else if let Some(status) = err.status() {
        status_error(source, url, status)
    } else {
        JobCompassError::Network(format!("{source} {url}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new("JobCompass/test", Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn sends_query_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "data analyst"))
            .and(header("X-Test", "yes"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = client()
            .get_text(
                Source::JSearch,
                &format!("{}/search", server.uri()),
                &[("q", "data analyst".to_string())],
                &[("X-Test", "yes")],
            )
            .await
            .expect("fetch");
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn classifies_status_codes() {
        let server = MockServer::start().await;
        Mock::given(path("/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = client();
        let auth = http
            .get_text(Source::Adzuna, &format!("{}/auth", server.uri()), &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(auth, JobCompassError::Auth { .. }));

        let busy = http
            .get_text(Source::Adzuna, &format!("{}/busy", server.uri()), &[], &[])
            .await
            .unwrap_err();
        assert!(busy.is_transient());

        let missing = http
            .get_text(Source::Adzuna, &format!("{}/missing", server.uri()), &[], &[])
            .await
            .unwrap_err();
        assert!(!missing.is_transient());
    }

    #[tokio::test]
    async fn slow_response_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let http = HttpClient::new("JobCompass/test", Duration::from_millis(50)).expect("client");
        let err = http
            .get_text(Source::RemoteOk, &format!("{}/slow", server.uri()), &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, JobCompassError::Timeout(_)));
    }
}

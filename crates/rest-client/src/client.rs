//! HTTP transport shared by the venue clients.

use crate::error::RestError;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Back-off handed to callers when a 429 does not say how long to wait.
const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// Extra headers attached to a single request, typically signing headers.
pub type Headers<'a> = Option<&'a [(&'a str, &'a str)]>;

/// Cheap-to-clone HTTP client bound to one base URL.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
}

impl RestClient {
    /// # Errors
    /// Returns `RequestBuild` if reqwest cannot construct its connection pool.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::RequestBuild(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    pub fn with_default_timeout(base_url: &str) -> Result<Self, RestError> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path?query` and decode the JSON answer.
    ///
    /// The query is used exactly as given so signed requests match the bytes
    /// that were hashed.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: Headers<'_>,
    ) -> Result<T, RestError> {
        let url = self.url(path, query);
        tracing::debug!(%url, "GET");
        self.send(self.request(Method::GET, &url, headers)).await
    }

    /// POST a JSON document. `body` goes out untouched.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &str,
        headers: Headers<'_>,
    ) -> Result<T, RestError> {
        let url = self.url(path, None);
        tracing::debug!(%url, body_len = body.len(), "POST");
        let request = self
            .request(Method::POST, &url, headers)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_owned());
        self.send(request).await
    }

    fn request(&self, method: Method, url: &str, headers: Headers<'_>) -> RequestBuilder {
        headers
            .unwrap_or_default()
            .iter()
            .fold(self.http.request(method, url), |req, (k, v)| req.header(*k, *v))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RestError> {
        let response = request.send().await?;
        decode(response).await
    }

    fn url(&self, path: &str, query: Option<&str>) -> String {
        match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{}{path}?{q}", self.base_url),
            None => format!("{}{path}", self.base_url),
        }
    }
}

/// `Retry-After` in whole seconds, converted to milliseconds.
fn retry_after_ms(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(DEFAULT_RETRY_AFTER_MS, |secs| secs * 1000)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RestError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RestError::RateLimited {
            retry_after_ms: retry_after_ms(response.headers()),
        });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(RestError::HttpError {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(%body, error = %e, "undecodable response body");
        RestError::Parse(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client(base: &str) -> RestClient {
        RestClient::with_default_timeout(base).unwrap()
    }

    #[test]
    fn url_without_query() {
        assert_eq!(
            client("https://api.example.com").url("/v5/market/time", None),
            "https://api.example.com/v5/market/time"
        );
    }

    #[test]
    fn url_keeps_query_verbatim() {
        assert_eq!(
            client("https://api.example.com")
                .url("/v5/market/tickers", Some("category=linear&symbol=BTCUSDT")),
            "https://api.example.com/v5/market/tickers?category=linear&symbol=BTCUSDT"
        );
    }

    #[test]
    fn trailing_slash_and_empty_query_are_dropped() {
        let c = client("https://api.example.com/");
        assert_eq!(c.base_url(), "https://api.example.com");
        assert_eq!(
            c.url("/v5/order/create", Some("")),
            "https://api.example.com/v5/order/create"
        );
    }

    #[test]
    fn retry_after_falls_back_when_missing_or_garbled() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_ms(&headers), DEFAULT_RETRY_AFTER_MS);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after_ms(&headers), 3000);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after_ms(&headers), DEFAULT_RETRY_AFTER_MS);
    }
}

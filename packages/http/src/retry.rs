//! Retry-with-backoff policy for outbound requests.
//!
//! The request closure is called on each attempt to construct a fresh
//! [`reqwest::RequestBuilder`] (builders are consumed by `.send()`), so any
//! request shape can be retried.

use std::time::Duration;

use launch_risk_models::RetrySettings;
use reqwest::StatusCode;

use crate::HttpError;

/// Retries with exponential backoff on retryable statuses.
///
/// Elevation lookups and raw-data downloads share one policy, so both
/// retry exactly the same failures. With the defaults (5 retries, 2s base) the delays are 2s, 4s, 8s, 16s,
/// 32s: 62 seconds of waiting before giving up.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent one.
    pub base_delay: Duration,
    /// Which response statuses are retried. Anything else that is not a
    /// success fails immediately.
    pub retryable_status: fn(StatusCode) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            retryable_status: is_server_error,
        }
    }
}

/// Retry only 5xx responses.
#[must_use]
pub fn is_server_error(status: StatusCode) -> bool {
    status.is_server_error()
}

impl RetryPolicy {
    /// Policy built from the `[retry]` config section. Only 5xx is retried.
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sends a request, retrying per this policy. Returns the first
    /// successful (2xx/3xx) response.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::TransientNetwork`] once retries are exhausted,
    /// [`HttpError::Status`] for a non-retryable status, or
    /// [`HttpError::Http`] for a transport error.
    #[allow(clippy::future_not_send)]
    pub async fn send<F>(&self, url: &str, build_request: F) -> Result<reqwest::Response, HttpError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.delay_for(attempt);
                log::warn!("  retry {attempt}/{} in {delay:?}...", self.max_retries);
                tokio::time::sleep(delay).await;
            }

            let response = build_request().send().await?;
            let status = response.status();

            if (self.retryable_status)(status) {
                log::warn!("  HTTP {status} from {url}");
                last_error = format!("HTTP {status}");
                continue;
            }

            if status.is_client_error() || status.is_server_error() {
                return Err(HttpError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            return Ok(response);
        }

        Err(HttpError::TransientNetwork {
            url: url.to_string(),
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Sends a request and parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if the request fails per [`Self::send`] or the
    /// body is not valid JSON.
    #[allow(clippy::future_not_send)]
    pub async fn get_json<F>(&self, url: &str, build_request: F) -> Result<serde_json::Value, HttpError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let response = self.send(url, build_request).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|source| HttpError::Json {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves the given raw `(status line, body)` responses in order, one
    /// per connection, repeating the last one. Returns the base URL and a
    /// hit counter.
    pub(crate) async fn scripted_server(
        responses: Vec<(&'static str, &'static str)>,
    ) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses[n.min(responses.len() - 1)];
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), hits)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(32));
    }

    #[test]
    fn only_server_errors_are_retryable() {
        let policy = RetryPolicy::from_settings(&RetrySettings::default());
        assert!((policy.retryable_status)(StatusCode::BAD_GATEWAY));
        assert!((policy.retryable_status)(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!(policy.retryable_status)(StatusCode::TOO_MANY_REQUESTS));
        assert!(!(policy.retryable_status)(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn throttling_fails_immediately() {
        let (url, hits) = scripted_server(vec![("429 Too Many Requests", "")]).await;

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let err = fast_policy()
            .send(&url, || client.get(&url))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Status { status: 429, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let (url, hits) = scripted_server(vec![
            ("503 Service Unavailable", ""),
            ("500 Internal Server Error", ""),
            ("200 OK", r#"{"geoPoints":[{"elevation":12.5}]}"#),
        ])
        .await;

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let body = fast_policy()
            .get_json(&url, || client.get(&url))
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!((body["geoPoints"][0]["elevation"].as_f64().unwrap() - 12.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (url, hits) = scripted_server(vec![("502 Bad Gateway", "")]).await;

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let err = fast_policy()
            .send(&url, || client.get(&url))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let (url, hits) = scripted_server(vec![("404 Not Found", "")]).await;

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let err = fast_policy()
            .send(&url, || client.get(&url))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Status { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

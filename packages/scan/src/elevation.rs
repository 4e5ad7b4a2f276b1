//! Launch site elevation lookup.

use launch_risk_http::{HttpError, RetryPolicy};
use launch_risk_models::ElevationConfig;
use thiserror::Error;

/// Errors from an elevation lookup.
#[derive(Debug, Error)]
pub enum ElevationError {
    /// The request failed after retries.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The response had no usable elevation.
    #[error("No elevation in response from {url}")]
    Missing {
        /// Service endpoint.
        url: String,
    },
}

/// Looks up ground elevation over HTTP.
///
/// The service is queried with `lat`, `lon` and `dataSet` parameters and
/// answers `{"geoPoints": [{"elevation": <meters>}]}`.
#[derive(Debug, Clone)]
pub struct ElevationLookup {
    client: reqwest::Client,
    policy: RetryPolicy,
    config: ElevationConfig,
}

impl ElevationLookup {
    /// Creates a lookup.
    #[must_use]
    pub const fn new(client: reqwest::Client, policy: RetryPolicy, config: ElevationConfig) -> Self {
        Self {
            client,
            policy,
            config,
        }
    }

    /// Elevation in meters at the given coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError`] if the service fails after retries or the
    /// response has no elevation.
    pub async fn elevation(&self, latitude: f64, longitude: f64) -> Result<f64, ElevationError> {
        let url = &self.config.url;
        let query = [
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("dataSet", self.config.dataset.clone()),
        ];
        let body = self
            .policy
            .get_json(url, || self.client.get(url).query(&query))
            .await?;

        let elevation = body["geoPoints"][0]["elevation"]
            .as_f64()
            .ok_or_else(|| ElevationError::Missing { url: url.clone() })?;
        log::info!("Elevation at ({latitude}, {longitude}): {elevation} m");
        Ok(elevation)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    use super::*;

    /// Answers every request with `status` and `body`, recording the
    /// request line of the last one.
    async fn server(status: &'static str, body: &'static str) -> (String, tokio::sync::watch::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::watch::channel(String::new());

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let _ = tx.send(request.lines().next().unwrap_or_default().to_string());
                let reply = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/api/Elevation"), rx)
    }

    fn lookup(url: String) -> ElevationLookup {
        ElevationLookup::new(
            reqwest::Client::builder().no_proxy().build().unwrap(),
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
            ElevationConfig {
                url,
                dataset: "FABDEM".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn reads_first_geo_point() {
        let (url, seen) = server("200 OK", r#"{"geoPoints":[{"elevation":31.25},{"elevation":0}]}"#).await;
        let elevation = lookup(url).elevation(60.184101, 24.62369).await.unwrap();

        assert!((elevation - 31.25).abs() < 1e-9);
        let request_line = seen.borrow().clone();
        assert!(request_line.contains("lat=60.184101"));
        assert!(request_line.contains("dataSet=FABDEM"));
    }

    #[tokio::test]
    async fn missing_elevation_is_an_error() {
        let (url, _) = server("200 OK", r#"{"geoPoints":[]}"#).await;
        assert!(matches!(
            lookup(url).elevation(60.0, 24.0).await,
            Err(ElevationError::Missing { .. })
        ));
    }

    #[tokio::test]
    async fn persistent_server_errors_surface_as_transient() {
        let (url, _) = server("503 Service Unavailable", "").await;
        match lookup(url).elevation(60.0, 24.0).await {
            Err(ElevationError::Http(e)) => assert!(e.is_transient()),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

//! Streaming file downloads.
//!
//! Downloads are written to a `.part` file next to the destination and
//! renamed into place once complete, so an interrupted download never
//! leaves a file that passes an existence check.

use std::path::Path;

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

use crate::{HttpError, RetryPolicy};

/// Streams `url` into `dest`, logging every 100 MB.
///
/// Only the initial request is retried per `policy`; a body that fails
/// midway is an error.
///
/// # Errors
///
/// Returns an error if the request fails after retries, the response is
/// not successful, or the local file cannot be written.
pub async fn download_file(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    url: &str,
    dest: &Path,
) -> Result<u64, HttpError> {
    log::info!("Downloading {url} to {}", dest.display());

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let response = policy.send(url, || client.get(url)).await?;
    let expected = response.content_length();
    if let Some(size) = expected {
        log::info!("{url}: {:.1} MB expected", megabytes(size));
    }

    let part_path = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&part_path)
        .await
        .map_err(|e| io_error(&part_path, e))?;

    let mut body = response.bytes_stream();
    let mut received: u64 = 0;
    let mut next_report = PROGRESS_STEP;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| io_error(&part_path, e))?;
        received += chunk.len() as u64;

        if received >= next_report {
            next_report = (received / PROGRESS_STEP + 1) * PROGRESS_STEP;
            log_progress(url, received, expected);
        }
    }

    file.flush().await.map_err(|e| io_error(&part_path, e))?;
    drop(file);

    tokio::fs::rename(&part_path, dest)
        .await
        .map_err(|e| io_error(dest, e))?;

    log::info!("{url}: done, {:.1} MB", megabytes(received));
    Ok(received)
}

/// Bytes between progress log lines.
const PROGRESS_STEP: u64 = 100 * 1_048_576;

#[allow(clippy::cast_precision_loss)]
fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}

fn log_progress(url: &str, received: u64, expected: Option<u64>) {
    match expected.filter(|&total| total > 0) {
        Some(total) => {
            #[allow(clippy::cast_precision_loss)]
            let pct = received as f64 * 100.0 / total as f64;
            log::info!("{url}: {:.0} MB ({pct:.0}%)", megabytes(received));
        }
        None => log::info!("{url}: {:.0} MB", megabytes(received)),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> HttpError {
    HttpError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::retry::tests::scripted_server;

    #[tokio::test]
    async fn downloads_into_place_after_retry() {
        let (url, _hits) = scripted_server(vec![
            ("500 Internal Server Error", ""),
            ("200 OK", "{\"type\":\"FeatureCollection\",\"features\":[]}"),
        ])
        .await;

        let tmp = std::env::temp_dir().join("launch_risk_http_download_test");
        let _ = std::fs::remove_dir_all(&tmp);
        let dest = tmp.join("nested").join("countries.geojson");

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };

        let bytes = download_file(&client, &policy, &url, &dest).await.unwrap();

        assert_eq!(bytes, 42);
        assert!(dest.exists());
        assert!(!dest.with_extension("part").exists());
        let text = std::fs::read_to_string(&dest).unwrap();
        assert!(text.starts_with("{\"type\":\"FeatureCollection\""));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_file() {
        let (url, _hits) = scripted_server(vec![("404 Not Found", "")]).await;

        let tmp = std::env::temp_dir().join("launch_risk_http_download_missing");
        let _ = std::fs::remove_dir_all(&tmp);
        let dest = tmp.join("water.geojson");

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let result = download_file(&client, &RetryPolicy::default(), &url, &dest).await;

        assert!(matches!(result, Err(HttpError::Status { status: 404, .. })));
        assert!(!dest.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}

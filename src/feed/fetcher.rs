use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);
const DEFAULT_MAX_FEED_BYTES: usize = 50 * 1024 * 1024; // 50MB

/// Ceiling for a single backoff delay, however many retries are configured.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Why a source feed could not be downloaded.
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connect, TLS or body-stream failure
    #[error("Could not reach feed server: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Feed server answered with status {0}")]
    HttpStatus(u16),
    #[error("Feed download timed out")]
    Timeout,
    /// Still 429 once the retry budget was spent
    #[error("Feed server kept rate limiting after {0} retries")]
    RateLimited(u32),
    #[error("Feed exceeds the configured size limit")]
    ResponseTooLarge,
    /// Body shorter than its Content-Length
    #[error("Feed download truncated: got {received} of {expected} bytes")]
    IncompleteResponse { expected: u64, received: usize },
    /// The download artifact could not be written or read back
    #[error("Download file error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus(status) => *status == 429 || (500..600).contains(status),
            FetchError::IncompleteResponse { .. } => true,
            _ => false,
        }
    }
}

/// How a source feed is retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Upper bound for one attempt, covering both the request and the body.
    pub timeout: Duration,
    /// Retries for 429, 5xx and truncated bodies. Zero makes every
    /// non-2xx response immediately fatal.
    pub max_retries: u32,
    /// Base delay before a retry, doubled on each attempt.
    pub retry_backoff: Duration,
    pub max_feed_bytes: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_feed_bytes: DEFAULT_MAX_FEED_BYTES,
        }
    }
}

/// Downloads `url` into the file at `dest`, returning the number of bytes
/// written.
///
/// The body is streamed to disk chunk by chunk so large feeds never sit in
/// memory twice. `dest` is truncated on every attempt. The caller owns
/// `dest` and is responsible for removing it.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - An attempt exceeded `policy.timeout`
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::RateLimited`] - 429 responses after all retries
/// - [`FetchError::ResponseTooLarge`] - Body exceeded `policy.max_feed_bytes`
/// - [`FetchError::IncompleteResponse`] - Truncated body after all retries
/// - [`FetchError::Io`] - `dest` could not be written
pub async fn fetch_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    policy: &FetchPolicy,
) -> Result<u64, FetchError> {
    let mut retry_count = 0;

    loop {
        let outcome = tokio::time::timeout(
            policy.timeout,
            download_once(client, url, dest, policy.max_feed_bytes),
        )
        .await
        .unwrap_or(Err(FetchError::Timeout));

        match outcome {
            Ok(written) => return Ok(written),
            Err(e) if e.is_retryable() && retry_count < policy.max_retries => {
                let delay = retry_delay(policy.retry_backoff, retry_count);
                tracing::warn!(
                    url = %url,
                    error = %e,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Fetch failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(FetchError::HttpStatus(429)) if policy.max_retries > 0 => {
                return Err(FetchError::RateLimited(policy.max_retries));
            }
            Err(e) => return Err(e),
        }
    }
}

/// `base * 2^retry`, saturating and capped at [`MAX_RETRY_DELAY`].
fn retry_delay(base: Duration, retry: u32) -> Duration {
    let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

async fn download_once(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    limit: usize,
) -> Result<u64, FetchError> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let expected_length = response.content_length();
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut received: usize = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if received.saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        file.write_all(&chunk).await?;
        received += chunk.len();
    }
    file.flush().await?;

    if let Some(expected) = expected_length {
        if (received as u64) < expected {
            return Err(FetchError::IncompleteResponse { expected, received });
        }
    }

    Ok(received as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    fn temp_dest(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("podsieve_fetch_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("feed.download")
    }

    fn fast_policy(max_retries: u32) -> FetchPolicy {
        FetchPolicy {
            max_retries,
            retry_backoff: Duration::from_millis(10),
            ..FetchPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_success_writes_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&mock_server)
            .await;

        let dest = temp_dest("success");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());

        let written = fetch_to_file(&client, &url, &dest, &FetchPolicy::default())
            .await
            .unwrap();
        assert_eq!(written, VALID_RSS.len() as u64);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), VALID_RSS);

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_fetch_404_is_fatal() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dest = temp_dest("not_found");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());

        match fetch_to_file(&client, &url, &dest, &fast_policy(3)).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_fetch_500_without_retries_fails_immediately() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dest = temp_dest("no_retry");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());

        match fetch_to_file(&client, &url, &dest, &FetchPolicy::default()).await {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_fetch_500_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // Initial request + 2 retries
            .mount(&mock_server)
            .await;

        let dest = temp_dest("retry_fail");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());

        match fetch_to_file(&client, &url, &dest, &fast_policy(2)).await {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        let mock_server = MockServer::start().await;

        // First two requests return 503, third succeeds
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let dest = temp_dest("retry_success");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());

        let result = fetch_to_file(&client, &url, &dest, &fast_policy(3)).await;
        assert!(result.is_ok(), "Expected success, got {:?}", result);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), VALID_RSS);

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_fetch_429_reports_rate_limited() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&mock_server)
            .await;

        let dest = temp_dest("rate_limited");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());

        match fetch_to_file(&client, &url, &dest, &fast_policy(1)).await {
            Err(FetchError::RateLimited(1)) => {}
            other => panic!("Expected RateLimited(1), got {:?}", other),
        }

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1024)))
            .mount(&mock_server)
            .await;

        let dest = temp_dest("too_large");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let policy = FetchPolicy {
            max_feed_bytes: 100,
            ..FetchPolicy::default()
        };

        match fetch_to_file(&client, &url, &dest, &policy).await {
            Err(FetchError::ResponseTooLarge) => {}
            other => panic!("Expected ResponseTooLarge, got {:?}", other),
        }

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let dest = temp_dest("timeout");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let policy = FetchPolicy {
            timeout: Duration::from_millis(100),
            ..FetchPolicy::default()
        };

        match fetch_to_file(&client, &url, &dest, &policy).await {
            Err(FetchError::Timeout) => {}
            other => panic!("Expected Timeout, got {:?}", other),
        }

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }

    #[test]
    fn test_retry_delay_doubles_then_caps() {
        let base = Duration::from_secs(2);
        assert_eq!(retry_delay(base, 0), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 1), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 4), Duration::from_secs(32));
        assert_eq!(retry_delay(base, 5), MAX_RETRY_DELAY);
        // 2^32 no longer fits in u32
        assert_eq!(retry_delay(base, 32), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(base, u32::MAX), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(Duration::ZERO, 40), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_fetch_many_retries_do_not_overflow_backoff() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .expect(41) // Initial request + 40 retries
            .mount(&mock_server)
            .await;

        let dest = temp_dest("many_retries");
        let client = reqwest::Client::new();
        let url = format!("{}/feed", mock_server.uri());
        let policy = FetchPolicy {
            max_retries: 40,
            retry_backoff: Duration::ZERO,
            ..FetchPolicy::default()
        };

        match fetch_to_file(&client, &url, &dest, &policy).await {
            Err(FetchError::HttpStatus(503)) => {}
            other => panic!("Expected HttpStatus(503), got {:?}", other),
        }

        std::fs::remove_dir_all(dest.parent().unwrap()).ok();
    }
}

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RetryConfig {
    pub timeout_secs: Option<u64>,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl RetryConfig {
    fn max_attempts(self) -> u32 {
        self.retries.saturating_add(1)
    }
}

#[derive(Debug)]
pub(crate) enum RequestFailure {
    Request(reqwest::Error),
    Api { status: StatusCode, body: String },
}

pub(crate) async fn send_chat_request_with_retry<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    payload: &T,
    config: RetryConfig,
) -> Result<reqwest::Response, RequestFailure> {
    let max_attempts = config.max_attempts();
    let mut attempt = 0;

    loop {
        let mut request = client.post(url).bearer_auth(api_key).json(payload);

        if let Some(timeout_secs) = config.timeout_secs {
            request = request.timeout(Duration::from_secs(timeout_secs));
        }

        debug!(url, attempt, "sending chat request");
        match request.send().await {
            Ok(response) => {
                if response.status().is_success() {
                    return Ok(response);
                }

                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if is_retryable_status(status) && attempt + 1 < max_attempts {
                    warn!(%status, attempt, "chat request failed, retrying");
                    sleep(retry_delay(attempt, config.retry_delay_ms)).await;
                    attempt += 1;
                    continue;
                }

                return Err(RequestFailure::Api { status, body });
            }
            Err(source) => {
                if is_retryable_request_error(&source) && attempt + 1 < max_attempts {
                    warn!(error = %source, attempt, "chat request failed, retrying");
                    sleep(retry_delay(attempt, config.retry_delay_ms)).await;
                    attempt += 1;
                    continue;
                }

                return Err(RequestFailure::Request(source));
            }
        }
    }
}

/// Blocking counterpart of [`send_chat_request_with_retry`]. Must not run on an async worker.
pub(crate) fn send_chat_request_blocking<T: Serialize + ?Sized>(
    client: &reqwest::blocking::Client,
    url: &str,
    api_key: &str,
    payload: &T,
    config: RetryConfig,
) -> Result<reqwest::blocking::Response, RequestFailure> {
    let max_attempts = config.max_attempts();
    let mut attempt = 0;

    loop {
        let mut request = client.post(url).bearer_auth(api_key).json(payload);

        if let Some(timeout_secs) = config.timeout_secs {
            request = request.timeout(Duration::from_secs(timeout_secs));
        }

        debug!(url, attempt, "sending blocking chat request");
        let failure = match request.send() {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response.text().unwrap_or_default();
                let retry = is_retryable_status(status);
                (RequestFailure::Api { status, body }, retry)
            }
            Err(source) => {
                let retry = is_retryable_request_error(&source);
                (RequestFailure::Request(source), retry)
            }
        };

        match failure {
            (_, true) if attempt + 1 < max_attempts => {
                warn!(attempt, "blocking chat request failed, retrying");
                std::thread::sleep(retry_delay(attempt, config.retry_delay_ms));
                attempt += 1;
            }
            (failure, _) => return Err(failure),
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_request_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(30_000);
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::{RetryConfig, is_retryable_status, retry_delay};
    use reqwest::StatusCode;
    use std::time::Duration;

    #[test]
    fn retry_delay_doubles_per_attempt() {
        assert_eq!(retry_delay(0, 250), Duration::from_millis(250));
        assert_eq!(retry_delay(1, 250), Duration::from_millis(500));
        assert_eq!(retry_delay(3, 250), Duration::from_millis(2_000));
    }

    #[test]
    fn retry_delay_is_capped() {
        assert_eq!(retry_delay(12, 500), Duration::from_millis(30_000));
        assert_eq!(retry_delay(64, 1), Duration::from_millis(30_000));
    }

    #[test]
    fn only_throttling_and_server_errors_retry() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn default_config_makes_a_single_attempt() {
        assert_eq!(RetryConfig::default().max_attempts(), 1);
        let config = RetryConfig {
            retries: u32::MAX,
            ..RetryConfig::default()
        };
        assert_eq!(config.max_attempts(), u32::MAX);
    }
}

use crate::config::types::ShipperConfig;
use crate::shipper::tailer::Chunk;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("receiver returned error status {status}: {message}")]
    Status { status: u16, message: String },
}

/// Body of a shipper upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadBatch {
    pub log: String,
    pub host: String,
}

/// Final result of a bounded retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success(T),
    Exhausted { attempts: usize, last_error: E },
}

/// Runs `operation` until it succeeds or `max_attempts` calls have failed,
/// sleeping a fixed `wait` between attempts.
pub async fn retry_fixed<F, Fut, T, E>(
    max_attempts: usize,
    wait: Duration,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(e) if attempt >= max_attempts => {
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: e,
                }
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    Exhausted,
}

/// Posts chunks to the ingestor on behalf of one origin.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    url: String,
    origin: String,
    max_attempts: usize,
    retry_wait: Duration,
}

impl DeliveryClient {
    pub fn new(config: &ShipperConfig, origin: String) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.receiver_url.clone(),
            origin,
            max_attempts: config.retry_attempts,
            retry_wait: config.retry_wait,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Sends the whole chunk, retrying the identical payload on any failure.
    pub async fn deliver(&self, chunk: &Chunk) -> DeliveryOutcome {
        if chunk.is_empty() {
            return DeliveryOutcome::Success;
        }

        let batch = UploadBatch {
            log: chunk.payload(),
            host: self.origin.clone(),
        };

        let outcome = retry_fixed(self.max_attempts, self.retry_wait, |attempt| {
            let batch = &batch;
            async move {
                tracing::info!(
                    lines = chunk.len(),
                    start_offset = chunk.start_offset,
                    end_offset = chunk.end_offset,
                    attempt,
                    "Sending chunk"
                );
                self.post(batch).await
            }
        })
        .await;

        match outcome {
            RetryOutcome::Success(body) => {
                tracing::info!(
                    lines = chunk.len(),
                    start_offset = chunk.start_offset,
                    end_offset = chunk.end_offset,
                    response = %body.trim(),
                    "Chunk delivered"
                );
                DeliveryOutcome::Success
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::error!(
                    attempts,
                    start_offset = chunk.start_offset,
                    end_offset = chunk.end_offset,
                    error = %last_error,
                    last_line = chunk.last_line().unwrap_or_default(),
                    "Giving up on chunk until next trigger"
                );
                DeliveryOutcome::Exhausted
            }
        }
    }

    async fn post(&self, batch: &UploadBatch) -> Result<String, DeliveryError> {
        let response = self.client.post(&self.url).json(batch).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.text().await?)
    }
}

/// The address the shipper reports as its origin: the configured override,
/// else the first IPv4 address the local hostname resolves to, else the
/// hostname itself.
pub async fn resolve_origin(config: &ShipperConfig) -> String {
    if let Some(origin) = config.origin_address.as_ref().filter(|o| !o.trim().is_empty()) {
        return origin.trim().to_string();
    }

    let name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());

    let lookup = tokio::net::lookup_host((name.as_str(), 0))
        .await
        .map(|addrs| addrs.collect::<Vec<_>>());
    match lookup {
        Ok(addrs) => addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .map(|a| a.ip().to_string())
            .unwrap_or(name),
        Err(e) => {
            tracing::warn!(hostname = %name, error = %e, "Could not resolve hostname, using it as origin");
            name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicUsize::new(0);
        let outcome: RetryOutcome<&str, String> =
            retry_fixed(5, Duration::from_secs(6), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("refused #{attempt}"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert!(matches!(outcome, RetryOutcome::Success("ok")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_at_cap() {
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let outcome: RetryOutcome<(), String> =
            retry_fixed(4, Duration::from_secs(6), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("refused #{attempt}")) }
            })
            .await;

        match outcome {
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "refused #4");
            }
            RetryOutcome::Success(_) => panic!("expected exhaustion"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Three waits between four attempts, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(18));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicUsize::new(0);
        let _: RetryOutcome<(), &str> = retry_fixed(0, Duration::ZERO, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("no") }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_origin_override() {
        let config = ShipperConfig {
            origin_address: Some(" 10.1.2.3 ".to_string()),
            ..ShipperConfig::default()
        };
        assert_eq!(resolve_origin(&config).await, "10.1.2.3");
    }

    #[tokio::test]
    async fn test_origin_falls_back_to_local_host() {
        let config = ShipperConfig {
            origin_address: Some("  ".to_string()),
            ..ShipperConfig::default()
        };
        assert!(!resolve_origin(&config).await.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_delivery_against_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ShipperConfig {
            receiver_url: format!("http://{addr}/upload"),
            retry_attempts: 2,
            retry_wait: Duration::from_millis(10),
            request_timeout: Duration::from_secs(2),
            ..ShipperConfig::default()
        };
        let client = DeliveryClient::new(&config, "10.0.0.1".to_string()).unwrap();
        let chunk = Chunk {
            lines: vec!["x".to_string()],
            start_offset: 0,
            end_offset: 2,
        };

        assert_eq!(client.deliver(&chunk).await, DeliveryOutcome::Exhausted);
    }

    #[test]
    fn test_upload_batch_wire_shape() {
        let batch = UploadBatch {
            log: "a\nb".to_string(),
            host: "1.2.3.4".to_string(),
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json, serde_json::json!({"log": "a\nb", "host": "1.2.3.4"}));
    }
}

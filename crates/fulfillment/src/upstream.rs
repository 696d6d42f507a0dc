//! Timing and error classification for calls to third-party services.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;

use crate::error::{FulfillmentError, Result};

/// Runs an upstream call under `limit`, recording its duration.
///
/// A call that does not finish in time is reported as unavailable.
pub(crate) async fn call<T, F>(
    service: &'static str,
    operation: &'static str,
    limit: Duration,
    request: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let result = match tokio::time::timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(FulfillmentError::unavailable(
            service,
            format!("{operation} timed out after {}ms", limit.as_millis()),
        )),
    };

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) if e.is_retryable() => "unavailable",
        Err(_) => "error",
    };
    metrics::histogram!(
        "upstream_call_duration_seconds",
        "service" => service,
        "operation" => operation,
        "outcome" => outcome
    )
    .record(started.elapsed().as_secs_f64());

    if let Err(e) = &result {
        tracing::warn!(service, operation, error = %e, "upstream call failed");
    }
    result
}

/// Maps a transport failure (connect, timeout, TLS) to a retryable error.
pub(crate) fn transport_error(service: &'static str, err: reqwest::Error) -> FulfillmentError {
    FulfillmentError::unavailable(service, err)
}

/// Reads a JSON body, classifying non-success statuses.
///
/// 5xx and 429 are retryable; any other failure status is a rejection.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| FulfillmentError::rejected(service, format!("malformed response: {e}")));
    }

    let body = response.text().await.unwrap_or_default();
    let reason = format!("{status}: {}", truncate(&body, 200));
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Err(FulfillmentError::unavailable(service, reason))
    } else {
        Err(FulfillmentError::rejected(service, reason))
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

//! Shared plumbing for the `reqwest`-based bindings.

use crate::error::UpstreamError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Builds an HTTP client whose individual requests are bounded by `timeout`.
pub fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(client)
}

/// Sends a request and classifies the outcome, returning the successful response.
pub(crate) async fn send(
    service: &'static str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|e| UpstreamError::from_reqwest(service, e, timeout.as_secs()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(service, %status, "Upstream returned an error status");
        return Err(UpstreamError::from_status(service, status, &body));
    }
    Ok(response)
}

/// Sends a request and decodes its JSON body into `T`.
///
/// A body that does not match `T` is reported as a protocol error.
pub(crate) async fn send_json<T: DeserializeOwned>(
    service: &'static str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, UpstreamError> {
    let response = send(service, request, timeout).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| UpstreamError::from_reqwest(service, e, timeout.as_secs()))?;
    serde_json::from_slice(&body).map_err(|e| UpstreamError::protocol(service, e.to_string()))
}

/// Like [`send_json`], but a `404 Not Found` yields `Ok(None)`.
pub(crate) async fn send_json_or_missing<T: DeserializeOwned>(
    service: &'static str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<Option<T>, UpstreamError> {
    match send_json(service, request, timeout).await {
        Ok(value) => Ok(Some(value)),
        Err(UpstreamError::Unavailable {
            status: Some(reqwest::StatusCode::NOT_FOUND),
            ..
        }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Bounds a whole multi-request operation by `timeout`.
pub(crate) async fn with_deadline<T>(
    service: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T, UpstreamError>>,
) -> Result<T, UpstreamError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| UpstreamError::Timeout {
            service,
            seconds: timeout.as_secs(),
        })?
}

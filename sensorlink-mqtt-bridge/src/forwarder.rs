//! HTTP delivery of readings to the ingestion API.

use std::error::Error as _;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer};
use sensorlink_common::{JSON_CONTENT_TYPE, Reading, encode_json};
use tracing::{debug, info, warn};

use crate::error::ForwardError;

/// Longest response excerpt quoted in errors and logs, in characters.
pub const MAX_BODY_SNIPPET: usize = 256;

/// Most response bytes read; anything beyond is discarded unread.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Body of a `200`/`201` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_id: String,
    #[serde(default)]
    pub threshold_exceeded: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub automation: Automation,
}

/// Automation summary attached to an accepted reading.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    #[serde(default)]
    pub rules_checked: i64,
    #[serde(default)]
    pub rules_triggered: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub zones_created: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct WarningBody {
    #[serde(default)]
    warning: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// Stored by the API (`200`/`201`). `None` if the body was unreadable.
    Accepted(Option<Acceptance>),
    /// Provisionally accepted with a warning (`202`).
    Warned { warning: String },
    /// Permanently refused (`400` or any status outside the contract).
    Rejected { status: u16, reason: String },
    /// The request did not complete.
    TransportFailed { cause: String },
}

impl ForwardOutcome {
    /// Split into the non-error outcomes and the errors the caller must handle.
    pub fn into_result(self) -> Result<ForwardOutcome, ForwardError> {
        match self {
            ForwardOutcome::Rejected { status, reason } => {
                Err(ForwardError::Rejected { status, reason })
            }
            ForwardOutcome::TransportFailed { cause } => Err(ForwardError::Transport { cause }),
            outcome => Ok(outcome),
        }
    }

    /// Whether the API took the reading (possibly with a warning).
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            ForwardOutcome::Accepted(_) | ForwardOutcome::Warned { .. }
        )
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardOutcome::Accepted(_) => "accepted",
            ForwardOutcome::Warned { .. } => "warned",
            ForwardOutcome::Rejected { .. } => "rejected",
            ForwardOutcome::TransportFailed { .. } => "transport_failed",
        }
    }
}

/// Map an API response to an outcome.
///
/// This is the only place status codes are interpreted. The API contract
/// defines `200`/`201`, `202` and `400`; everything else is a rejection.
pub fn classify(status: StatusCode, body: &[u8]) -> ForwardOutcome {
    match status.as_u16() {
        200 | 201 => match serde_json::from_slice::<Acceptance>(body) {
            Ok(acceptance) => ForwardOutcome::Accepted(Some(acceptance)),
            Err(e) => {
                // Delivery succeeded; only the summary is lost.
                warn!(
                    status = status.as_u16(),
                    error = %e,
                    body = %body_snippet(body),
                    "Failed to parse success response"
                );
                ForwardOutcome::Accepted(None)
            }
        },
        202 => {
            let warning = serde_json::from_slice::<WarningBody>(body)
                .map(|b| b.warning)
                .ok()
                .filter(|w| !w.is_empty())
                .unwrap_or_else(|| body_snippet(body));
            ForwardOutcome::Warned { warning }
        }
        400 => {
            let reason = serde_json::from_slice::<ErrorBody>(body)
                .map(|b| b.error)
                .ok()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| body_snippet(body));
            ForwardOutcome::Rejected { status: 400, reason }
        }
        code => ForwardOutcome::Rejected {
            status: code,
            reason: format!("unexpected status {}: {}", code, body_snippet(body)),
        },
    }
}

/// Lossy UTF-8 excerpt of a response body, trimmed to [`MAX_BODY_SNIPPET`] characters.
pub fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() <= MAX_BODY_SNIPPET {
        return text.to_string();
    }
    let mut snippet: String = text.chars().take(MAX_BODY_SNIPPET).collect();
    snippet.push_str("...");
    snippet
}

/// Sends readings to the ingestion endpoint.
///
/// Holds no per-call state; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ForwardingClient {
    endpoint: Url,
    timeout: Duration,
    http: reqwest::Client,
}

impl ForwardingClient {
    /// Create a client for `endpoint` whose requests give up after `timeout`.
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid API endpoint '{}': {}", endpoint, e))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("API endpoint must use http or https, got '{}'", endpoint);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            endpoint,
            timeout,
            http,
        })
    }

    /// Endpoint readings are POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Deliver one reading and classify the response. Never retries.
    pub async fn send(&self, reading: &Reading) -> ForwardOutcome {
        debug!(
            endpoint = %self.endpoint,
            sensor_id = %reading.sensor_id(),
            value = reading.value(),
            "Sending request to API"
        );

        let body = match encode_json(reading) {
            Ok(body) => body,
            Err(e) => {
                return ForwardOutcome::TransportFailed {
                    cause: format!("failed to encode request: {}", e),
                };
            }
        };

        let response = match self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return ForwardOutcome::TransportFailed {
                    cause: self.describe(&e),
                };
            }
        };

        let status = response.status();
        let body = match read_capped(response, MAX_RESPONSE_BYTES).await {
            Ok(body) => body,
            Err(e) => {
                return ForwardOutcome::TransportFailed {
                    cause: format!("failed to read response: {}", self.describe(&e)),
                };
            }
        };

        let outcome = classify(status, &body);
        log_outcome(reading, &outcome);
        outcome
    }

    fn describe(&self, error: &reqwest::Error) -> String {
        if error.is_timeout() {
            return format!("request timed out after {:?}", self.timeout);
        }

        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// Read at most `limit` bytes of the response body.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> reqwest::Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Log a delivered reading. Failures are left to the caller.
fn log_outcome(reading: &Reading, outcome: &ForwardOutcome) {
    match outcome {
        // Already reported by `classify`.
        ForwardOutcome::Accepted(None) => {}
        ForwardOutcome::Accepted(Some(acceptance)) => {
            info!(
                sensor_id = %reading.sensor_id(),
                data_id = %acceptance.data_id,
                threshold_exceeded = acceptance.threshold_exceeded,
                rules_checked = acceptance.automation.rules_checked,
                rules_triggered = acceptance.automation.rules_triggered,
                zones_created = acceptance.automation.zones_created.len(),
                "Sensor data processed successfully"
            );

            if acceptance.threshold_exceeded {
                warn!(
                    sensor_id = %reading.sensor_id(),
                    zones_created = ?acceptance.automation.zones_created,
                    "Threshold exceeded - automation triggered"
                );
            }
        }
        ForwardOutcome::Warned { warning } => {
            warn!(sensor_id = %reading.sensor_id(), warning = %warning, "API warning");
        }
        ForwardOutcome::Rejected { .. } | ForwardOutcome::TransportFailed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_created() {
        let body = br#"{"success":true,"dataId":"abc","thresholdExceeded":true,
            "automation":{"rulesChecked":3,"rulesTriggered":1,"zonesCreated":["zone-A"],"message":"ok"}}"#;

        let outcome = classify(StatusCode::CREATED, body);
        let ForwardOutcome::Accepted(Some(acceptance)) = outcome else {
            panic!("expected accepted outcome");
        };

        assert!(acceptance.success);
        assert_eq!(acceptance.data_id, "abc");
        assert!(acceptance.threshold_exceeded);
        assert_eq!(acceptance.automation.rules_checked, 3);
        assert_eq!(acceptance.automation.rules_triggered, 1);
        assert_eq!(acceptance.automation.zones_created, vec!["zone-A"]);
        assert_eq!(acceptance.automation.message, "ok");
    }

    #[test]
    fn test_classify_ok_with_nulls() {
        let body = br#"{"success":true,"dataId":"x","automation":{"zonesCreated":null}}"#;
        let outcome = classify(StatusCode::OK, body);
        let ForwardOutcome::Accepted(Some(acceptance)) = outcome else {
            panic!("expected accepted outcome");
        };
        assert!(acceptance.automation.zones_created.is_empty());
    }

    #[test]
    fn test_classify_unparseable_success_is_still_accepted() {
        let outcome = classify(StatusCode::CREATED, b"<html>created</html>");
        assert_eq!(outcome, ForwardOutcome::Accepted(None));
        assert!(outcome.is_delivered());
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_classify_accepted_with_warning() {
        let outcome = classify(StatusCode::ACCEPTED, br#"{"warning":"sensor not calibrated"}"#);
        assert_eq!(
            outcome,
            ForwardOutcome::Warned {
                warning: "sensor not calibrated".to_string()
            }
        );
        assert!(outcome.is_delivered());
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_classify_accepted_unparseable_warning() {
        let outcome = classify(StatusCode::ACCEPTED, b"queued");
        assert_eq!(
            outcome,
            ForwardOutcome::Warned {
                warning: "queued".to_string()
            }
        );
    }

    #[test]
    fn test_classify_bad_request() {
        let outcome = classify(StatusCode::BAD_REQUEST, br#"{"error":"bad value"}"#);
        assert_eq!(
            outcome,
            ForwardOutcome::Rejected {
                status: 400,
                reason: "bad value".to_string()
            }
        );

        let err = outcome.into_result().unwrap_err();
        assert!(err.to_string().contains("bad value"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_bad_request_raw_body() {
        let outcome = classify(StatusCode::BAD_REQUEST, b"value out of range");
        assert_eq!(
            outcome,
            ForwardOutcome::Rejected {
                status: 400,
                reason: "value out of range".to_string()
            }
        );
    }

    #[test]
    fn test_classify_unexpected_status() {
        let outcome = classify(StatusCode::INTERNAL_SERVER_ERROR, b"database down");
        assert_eq!(
            outcome,
            ForwardOutcome::Rejected {
                status: 500,
                reason: "unexpected status 500: database down".to_string()
            }
        );
        assert_eq!(outcome.kind(), "rejected");
    }

    #[test]
    fn test_classify_other_success_codes_are_unexpected() {
        let outcome = classify(StatusCode::NO_CONTENT, b"");
        assert!(matches!(outcome, ForwardOutcome::Rejected { status: 204, .. }));
    }

    #[test]
    fn test_transport_failure_into_result() {
        let outcome = ForwardOutcome::TransportFailed {
            cause: "connection refused".to_string(),
        };
        assert!(!outcome.is_delivered());
        let err = outcome.into_result().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_body_snippet_truncates() {
        let body = "x".repeat(1000);
        let snippet = body_snippet(body.as_bytes());
        assert_eq!(snippet.chars().count(), MAX_BODY_SNIPPET + 3);
        assert!(snippet.ends_with("..."));

        assert_eq!(body_snippet(b"  short \n"), "short");
        assert_eq!(body_snippet(&[0xff, b'a']), "\u{fffd}a");
    }

    fn response(status: u16, body: Vec<u8>) -> reqwest::Response {
        axum::http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn test_read_capped_stops_at_limit() {
        let body = read_capped(response(500, vec![b'x'; 1 << 20]), 1024)
            .await
            .unwrap();
        assert_eq!(body.len(), 1024);

        let body = read_capped(response(201, b"{}".to_vec()), MAX_RESPONSE_BYTES)
            .await
            .unwrap();
        assert_eq!(body, b"{}");
    }

    #[test]
    fn test_client_rejects_bad_endpoint() {
        assert!(ForwardingClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(ForwardingClient::new("ftp://host/data", Duration::from_secs(1)).is_err());

        let client =
            ForwardingClient::new("http://localhost:3000/api/sensor-data", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.endpoint().path(), "/api/sensor-data");
    }
}

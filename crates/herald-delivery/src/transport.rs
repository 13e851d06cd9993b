//! The delivery transport boundary and its HTTP implementation.
//!
//! Every attempt resolves to either success or a classified
//! [`AttemptError`]; the classification is what drives retry decisions one
//! layer up.

use std::{fmt, future::Future, time::Duration};

use herald_core::notification::ClaimedWork;
use serde::Deserialize;

use crate::{Error, Result};

/// Header carrying the occurrence id so the receiving endpoint can
/// deduplicate redelivery.
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// Per-request timeout. A hung endpoint costs one attempt, not a worker.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Attempt classification ──────────────────────────────────────────────────

/// A failed delivery attempt, classified by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
  /// Connection-level failure before a response arrived.
  Network(String),
  /// The request timed out.
  Timeout,
  /// 5xx from the endpoint.
  ServerError(u16),
  /// 4xx from the endpoint. The request itself is at fault, so retrying
  /// the same bytes cannot succeed.
  ClientError(u16),
  /// 2xx whose body could not be parsed as an acknowledgement.
  MalformedAck(String),
  /// Well-formed acknowledgement that explicitly reports failure.
  Refused(String),
}

impl AttemptError {
  /// Whether a retry of the identical request could plausibly succeed.
  pub fn is_transient(&self) -> bool {
    !matches!(self, Self::ClientError(_) | Self::Refused(_))
  }

  /// Classify a non-2xx response status.
  pub fn from_status(code: u16) -> Self {
    if (400..500).contains(&code) {
      Self::ClientError(code)
    } else {
      Self::ServerError(code)
    }
  }
}

impl fmt::Display for AttemptError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Network(detail) => write!(f, "network error: {detail}"),
      Self::Timeout => write!(f, "request timed out"),
      Self::ServerError(code) => write!(f, "endpoint returned {code}"),
      Self::ClientError(code) => write!(f, "endpoint rejected request: {code}"),
      Self::MalformedAck(detail) => write!(f, "unparsable ack: {detail}"),
      Self::Refused(reason) => write!(f, "endpoint refused: {reason}"),
    }
  }
}

// ─── Acknowledgement ─────────────────────────────────────────────────────────

/// JSON acknowledgement body expected on a 2xx response.
///
/// `success` defaults to `true`, so an empty object acknowledges the
/// delivery; an empty or non-JSON body does not.
#[derive(Debug, Deserialize)]
pub struct DeliveryAck {
  #[serde(default = "default_true")]
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
}

fn default_true() -> bool { true }

// ─── Transport trait ─────────────────────────────────────────────────────────

/// A channel capable of one delivery attempt.
pub trait Transport: Send + Sync {
  fn deliver(
    &self,
    work: &ClaimedWork,
  ) -> impl Future<Output = Result<(), AttemptError>> + Send + '_;
}

// ─── HTTP transport ──────────────────────────────────────────────────────────

/// POSTs claimed work to a single JSON endpoint.
pub struct HttpTransport {
  client:   reqwest::Client,
  endpoint: reqwest::Url,
}

impl HttpTransport {
  pub fn new(endpoint: &str) -> Result<Self> {
    let endpoint = reqwest::Url::parse(endpoint)
      .map_err(|e| Error::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()?;
    Ok(Self { client, endpoint })
  }
}

impl Transport for HttpTransport {
  // The body is the stored payload verbatim; delivery context (occurrence
  // id) travels in the idempotency header, not the body.
  fn deliver(
    &self,
    work: &ClaimedWork,
  ) -> impl Future<Output = Result<(), AttemptError>> + Send + '_ {
    let request = self
      .client
      .post(self.endpoint.clone())
      .header(IDEMPOTENCY_HEADER, work.idempotency_key.to_string())
      .json(&work.payload);

    async move {
      let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
          AttemptError::Timeout
        } else {
          AttemptError::Network(e.to_string())
        }
      })?;

      let status = response.status();
      if !status.is_success() {
        return Err(AttemptError::from_status(status.as_u16()));
      }

      let bytes = response
        .bytes()
        .await
        .map_err(|e| AttemptError::Network(e.to_string()))?;
      let ack: DeliveryAck = serde_json::from_slice(&bytes)
        .map_err(|e| AttemptError::MalformedAck(e.to_string()))?;

      if ack.success {
        Ok(())
      } else {
        Err(AttemptError::Refused(
          ack.message.unwrap_or_else(|| "no reason given".to_owned()),
        ))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use herald_core::notification::DeliveryPayload;
  use uuid::Uuid;

  use super::*;

  #[test]
  fn wire_body_is_the_stored_payload_verbatim() {
    let payload = DeliveryPayload {
      subject_id: Uuid::parse_str("5e6bafc2-8701-4f89-9f9d-0f1c30c4d2aa")
        .unwrap(),
      message:    "Hey, Alice Liddell it's your birthday".into(),
    };

    // No wrapper object around the payload.
    assert_eq!(
      serde_json::to_value(&payload).unwrap(),
      serde_json::json!({
        "subject_id": "5e6bafc2-8701-4f89-9f9d-0f1c30c4d2aa",
        "message": "Hey, Alice Liddell it's your birthday",
      }),
    );
  }

  #[test]
  fn status_classification_splits_on_fault() {
    assert_eq!(AttemptError::from_status(404), AttemptError::ClientError(404));
    assert_eq!(AttemptError::from_status(422), AttemptError::ClientError(422));
    assert_eq!(AttemptError::from_status(500), AttemptError::ServerError(500));
    assert_eq!(AttemptError::from_status(503), AttemptError::ServerError(503));
  }

  #[test]
  fn transience_follows_classification() {
    assert!(AttemptError::Network("reset".into()).is_transient());
    assert!(AttemptError::Timeout.is_transient());
    assert!(AttemptError::ServerError(502).is_transient());
    assert!(AttemptError::MalformedAck("eof".into()).is_transient());
    assert!(!AttemptError::ClientError(400).is_transient());
    assert!(!AttemptError::Refused("nope".into()).is_transient());
  }

  #[test]
  fn empty_object_ack_is_a_success() {
    let ack: DeliveryAck = serde_json::from_str("{}").unwrap();
    assert!(ack.success);
    assert!(ack.message.is_none());
  }

  #[test]
  fn explicit_refusal_is_parsed() {
    let ack: DeliveryAck =
      serde_json::from_str(r#"{"success":false,"message":"unknown subject"}"#)
        .unwrap();
    assert!(!ack.success);
    assert_eq!(ack.message.as_deref(), Some("unknown subject"));
  }

  #[test]
  fn empty_body_is_not_an_ack() {
    assert!(serde_json::from_str::<DeliveryAck>("").is_err());
  }
}

//! Error types for `herald-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::notification::NotificationStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("notification not found: {0}")]
  NotificationNotFound(Uuid),

  #[error("subject not found: {0}")]
  SubjectNotFound(Uuid),

  #[error("illegal transition: {from:?} -> {to:?}")]
  IllegalTransition {
    from: NotificationStatus,
    to:   NotificationStatus,
  },

  #[error("version conflict on notification {id}: expected {expected}")]
  VersionConflict { id: Uuid, expected: i64 },

  #[error("unsupported notification kind: {0:?}")]
  UnsupportedKind(String),

  #[error("unknown IANA timezone: {0:?}")]
  UnknownTimezone(String),

  #[error("validation error: {0}")]
  Validation(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

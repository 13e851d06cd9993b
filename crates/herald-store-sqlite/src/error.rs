//! Error type for `herald-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] herald_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("notification not found: {0}")]
  NotificationNotFound(uuid::Uuid),

  /// The row's stored version no longer matches the caller's expectation;
  /// some other writer got there first.
  #[error("version conflict on notification {id}: expected {expected}")]
  VersionConflict { id: uuid::Uuid, expected: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

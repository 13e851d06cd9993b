//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! UTC timestamps are stored as RFC 3339 strings at second precision with a
//! `Z` suffix, which keeps lexicographic and chronological order identical —
//! the claim query compares `target_utc` as TEXT. Local date-times and dates
//! are stored without offsets. Payloads are compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use herald_core::{
  notification::{
    DeliveryPayload, Notification, NotificationKind, NotificationStatus,
  },
  subject::SubjectSnapshot,
  timezone,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_local(dt: NaiveDateTime) -> String {
  dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn decode_local(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Timezone ────────────────────────────────────────────────────────────────

pub fn encode_zone(tz: Tz) -> &'static str { tz.name() }

pub fn decode_zone(s: &str) -> Result<Tz> { Ok(timezone::parse_zone(s)?) }

// ─── Status ──────────────────────────────────────────────────────────────────

pub fn encode_status(s: NotificationStatus) -> &'static str {
  match s {
    NotificationStatus::Pending => "pending",
    NotificationStatus::Processing => "processing",
    NotificationStatus::Completed => "completed",
    NotificationStatus::Failed => "failed",
  }
}

pub fn decode_status(s: &str) -> Result<NotificationStatus> {
  match s {
    "pending" => Ok(NotificationStatus::Pending),
    "processing" => Ok(NotificationStatus::Processing),
    "completed" => Ok(NotificationStatus::Completed),
    "failed" => Ok(NotificationStatus::Failed),
    other => Err(Error::DateParse(format!("unknown status: {other:?}"))),
  }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

pub fn encode_payload(p: &DeliveryPayload) -> Result<String> {
  Ok(serde_json::to_string(p)?)
}

pub fn decode_payload(s: &str) -> Result<DeliveryPayload> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list shared by every query that reads full notification rows,
/// including the claim statement's RETURNING clause. Order matches
/// [`read_notification_row`].
pub const NOTIFICATION_COLUMNS: &str = "id, subject_id, kind, status, \
   target_utc, target_local, timezone, payload, version, retry_count, \
   last_failure, executed_at, created_at, updated_at";

/// Raw strings read directly from a `notifications` row.
pub struct RawNotification {
  pub id:           String,
  pub subject_id:   String,
  pub kind:         String,
  pub status:       String,
  pub target_utc:   String,
  pub target_local: String,
  pub timezone:     String,
  pub payload:      String,
  pub version:      i64,
  pub retry_count:  i64,
  pub last_failure: Option<String>,
  pub executed_at:  Option<String>,
  pub created_at:   String,
  pub updated_at:   String,
}

/// Read one row produced by a [`NOTIFICATION_COLUMNS`] select.
pub fn read_notification_row(
  row: &rusqlite::Row<'_>,
) -> rusqlite::Result<RawNotification> {
  Ok(RawNotification {
    id:           row.get(0)?,
    subject_id:   row.get(1)?,
    kind:         row.get(2)?,
    status:       row.get(3)?,
    target_utc:   row.get(4)?,
    target_local: row.get(5)?,
    timezone:     row.get(6)?,
    payload:      row.get(7)?,
    version:      row.get(8)?,
    retry_count:  row.get(9)?,
    last_failure: row.get(10)?,
    executed_at:  row.get(11)?,
    created_at:   row.get(12)?,
    updated_at:   row.get(13)?,
  })
}

impl RawNotification {
  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      id:           decode_uuid(&self.id)?,
      subject_id:   decode_uuid(&self.subject_id)?,
      kind:         NotificationKind::parse(&self.kind)
        .map_err(Error::Core)?,
      status:       decode_status(&self.status)?,
      target_utc:   decode_dt(&self.target_utc)?,
      target_local: decode_local(&self.target_local)?,
      timezone:     decode_zone(&self.timezone)?,
      payload:      decode_payload(&self.payload)?,
      version:      self.version,
      retry_count:  self.retry_count as u32,
      last_failure: self.last_failure,
      executed_at:  self.executed_at.as_deref().map(decode_dt).transpose()?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id: String,
  pub first_name: String,
  pub last_name:  String,
  pub anchor:     String,
  pub timezone:   String,
  pub updated_at: String,
}

impl RawSubject {
  pub fn into_snapshot(self) -> Result<SubjectSnapshot> {
    Ok(SubjectSnapshot {
      subject_id: decode_uuid(&self.subject_id)?,
      first_name: self.first_name,
      last_name:  self.last_name,
      anchor:     decode_date(&self.anchor)?,
      timezone:   decode_zone(&self.timezone)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

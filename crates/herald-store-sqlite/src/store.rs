//! [`SqliteStore`] — the SQLite implementation of [`NotificationStore`].

use std::{future::Future, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use herald_core::{
  notification::Notification, store::NotificationStore,
  subject::SubjectSnapshot,
};

use crate::{
  Error, Result,
  encode::{
    NOTIFICATION_COLUMNS, RawNotification, RawSubject, encode_date, encode_dt,
    encode_local, encode_payload, encode_status, encode_uuid, encode_zone,
    read_notification_row,
  },
  schema::SCHEMA,
};

/// Outcome of a conditional write, resolved inside the connection call so
/// the existence probe shares the write's consistency point.
enum WriteOutcome {
  Applied,
  VersionMismatch,
  Missing,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Herald notification store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All writes
/// funnel through SQLite's single writer, which is what makes
/// [`claim_ready`](NotificationStore::claim_ready) atomic without any
/// application-level locking.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a query producing full notification rows and decode them.
  async fn query_notifications(
    &self,
    sql:    String,
    params: Vec<String>,
  ) -> Result<Vec<Notification>> {
    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            read_notification_row(row)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawNotification::into_notification)
      .collect()
  }
}

// ─── NotificationStore impl ──────────────────────────────────────────────────

impl NotificationStore for SqliteStore {
  type Error = Error;

  // ── Subject snapshots ─────────────────────────────────────────────────────

  fn upsert_subject(
    &self,
    snapshot: &SubjectSnapshot,
  ) -> impl Future<Output = Result<()>> + Send + '_ {
    let id_str       = encode_uuid(snapshot.subject_id);
    let first_name   = snapshot.first_name.clone();
    let last_name    = snapshot.last_name.clone();
    let anchor_str   = encode_date(snapshot.anchor);
    let zone_str     = encode_zone(snapshot.timezone).to_owned();
    let updated_str  = encode_dt(snapshot.updated_at);

    async move {
      self
        .conn
        .call(move |conn| {
        conn.execute(
          "INSERT INTO subjects
             (subject_id, first_name, last_name, anchor, timezone, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(subject_id) DO UPDATE SET
             first_name = excluded.first_name,
             last_name  = excluded.last_name,
             anchor     = excluded.anchor,
             timezone   = excluded.timezone,
             updated_at = excluded.updated_at",
          rusqlite::params![
              id_str, first_name, last_name, anchor_str, zone_str, updated_str,
            ],
          )?;
          Ok(())
        })
        .await?;
      Ok(())
    }
  }

  async fn get_subject(&self, subject_id: Uuid) -> Result<Option<SubjectSnapshot>> {
    let id_str = encode_uuid(subject_id);

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT subject_id, first_name, last_name, anchor, timezone, updated_at
             FROM subjects WHERE subject_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawSubject {
                subject_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name:  row.get(2)?,
                anchor:     row.get(3)?,
                timezone:   row.get(4)?,
                updated_at: row.get(5)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubject::into_snapshot).transpose()
  }

  async fn list_subjects(&self) -> Result<Vec<SubjectSnapshot>> {
    let raws: Vec<RawSubject> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT subject_id, first_name, last_name, anchor, timezone, updated_at
           FROM subjects",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawSubject {
              subject_id: row.get(0)?,
              first_name: row.get(1)?,
              last_name:  row.get(2)?,
              anchor:     row.get(3)?,
              timezone:   row.get(4)?,
              updated_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_snapshot).collect()
  }

  async fn delete_subject(&self, subject_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(subject_id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM subjects WHERE subject_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  fn create(
    &self,
    notification: &Notification,
  ) -> impl Future<Output = Result<bool>> + Send + '_ {
    let id_str         = encode_uuid(notification.id);
    let subject_id_str = encode_uuid(notification.subject_id);
    let kind_str       = notification.kind.as_str().to_owned();
    let status_str     = encode_status(notification.status).to_owned();
    let target_utc_str = encode_dt(notification.target_utc);
    let target_loc_str = encode_local(notification.target_local);
    let zone_str       = encode_zone(notification.timezone).to_owned();
    let payload_res    = encode_payload(&notification.payload);
    let year           = notification.occurrence_year() as i64;
    let version        = notification.version;
    let retry_count    = notification.retry_count as i64;
    let last_failure   = notification.last_failure.clone();
    let executed_str   = notification.executed_at.map(encode_dt);
    let created_str    = encode_dt(notification.created_at);
    let updated_str    = encode_dt(notification.updated_at);

    async move {
      let payload_str = payload_res?;
      // OR IGNORE swallows both the primary-key conflict (same occurrence
      // re-derived) and the open-cycle unique index (another open occurrence
      // for the same subject/kind/year). Either way the insert is a no-op
      // and the caller learns it via the row count.
      let inserted = self
        .conn
        .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO notifications (
             id, subject_id, kind, status, target_utc, target_local,
             timezone, payload, occurrence_year, version, retry_count,
             last_failure, executed_at, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
          rusqlite::params![
            id_str,
            subject_id_str,
            kind_str,
            status_str,
            target_utc_str,
            target_loc_str,
            zone_str,
            payload_str,
            year,
            version,
            retry_count,
            last_failure,
            executed_str,
              created_str,
              updated_str,
            ],
          )?)
        })
        .await?;
      Ok(inserted > 0)
    }
  }

  async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
    let mut rows = self
      .query_notifications(
        format!(
          "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"
        ),
        vec![encode_uuid(id)],
      )
      .await?;
    Ok(rows.pop())
  }

  async fn find_by_subject(&self, subject_id: Uuid) -> Result<Vec<Notification>> {
    self
      .query_notifications(
        format!(
          "SELECT {NOTIFICATION_COLUMNS} FROM notifications
           WHERE subject_id = ?1 ORDER BY target_utc"
        ),
        vec![encode_uuid(subject_id)],
      )
      .await
  }

  fn update(
    &self,
    notification:     &Notification,
    expected_version: i64,
  ) -> impl Future<Output = Result<()>> + Send + '_ {
    let id = notification.id;
    let id_str         = encode_uuid(id);
    let status_str     = encode_status(notification.status).to_owned();
    let target_utc_str = encode_dt(notification.target_utc);
    let target_loc_str = encode_local(notification.target_local);
    let zone_str       = encode_zone(notification.timezone).to_owned();
    let payload_res    = encode_payload(&notification.payload);
    let year           = notification.occurrence_year() as i64;
    let version        = notification.version;
    let retry_count    = notification.retry_count as i64;
    let last_failure   = notification.last_failure.clone();
    let executed_str   = notification.executed_at.map(encode_dt);
    let updated_str    = encode_dt(notification.updated_at);

    async move {
      let payload_str = payload_res?;
      let outcome = self
        .conn
        .call(move |conn| {
          let changed = conn.execute(
          "UPDATE notifications SET
             status = ?1, target_utc = ?2, target_local = ?3, timezone = ?4,
             payload = ?5, occurrence_year = ?6, version = ?7,
             retry_count = ?8, last_failure = ?9, executed_at = ?10,
             updated_at = ?11
           WHERE id = ?12 AND version = ?13",
          rusqlite::params![
            status_str,
            target_utc_str,
            target_loc_str,
            zone_str,
            payload_str,
            year,
            version,
            retry_count,
            last_failure,
            executed_str,
            updated_str,
            id_str,
            expected_version,
          ],
        )?;
        if changed > 0 {
          return Ok(WriteOutcome::Applied);
        }

        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM notifications WHERE id = ?1",
            rusqlite::params![id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok(if exists {
          WriteOutcome::VersionMismatch
        } else {
          WriteOutcome::Missing
        })
        })
        .await?;

      match outcome {
        WriteOutcome::Applied => Ok(()),
        WriteOutcome::VersionMismatch => {
          Err(Error::VersionConflict { id, expected: expected_version })
        }
        WriteOutcome::Missing => Err(Error::NotificationNotFound(id)),
      }
    }
  }

  async fn delete_by_subject(&self, subject_id: Uuid) -> Result<u64> {
    let id_str = encode_uuid(subject_id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM notifications WHERE subject_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(removed as u64)
  }

  // ── Claim & recovery ──────────────────────────────────────────────────────

  async fn claim_ready(
    &self,
    now:   DateTime<Utc>,
    limit: u32,
  ) -> Result<Vec<Notification>> {
    let now_str     = encode_dt(now);
    let claimed_str = encode_dt(Utc::now());

    // One statement: select-lock-transition under SQLite's single writer.
    // Two racing claimers serialize on the write lock, and the loser's
    // subquery re-evaluates against rows already moved to 'processing',
    // so batches are always disjoint.
    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "UPDATE notifications
             SET status = 'processing', version = version + 1, updated_at = ?2
           WHERE id IN (
             SELECT id FROM notifications
             WHERE status = 'pending' AND target_utc <= ?1
             ORDER BY target_utc
             LIMIT ?3
           )
           RETURNING {NOTIFICATION_COLUMNS}"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![now_str, claimed_str, limit as i64],
            |row| read_notification_row(row),
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut claimed: Vec<Notification> = raws
      .into_iter()
      .map(RawNotification::into_notification)
      .collect::<Result<_>>()?;
    claimed.sort_by_key(|n| n.target_utc);
    Ok(claimed)
  }

  async fn find_overdue(
    &self,
    now:   DateTime<Utc>,
    limit: u32,
  ) -> Result<Vec<Notification>> {
    self
      .query_notifications(
        format!(
          "SELECT {NOTIFICATION_COLUMNS} FROM notifications
           WHERE status = 'pending' AND target_utc <= ?1
           ORDER BY target_utc
           LIMIT {limit}"
        ),
        vec![encode_dt(now)],
      )
      .await
  }

  async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff_str = encode_dt(cutoff);
    let now_str    = encode_dt(Utc::now());

    let requeued = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE notifications
             SET status = 'pending', version = version + 1, updated_at = ?2
           WHERE status = 'processing' AND updated_at < ?1",
          rusqlite::params![cutoff_str, now_str],
        )?)
      })
      .await?;
    Ok(requeued as u64)
  }
}

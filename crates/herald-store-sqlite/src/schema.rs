//! SQL schema for the Herald SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Event-fed read model of the subject bounded context. Holds only what
-- scheduling needs.
CREATE TABLE IF NOT EXISTS subjects (
    subject_id  TEXT PRIMARY KEY,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    anchor      TEXT NOT NULL,   -- ISO 8601 date
    timezone    TEXT NOT NULL,   -- IANA zone name
    updated_at  TEXT NOT NULL
);

-- No foreign key to subjects: events can replay out of order, and a
-- claimed notification must outlive its subject's deletion.
CREATE TABLE IF NOT EXISTS notifications (
    id              TEXT PRIMARY KEY,
    subject_id      TEXT NOT NULL,
    kind            TEXT NOT NULL,    -- 'birthday'
    status          TEXT NOT NULL,    -- 'pending' | 'processing' | 'completed' | 'failed'
    target_utc      TEXT NOT NULL,    -- RFC 3339 UTC, second precision, 'Z' suffix
    target_local    TEXT NOT NULL,    -- wall-clock intent, no offset
    timezone        TEXT NOT NULL,
    payload         TEXT NOT NULL,    -- compact JSON DeliveryPayload
    occurrence_year INTEGER NOT NULL, -- year of target_local
    version         INTEGER NOT NULL,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    last_failure    TEXT,
    executed_at     TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- At most one open occurrence per (subject, kind, cycle year). Terminal
-- rows stay behind as history and do not participate.
CREATE UNIQUE INDEX IF NOT EXISTS notifications_open_cycle_idx
    ON notifications(subject_id, kind, occurrence_year)
    WHERE status IN ('pending', 'processing');

CREATE INDEX IF NOT EXISTS notifications_due_idx
    ON notifications(status, target_utc);
CREATE INDEX IF NOT EXISTS notifications_subject_idx
    ON notifications(subject_id);

PRAGMA user_version = 1;
";

//! Pure wall-clock ↔ UTC conversion, DST-correct.
//!
//! Policy for the two awkward cases a zone transition creates:
//! - an *ambiguous* local time (fall-back overlap) resolves to the earlier
//!   offset;
//! - a *nonexistent* local time (spring-forward gap) is shifted forward
//!   until it lands on a valid local time, preserving ordering across the
//!   transition.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

/// Parse an IANA zone name (e.g. `America/New_York`).
pub fn parse_zone(name: &str) -> Result<Tz> {
  name
    .parse::<Tz>()
    .map_err(|_| Error::UnknownTimezone(name.to_owned()))
}

/// The UTC instant denoted by `local` wall-clock time in `tz`.
pub fn to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
  match tz.from_local_datetime(&local) {
    LocalResult::Single(t) => t.with_timezone(&Utc),
    LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
    LocalResult::None => {
      // Inside a gap. Shift forward one hour at a time (gaps are one hour
      // in every current zone) until the wall clock is valid again, so
      // 02:30 on a spring-forward day becomes 03:30. Bounded at 48 hours
      // so a pathological tz database cannot spin us.
      let mut candidate = local;
      for _ in 0..48 {
        candidate += Duration::hours(1);
        match tz.from_local_datetime(&candidate) {
          LocalResult::Single(t) => return t.with_timezone(&Utc),
          LocalResult::Ambiguous(earlier, _) => {
            return earlier.with_timezone(&Utc);
          }
          LocalResult::None => continue,
        }
      }
      Utc.from_utc_datetime(&local)
    }
  }
}

/// The wall-clock time at which `instant` occurs in `tz`.
pub fn to_local(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
  instant.with_timezone(&tz).naive_local()
}

//! Worker configuration, deserialised from `config.toml` and `HERALD_*`
//! environment variables.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  /// Path to the SQLite database file.
  pub store_path: PathBuf,

  /// Delivery endpoint receiving notification POSTs.
  pub endpoint_url: String,

  /// Seconds between delivery polls.
  #[serde(default = "default_poll_interval")]
  pub poll_interval_secs: u64,

  /// Maximum notifications claimed per poll.
  #[serde(default = "default_batch_size")]
  pub batch_size: u32,

  /// Seconds a claim may sit untouched in `processing` before the sweep
  /// returns it to `pending`.
  #[serde(default = "default_stale_after")]
  pub stale_after_secs: u64,

  /// Seconds between stale-claim sweeps.
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_secs: u64,
}

fn default_poll_interval() -> u64 { 60 }
fn default_batch_size() -> u32 { 25 }
fn default_stale_after() -> u64 { 600 }
fn default_sweep_interval() -> u64 { 60 }

impl WorkerConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs)
  }

  pub fn stale_after(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.stale_after_secs as i64)
  }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.sweep_interval_secs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_fill_optional_fields() {
    let cfg: WorkerConfig = config::Config::builder()
      .add_source(config::File::from_str(
        "store_path = \"herald.db\"\nendpoint_url = \"http://localhost:9000/notify\"",
        config::FileFormat::Toml,
      ))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    assert_eq!(cfg.poll_interval_secs, 60);
    assert_eq!(cfg.batch_size, 25);
    assert_eq!(cfg.stale_after_secs, 600);
    assert_eq!(cfg.sweep_interval_secs, 60);
  }
}

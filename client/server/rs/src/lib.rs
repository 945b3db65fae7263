pub mod config;
pub mod entities;

/// Current wall-clock time in milliseconds, the unit every timestamp field
/// in [entities] is stored in.
pub fn timestamp_ms() -> i64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .expect("system time before unix epoch")
    .as_millis() as i64
}

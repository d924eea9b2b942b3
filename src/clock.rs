//! Wall-clock epoch time shared by the handshake (skew computation) and the
//! worker runtime (job timestamps), so both read the same clock the same
//! way.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock as fractional epoch seconds. Read once per run.
pub fn now_epoch_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

//! Time helpers

use chrono::{DateTime, Utc};

/// Current time in UTC
pub fn current_time() -> DateTime<Utc> {
    Utc::now()
}

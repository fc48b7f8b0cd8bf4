//! Transaction reference generation

use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Produces merchant-side transaction references (`tx_ref`)
pub struct ReferenceGenerator;

impl ReferenceGenerator {
    /// Generate a reference.
    ///
    /// With `override_with_prefix` the prefix is returned as-is and the caller
    /// owns its uniqueness. Otherwise the result is `{prefix}_{token}` where the
    /// token combines the current time in microseconds with a process-wide
    /// sequence number.
    pub fn generate(prefix: &str, override_with_prefix: bool) -> String {
        if override_with_prefix {
            return prefix.to_string();
        }

        let micros = Utc::now().timestamp_micros();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        format!("{}_{:x}{:05x}", prefix, micros, seq & 0xF_FFFF)
    }
}

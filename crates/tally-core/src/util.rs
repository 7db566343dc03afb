//! Small shared helpers

use chrono::Utc;

/// Current wall-clock time as unix milliseconds.
///
/// All timestamps in the sync core are unix ms; clamping at zero keeps the
/// conversion total for pre-epoch clocks.
pub(crate) fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

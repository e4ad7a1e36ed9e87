/// Job identifiers are assigned sequentially by the queue, starting at 1.
pub type JobId = i64;

/// Wall-clock time in milliseconds since the Unix epoch.
///
/// Signed so that window arithmetic (`now - WINDOW_MS`) never underflows.
pub type EpochMillis = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

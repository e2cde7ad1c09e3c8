//! Remote staging paths for deployed scripts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use camino::Utf8Path;

/// Remote directory that receives staged scripts.
pub const STAGING_DIR: &str = "/tmp";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Returns a fresh remote path for `script`.
///
/// The path combines the script's base name, the current time in
/// milliseconds and a process-wide sequence number, so two calls never
/// collide even within the same millisecond. Characters outside
/// `[A-Za-z0-9._-]` in the base name are replaced with `_`.
#[must_use]
pub fn staging_path(script: &Utf8Path) -> String {
    let base: String = script
        .file_name()
        .unwrap_or("script")
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{STAGING_DIR}/{base}-{millis}-{sequence}")
}

// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Small shared utilities: object identifiers, timestamps, base64 helpers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Global monotonically-increasing object ID counter.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a globally unique numeric identifier for frames and processors.
pub fn obj_id() -> u64 {
    OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Generate a formatted timestamp string in the format "SECONDS.MILLISZ".
pub fn now_timestamp() -> String {
    let duration = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}Z", duration.as_secs(), duration.subsec_millis())
}

/// Generate a unique ID string with a prefix.
///
/// A monotonic counter combined with a timestamp produces collision-resistant
/// IDs without requiring the `uuid` crate.
pub fn generate_unique_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{}-{}", prefix, ts, count)
}

/// Encode bytes to base64 using the standard alphabet.
pub fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode a base64 string to bytes using the standard alphabet.
///
/// Returns `None` if the input is not valid base64.
pub fn decode_base64(data: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}

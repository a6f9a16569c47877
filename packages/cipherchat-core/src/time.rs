//! Wall-clock timestamps for messages and derived keys.
//!
//! Native builds read `chrono::Utc::now()`; the browser build reads
//! `js_sys::Date::now()` because `std::time::SystemTime` panics on
//! `wasm32-unknown-unknown`.

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    #[cfg(target_arch = "wasm32")]
    {
        js_sys::Date::now() as i64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_reasonable() {
        let ts = now_millis();
        // After 2024-01-01, before 2100-01-01
        assert!(ts > 1_704_067_200_000, "Timestamp {} is too old", ts);
        assert!(ts < 4_102_444_800_000, "Timestamp {} is too far in future", ts);
    }

    #[test]
    fn test_now_millis_is_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
    }
}

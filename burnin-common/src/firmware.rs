//! Debug firmware marker
//!
//! Units flashed with the debug build report firmware `1.11.11`. Their runs are
//! bench noise and never reach the store or any report.

/// Firmware version that marks debug data
pub const DEBUG_FIRMWARE: &str = "1.11.11";

/// SQL predicate excluding debug firmware, for a `tests` table aliased as `t`
pub const EXCLUDE_DEBUG_SQL: &str = "TRIM(COALESCE(t.firmware_version, '')) <> '1.11.11'";

/// True when the (possibly padded) firmware string is the debug build
pub fn is_debug_firmware(version: &str) -> bool {
    version.trim() == DEBUG_FIRMWARE
}

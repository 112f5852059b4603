//! SQLite helper utilities for type conversion
//!
//! SQLite doesn't natively support UUIDs, booleans or timestamps.
//! This module provides utilities to convert between Rust types and SQLite-compatible formats.

use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

// ============================================================================
// Identifier Helpers
// ============================================================================

/// Generate a new primary key.
///
/// UUID v7 keys are time-ordered, so the primary key tie-breaker appended to
/// every ordering also follows insertion order.
#[inline]
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

// ============================================================================
// Timestamp Helpers (stored as ISO8601 TEXT in SQLite)
// ============================================================================

/// Get current UTC timestamp, truncated to the stored precision
#[inline]
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    str_to_datetime(&datetime_to_str(now)).unwrap_or(now)
}

/// Convert a chrono DateTime to a fixed-width ISO8601 string.
///
/// Fixed width (microseconds, `Z` suffix) keeps lexical and chronological
/// order identical, which range filters and ORDER BY rely on.
#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an ISO8601 string to DateTime
#[inline]
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Try parsing SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

// ============================================================================
// Boolean Helpers (SQLite uses 0/1 integers)
// ============================================================================

/// Convert bool to SQLite integer (0 or 1)
#[inline]
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

/// Convert SQLite integer to bool
#[inline]
pub fn int_to_bool(i: i64) -> bool {
    i != 0
}

// ============================================================================
// Query Building Helpers
// ============================================================================

/// Build a `?, ?, ?` placeholder list for an IN clause
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Build an IN condition, falling back to an always-false predicate for an
/// empty list (`x IN ()` is a syntax error in SQLite).
pub fn in_list_sql(expr: &str, count: usize) -> String {
    if count == 0 {
        return "1=0".to_string();
    }
    format!("{} IN ({})", expr, placeholders(count))
}

//! Custom serde deserializers for the security tracker feed.
//!
//! The feed is generated from hand-edited data and leaves fields `null` or
//! out entirely where a value is unknown.

use serde::{Deserialize, Deserializer};

pub const UNKNOWN: &str = "Unknown";

/// Default for text fields the feed may omit.
pub fn unknown() -> String {
    UNKNOWN.to_string()
}

/// Deserializes an optional string, mapping `null` to `"Unknown"`.
///
/// # Examples
/// ```text
/// Input:  "remote"  ->  "remote"
/// Input:  null      ->  "Unknown"
/// ```
pub fn unknown_if_null<'a, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'a>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown))
}

/// Deserializes an optional string, treating an empty string like `null`.
pub fn empty_as_none<'a, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'a>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

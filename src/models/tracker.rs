use super::serde_helpers::{empty_as_none, unknown, unknown_if_null};
use indexmap::IndexMap;
use serde::Deserialize;

pub const RESOLVED: &str = "resolved";

/// `package -> CVE id -> entry`, in feed order.
pub type TrackerFeed = IndexMap<String, IndexMap<String, CveEntry>>;

#[derive(Debug, Clone, Deserialize)]
pub struct CveEntry {
    #[serde(default = "unknown", deserialize_with = "unknown_if_null")]
    pub scope: String,
    #[serde(default = "unknown", deserialize_with = "unknown_if_null")]
    pub description: String,
    #[serde(default)]
    pub releases: IndexMap<String, ReleaseStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseStatus {
    pub status: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub fixed_version: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
}

impl ReleaseStatus {
    /// Version the CVE was fixed in, if this release has resolved it.
    pub fn resolved_in(&self) -> Option<&str> {
        if self.status == RESOLVED {
            self.fixed_version.as_deref()
        } else {
            None
        }
    }
}

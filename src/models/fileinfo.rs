use serde::{Deserialize, Serialize};

use indexmap::IndexMap;

/// The `srcfiles?fileinfo=1` document from snapshot.debian.org.
///
/// `fileinfo` maps a content hash to every upload record seen for that hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub fileinfo: IndexMap<String, Vec<FileRecord>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileInfo {
    /// Hash whose authoritative (last) record carries `name`.
    pub fn hash_for(&self, name: &str) -> Option<&str> {
        self.fileinfo
            .iter()
            .find(|(_, records)| records.last().is_some_and(|r| r.name == name))
            .map(|(hash, _)| hash.as_str())
    }
}

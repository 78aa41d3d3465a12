use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One report from the Debian bug tracker.
///
/// `date` is naive UTC, as the tracker reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugRecord {
    pub bug_number: u64,
    pub date: NaiveDateTime,
    pub subject: String,
}

impl BugRecord {
    pub fn url(&self) -> String {
        format!(
            "https://bugs.debian.org/cgi-bin/bugreport.cgi?bug={}",
            self.bug_number
        )
    }
}

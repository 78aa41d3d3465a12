//! Runtime configuration shared by every stage of a comparison run.

use std::{path::PathBuf, time::Duration};

/// Public archive of every historical Debian source package
pub const SNAPSHOT_URL: &str = "http://snapshot.debian.org";

/// Debian security tracker, serving both the JSON feed and per-CVE pages
pub const TRACKER_URL: &str = "https://security-tracker.debian.org";

/// Debbugs SOAP endpoint
pub const BTS_URL: &str = "https://bugs.debian.org/cgi-bin/soap.cgi";

pub const DEBDIFF_PATH: &str = "/usr/bin/debdiff";

pub const WORKING_DIR: &str = "/var/tmp/debcompare";

#[derive(Debug, Clone)]
pub struct Config {
    pub snapshot_url: String,
    pub tracker_url: String,
    pub bts_url: String,
    pub debdiff: PathBuf,
    pub working_dir: PathBuf,
    /// Connect and response-head timeout of HTTP requests; bodies may stream longer
    pub http_timeout: Duration,
    /// Timeout applied to the debdiff invocation
    pub tool_timeout: Duration,
    /// Invalidate every cached file touched by the run before using it
    pub force: bool,
    /// Query only bugs tagged `security`, including archived ones
    pub security_bugs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_url: SNAPSHOT_URL.to_string(),
            tracker_url: TRACKER_URL.to_string(),
            bts_url: BTS_URL.to_string(),
            debdiff: PathBuf::from(DEBDIFF_PATH),
            working_dir: PathBuf::from(WORKING_DIR),
            http_timeout: Duration::from_secs(10),
            tool_timeout: Duration::from_secs(300),
            force: false,
            security_bugs: false,
        }
    }
}

impl Config {
    /// URL of the security tracker JSON feed
    pub fn tracker_feed_url(&self) -> String {
        format!("{}/tracker/data/json", self.tracker_url.trim_end_matches('/'))
    }
}

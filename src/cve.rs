//! Index of CVEs fixed per package version, built from the Debian security
//! tracker feed.

use crate::cache::ArtifactCache;
use crate::errors::{DebcompareError, Result};
use crate::models::tracker::{CveEntry, TrackerFeed};
use crate::network::Fetcher;
use async_lock::RwLock;
use regex::Regex;
use std::{
    collections::HashMap,
    sync::{Arc, LazyLock, OnceLock},
};

/// Cache file for the security tracker feed
pub const FEED_CACHE_NAME: &str = "cve.json";

static CVE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CVE-\d{4}-\d+$").expect("Invalid regex pattern"));

static NOTES_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h2>\s*Notes\s*</h2>(.*?)(?:<h2|$)").expect("Invalid regex pattern")
});

static ANCHOR_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<a\s[^>]*href="([^"]*)""#).expect("Invalid regex pattern"));

/// Fails with `InvalidCveIdentifier` unless `id` looks like `CVE-<year>-<id>`.
pub fn check_cve_id(id: &str) -> Result<()> {
    if CVE_ID.is_match(id) {
        Ok(())
    } else {
        Err(DebcompareError::InvalidCveIdentifier(id.to_string()))
    }
}

/// Source of the free-text reference links attached to a CVE.
pub trait NoteScraper: Send + Sync {
    fn notes(&self, cve_id: &str) -> Result<Vec<String>>;
}

/// Scrapes the "Notes" section of `{tracker}/tracker/{CVE-id}`.
pub struct TrackerScraper {
    fetcher: Arc<dyn Fetcher>,
    tracker_url: String,
}

impl TrackerScraper {
    pub fn new(fetcher: Arc<dyn Fetcher>, tracker_url: &str) -> Self {
        TrackerScraper {
            fetcher,
            tracker_url: tracker_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Link targets under the "Notes" heading of a tracker page.
pub fn parse_notes(html: &str) -> Vec<String> {
    let Some(section) = NOTES_SECTION.captures(html) else {
        return Vec::new();
    };
    ANCHOR_HREF
        .captures_iter(&section[1])
        .map(|caps| caps[1].replace("&amp;", "&"))
        .collect()
}

impl NoteScraper for TrackerScraper {
    fn notes(&self, cve_id: &str) -> Result<Vec<String>> {
        check_cve_id(cve_id)?;
        let url = format!("{}/tracker/{}", self.tracker_url, cve_id);
        let response = self.fetcher.get(&url)?;
        if !response.is_success() {
            return Err(DebcompareError::DownloadFailed {
                url,
                reason: format!("HTTP status {}", response.status),
            });
        }
        Ok(parse_notes(&response.text()))
    }
}

#[derive(Debug)]
pub struct CveRecord {
    pub id: String,
    pub scope: String,
    pub description: String,
    notes: OnceLock<Vec<String>>,
}

impl CveRecord {
    pub fn new(id: &str, entry: &CveEntry) -> Self {
        CveRecord {
            id: id.to_string(),
            scope: entry.scope.clone(),
            description: entry.description.clone(),
            notes: OnceLock::new(),
        }
    }

    /// Reference links for this CVE, scraped on first call and kept.
    pub fn notes(&self, scraper: &dyn NoteScraper) -> Result<&[String]> {
        if let Some(notes) = self.notes.get() {
            return Ok(notes);
        }
        check_cve_id(&self.id)?;
        let notes = scraper.notes(&self.id)?;
        Ok(self.notes.get_or_init(|| notes))
    }

    pub fn tracker_url(&self) -> String {
        format!("https://security-tracker.debian.org/tracker/{}", self.id)
    }
}

/// `package -> fixed version -> CVEs`, buckets in feed order.
type PackageIndex = HashMap<String, HashMap<String, Vec<Arc<CveRecord>>>>;

/// CVEs resolved per package and fixed version.
///
/// `load` builds a complete new index before swapping it in, so concurrent
/// readers see either the old or the new index, never a mix.
#[derive(Default)]
pub struct CveIndex {
    packages: RwLock<Arc<PackageIndex>>,
}

fn build_index(feed: &TrackerFeed) -> PackageIndex {
    let mut packages = PackageIndex::new();
    for (package, cves) in feed {
        let buckets = packages.entry(package.clone()).or_default();
        for (cve_id, entry) in cves {
            let record = Arc::new(CveRecord::new(cve_id, entry));
            for release in entry.releases.values() {
                let Some(fixed_version) = release.resolved_in() else {
                    continue;
                };
                buckets
                    .entry(fixed_version.to_string())
                    .or_default()
                    .push(Arc::clone(&record));
            }
        }
    }
    packages
}

impl CveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_feed(feed: &TrackerFeed) -> Self {
        let index = Self::new();
        index.load(feed);
        index
    }

    /// Rebuilds the whole index from `feed`.
    pub fn load(&self, feed: &TrackerFeed) {
        let packages = Arc::new(build_index(feed));
        log::debug!("CVE index loaded for {} packages", packages.len());
        *self.packages.write_blocking() = packages;
    }

    pub fn load_json(&self, json: &[u8]) -> Result<()> {
        self.load(&parse_feed(json)?);
        Ok(())
    }

    /// CVEs fixed when `package` moved to exactly `version`, in feed order.
    pub fn get(&self, package: &str, version: &str) -> Vec<Arc<CveRecord>> {
        let packages = Arc::clone(&self.packages.read_blocking());
        packages
            .get(package)
            .and_then(|buckets| buckets.get(version))
            .cloned()
            .unwrap_or_default()
    }

    pub fn package_count(&self) -> usize {
        self.packages.read_blocking().len()
    }
}

/// Returns the raw security tracker feed, downloading it into the cache
/// when missing or when `force` is set.
pub fn fetch_feed(
    cache: &ArtifactCache,
    fetcher: &dyn Fetcher,
    feed_url: &str,
    force: bool,
) -> Result<Vec<u8>> {
    if force {
        cache.invalidate(FEED_CACHE_NAME)?;
    }
    if let Some(bytes) = cache.read(FEED_CACHE_NAME)? {
        log::debug!("Using cached security tracker feed");
        return Ok(bytes);
    }
    let path = cache.download(fetcher, feed_url, FEED_CACHE_NAME)?;
    std::fs::read(&path).map_err(|e| DebcompareError::io(&path, e))
}

/// Parses the tracker feed, keeping packages and CVEs in feed order.
pub fn parse_feed(json: &[u8]) -> Result<TrackerFeed> {
    Ok(serde_json::from_slice(json)?)
}

//! Security-focused comparison of two Debian source package versions.
//!
//! A comparison correlates three sources into one report:
//! - the debdiff between the two source packages from snapshot.debian.org
//! - bugs filed since the old release's changelog date
//! - CVEs the security tracker lists as fixed in the new version

pub mod bugs;
pub mod cache;
pub mod config;
pub mod cve;
pub mod diff;
pub mod errors;
pub mod models;
pub mod network;
pub mod parser;
pub mod report;
pub mod snapshot;
pub mod ui;
pub mod version;

use bugs::DebbugsClient;
use cache::ArtifactCache;
use config::Config;
use cve::{CveIndex, TrackerScraper};
use diff::Debdiff;
use errors::Result;
use network::HttpFetcher;
use report::{Collaborators, ComparisonReport, ComparisonRequest};
use std::{io::Write, sync::Arc};
use ui::cli::OutputFormat;

/// Runs one comparison against the live Debian services and writes the
/// report to `out`.
pub fn run(
    config: &Config,
    request: &ComparisonRequest,
    format: OutputFormat,
    color: bool,
    out: &mut dyn Write,
) -> Result<()> {
    // a bad version must fail before anything is downloaded
    let (old_version, new_version) = version::infer_endpoints(
        request.old_version.as_deref(),
        request.new_version.as_deref(),
    )?;
    let request = ComparisonRequest {
        package: request.package.clone(),
        old_version: Some(old_version),
        new_version: Some(new_version),
    };

    let fetcher = Arc::new(HttpFetcher::new(config.http_timeout));
    let cache = ArtifactCache::new(&config.working_dir)?;

    let feed = cve::fetch_feed(&cache, fetcher.as_ref(), &config.tracker_feed_url(), config.force)?;
    let cve_index = CveIndex::new();
    cve_index.load_json(&feed)?;

    let services = Collaborators {
        fetcher: fetcher.clone(),
        bug_tracker: Arc::new(DebbugsClient::new(fetcher.clone(), &config.bts_url)),
        diff_tool: Arc::new(Debdiff::new(
            &config.debdiff,
            config.tool_timeout,
            &config.working_dir,
        )),
    };
    let report = ComparisonReport::build(config, &request, &cve_index, &services)?;

    let scraper = TrackerScraper::new(fetcher, &config.tracker_url);
    ui::output::write_report(out, &report, &scraper, format, color)
}

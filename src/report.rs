//! Correlates the diff, bug reports and fixed CVEs of one package update.

use crate::bugs::{BugQuery, BugTracker, load_bugs};
use crate::cache::ArtifactCache;
use crate::config::Config;
use crate::cve::{CveIndex, CveRecord};
use crate::diff::{DiffLine, DiffOutcome, DiffTool, cached_diff};
use crate::errors::Result;
use crate::models::bug::BugRecord;
use crate::network::Fetcher;
use crate::snapshot::{PackageSnapshot, SnapshotContext};
use crate::version::infer_endpoints;
use futures_lite::future;
use std::sync::Arc;

/// What the caller asked to compare. Either version may be left out and is
/// then inferred from the other.
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub package: String,
    pub old_version: Option<String>,
    pub new_version: Option<String>,
}

/// External services a comparison depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub bug_tracker: Arc<dyn BugTracker>,
    pub diff_tool: Arc<dyn DiffTool>,
}

pub struct ComparisonReport {
    pub package: String,
    pub old: PackageSnapshot,
    pub new: PackageSnapshot,
    pub diff: DiffOutcome,
    pub fixed_cves: Vec<Arc<CveRecord>>,
}

impl ComparisonReport {
    /// Builds the report, failing on the first fatal error.
    ///
    /// Versions are resolved before any network activity. Both snapshots are
    /// prepared concurrently; either failing aborts the report.
    pub fn build(
        config: &Config,
        request: &ComparisonRequest,
        cve_index: &CveIndex,
        services: &Collaborators,
    ) -> Result<Self> {
        let (old_version, new_version) = infer_endpoints(
            request.old_version.as_deref(),
            request.new_version.as_deref(),
        )?;
        let package = request.package.clone();
        log::info!("Comparing {}: {} -> {}", package, old_version, new_version);

        let cache = ArtifactCache::new(&config.working_dir)?;
        let query = BugQuery::new(&package, config.security_bugs);
        let bugs: Arc<[BugRecord]> =
            load_bugs(&cache, services.bug_tracker.as_ref(), &query, config.force)?.into();

        let ctx = SnapshotContext {
            cache: cache.clone(),
            fetcher: Arc::clone(&services.fetcher),
            snapshot_url: config.snapshot_url.clone(),
            force: config.force,
        };
        let (old, new) = smol::block_on(build_snapshots(
            ctx,
            &package,
            (old_version.as_str(), new_version.as_str()),
            bugs,
        ));
        let (old, new) = (old?, new?);

        let diff = cached_diff(
            &cache,
            services.diff_tool.as_ref(),
            &package,
            (old_version.as_str(), old.dsc_path.as_path()),
            (new_version.as_str(), new.dsc_path.as_path()),
            config.force,
        )?;

        let fixed_cves = cve_index.get(&package, &new_version);
        log::info!("{} CVEs fixed in {}", fixed_cves.len(), new_version);

        Ok(ComparisonReport {
            package,
            old,
            new,
            diff,
            fixed_cves,
        })
    }

    pub fn old_version(&self) -> &str {
        &self.old.version
    }

    pub fn new_version(&self) -> &str {
        &self.new.version
    }

    pub fn diff_lines(&self) -> Vec<DiffLine> {
        self.diff.lines()
    }

    /// Bugs filed since the old release's changelog date, by bug number.
    /// `None` when that date could not be determined.
    pub fn new_bugs(&self) -> Option<Vec<&BugRecord>> {
        let mut bugs: Vec<&BugRecord> = self.old.new_bugs()?.iter().collect();
        bugs.sort_by_key(|bug| bug.bug_number);
        Some(bugs)
    }
}

async fn build_snapshots(
    ctx: SnapshotContext,
    package: &str,
    (old_version, new_version): (&str, &str),
    bugs: Arc<[BugRecord]>,
) -> (Result<PackageSnapshot>, Result<PackageSnapshot>) {
    // the cache clones share fetch locks, so a common orig tarball is fetched once
    let task = |version: &str| {
        let (ctx, bugs) = (ctx.clone(), Arc::clone(&bugs));
        let (package, version) = (package.to_string(), version.to_string());
        smol::unblock(move || PackageSnapshot::build(&package, &version, bugs, &ctx))
    };
    future::zip(task(old_version), task(new_version)).await
}

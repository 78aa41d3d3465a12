//! Source package snapshots fetched from snapshot.debian.org.
//!
//! A [`PackageSnapshot`] is one (package, version) pair with every artifact
//! listed in its `.dsc` present in the working directory. Construction
//! fetches or validates all of them up front and fails on the first error.

use crate::cache::ArtifactCache;
use crate::errors::{DebcompareError, Result};
use crate::models::bug::BugRecord;
use crate::models::fileinfo::FileInfo;
use crate::network::Fetcher;
use crate::parser::{ChangelogEntry, changelog_from_diff, parse_dsc_files};
use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};
use xz2::read::XzDecoder;

/// Download URL of the artifact called `name`.
///
/// snapshot.debian.org indexes files by content hash, so the name is matched
/// against the last record of every hash.
pub fn resolve_url(snapshot_url: &str, fileinfo: &FileInfo, name: &str) -> Result<String> {
    match fileinfo.hash_for(name) {
        Some(hash) => Ok(format!("{}/file/{}", snapshot_url.trim_end_matches('/'), hash)),
        None => {
            log::error!("unable to find url for {}", name);
            Err(DebcompareError::MissingDownloadUrl(name.to_string()))
        }
    }
}

/// What a snapshot needs to resolve and cache its artifacts.
#[derive(Clone)]
pub struct SnapshotContext {
    pub cache: ArtifactCache,
    pub fetcher: Arc<dyn Fetcher>,
    pub snapshot_url: String,
    pub force: bool,
}

impl SnapshotContext {
    fn fileinfo_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/mr/package/{}/{}/srcfiles?fileinfo=1",
            self.snapshot_url.trim_end_matches('/'),
            name,
            version
        )
    }

    /// Loads the fileinfo document for `full_name`, from cache when allowed.
    fn fileinfo(&self, name: &str, version: &str, full_name: &str) -> Result<FileInfo> {
        let cache_name = format!("{}.info", full_name);
        if let Some(fileinfo) = self.cache.load_document(&cache_name, self.force)? {
            log::debug!("Using cached fileinfo: {}", cache_name);
            return Ok(fileinfo);
        }

        let url = self.fileinfo_url(name, version);
        let response = self.fetcher.get(&url)?;
        if !response.is_success() {
            log::error!("unable to get snapshot fileinfo for {}", full_name);
            return Err(DebcompareError::MissingFileinfo {
                full_name: full_name.to_string(),
                url,
                status: response.status,
            });
        }
        let fileinfo: FileInfo = serde_json::from_slice(&response.body)?;
        self.cache.store_document(&cache_name, &fileinfo)?;
        Ok(fileinfo)
    }
}

pub struct PackageSnapshot {
    pub name: String,
    pub version: String,
    /// `version` without its epoch, as used in file names
    pub simple_version: String,
    /// `name_simpleVersion`
    pub full_name: String,
    pub fileinfo: FileInfo,
    pub dsc_path: PathBuf,
    additional_files: Vec<String>,
    working_dir: PathBuf,
    bugs: Arc<[BugRecord]>,
    changelog: OnceLock<Option<ChangelogEntry>>,
    new_bugs: OnceLock<Option<Vec<BugRecord>>>,
}

impl PackageSnapshot {
    /// Resolves and caches every artifact of `name` at `version`.
    ///
    /// `bugs` is the package's bug list, shared between the snapshots of one
    /// comparison.
    pub fn build(
        name: &str,
        version: &str,
        bugs: Arc<[BugRecord]>,
        ctx: &SnapshotContext,
    ) -> Result<Self> {
        let simple_version = match version.split_once(':') {
            Some((_, rest)) => rest.to_string(),
            None => version.to_string(),
        };
        let full_name = format!("{}_{}", name, simple_version);
        log::info!("Preparing snapshot {}", full_name);

        let fileinfo = ctx.fileinfo(name, version, &full_name)?;
        let resolve = |file: &str| resolve_url(&ctx.snapshot_url, &fileinfo, file);

        let dsc_name = format!("{}.dsc", full_name);
        let dsc_path = ctx
            .cache
            .ensure(&[dsc_name], ctx.force, ctx.fetcher.as_ref(), resolve)?
            .remove(0);

        let dsc = std::fs::read_to_string(&dsc_path).map_err(|e| DebcompareError::io(&dsc_path, e))?;
        let additional_files = parse_dsc_files(&dsc);
        ctx.cache
            .ensure(&additional_files, ctx.force, ctx.fetcher.as_ref(), resolve)?;

        Ok(PackageSnapshot {
            name: name.to_string(),
            version: version.to_string(),
            simple_version,
            full_name,
            fileinfo,
            dsc_path,
            additional_files,
            working_dir: ctx.cache.working_dir().to_path_buf(),
            bugs,
            changelog: OnceLock::new(),
            new_bugs: OnceLock::new(),
        })
    }

    /// Artifacts listed in the `.dsc`, in file order.
    pub fn additional_files(&self) -> &[String] {
        &self.additional_files
    }

    /// Top changelog entry, extracted on first use.
    pub fn changelog(&self) -> Option<&ChangelogEntry> {
        self.changelog
            .get_or_init(|| {
                let entry = extract_changelog(&self.working_dir, &self.additional_files)
                    .and_then(|text| ChangelogEntry::parse_top(&text));
                if entry.is_none() {
                    log::warn!(
                        "unable to determine the changelog date of {} from any of: {}",
                        self.full_name,
                        self.additional_files.join(", ")
                    );
                }
                entry
            })
            .as_ref()
    }

    /// Changelog date as naive UTC, `None` when no changelog could be found.
    pub fn changelog_date(&self) -> Option<NaiveDateTime> {
        self.changelog().map(ChangelogEntry::naive_utc_date)
    }

    /// Bugs filed after this snapshot's changelog date, or `None` when the
    /// date is unknown.
    pub fn new_bugs(&self) -> Option<&[BugRecord]> {
        self.new_bugs
            .get_or_init(|| {
                self.changelog_date()
                    .map(|date| bugs_after(&self.bugs, date))
            })
            .as_deref()
    }
}

/// Bugs strictly newer than `date`.
pub fn bugs_after(bugs: &[BugRecord], date: NaiveDateTime) -> Vec<BugRecord> {
    bugs.iter().filter(|bug| bug.date > date).cloned().collect()
}

/// Produces changelog text from a snapshot's artifacts, if it can.
pub type ChangelogStrategy = fn(&Path, &[String]) -> Option<String>;

/// Tried in order; the first strategy returning a changelog wins.
pub const CHANGELOG_STRATEGIES: [ChangelogStrategy; 2] = [from_debian_tarball, from_source_diff];

pub fn extract_changelog(dir: &Path, files: &[String]) -> Option<String> {
    CHANGELOG_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(dir, files))
}

fn open_decompressed(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(path)?);
    let name = path.to_string_lossy();
    if name.ends_with(".gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else if name.ends_with(".xz") {
        Ok(Box::new(XzDecoder::new(file)))
    } else if name.ends_with(".tar") {
        Ok(Box::new(file))
    } else {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported compression for '{}'", name),
        ))
    }
}

/// Reads `debian/changelog` from a `*.debian.tar*` artifact.
pub fn from_debian_tarball(dir: &Path, files: &[String]) -> Option<String> {
    let tarball = files.iter().find(|f| f.contains(".debian.tar"))?;
    let path = dir.join(tarball);

    let read_changelog = || -> io::Result<Option<String>> {
        let mut archive = tar::Archive::new(open_decompressed(&path)?);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let member = entry.path()?;
            if member == Path::new("debian/changelog") || member == Path::new("./debian/changelog")
            {
                let mut changelog = String::new();
                entry.read_to_string(&mut changelog)?;
                return Ok(Some(changelog));
            }
        }
        Ok(None)
    };

    match read_changelog() {
        Ok(changelog) => changelog,
        Err(e) => {
            log::warn!("unable to read changelog from {}: {}", path.display(), e);
            None
        }
    }
}

/// Rebuilds `debian/changelog` from a `*.diff.gz` or `*.diff.xz` artifact.
pub fn from_source_diff(dir: &Path, files: &[String]) -> Option<String> {
    let diff = files
        .iter()
        .find(|f| f.ends_with("diff.gz") || f.ends_with("diff.xz"))?;
    let path = dir.join(diff);

    let mut bytes = Vec::new();
    if let Err(e) = open_decompressed(&path).and_then(|mut r| r.read_to_end(&mut bytes)) {
        log::warn!("unable to read diff {}: {}", path.display(), e);
        return None;
    }
    changelog_from_diff(&String::from_utf8_lossy(&bytes))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Builders for on-disk source package artifacts.

    use flate2::{Compression, write::GzEncoder};
    use std::{io::Write, path::Path};

    pub fn changelog(version: &str, date: &str) -> String {
        format!(
            "foo ({version}) buster-security; urgency=high\n\n  * Security update.\n\n -- Jane Doe <jane@example.org>  {date}\n"
        )
    }

    /// Writes a gzipped tarball holding `debian/changelog`.
    pub fn debian_tarball(path: &Path, changelog: &str) {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut control = tar::Header::new_gnu();
        control.set_size(12);
        control.set_mode(0o644);
        control.set_cksum();
        builder
            .append_data(&mut control, "debian/control", "Source: foo\n".as_bytes())
            .unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_size(changelog.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "debian/changelog", changelog.as_bytes())
            .unwrap();

        let gz = builder.into_inner().unwrap().finish().unwrap();
        std::fs::write(path, gz).unwrap();
    }

    /// Writes a gzipped unified diff adding `debian/changelog`.
    pub fn source_diff(path: &Path, changelog: &str) {
        let mut diff = String::from("--- foo-1.0.orig/debian/changelog\n+++ foo-1.0/debian/changelog\n@@ -0,0 +1 @@\n");
        for line in changelog.lines() {
            diff.push('+');
            diff.push_str(line);
            diff.push('\n');
        }
        diff.push_str("--- foo-1.0.orig/debian/rules\n+++ foo-1.0/debian/rules\n+#!/usr/bin/make -f\n");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(diff.as_bytes()).unwrap();
        std::fs::write(path, encoder.finish().unwrap()).unwrap();
    }
}

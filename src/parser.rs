//! Text parsers for Debian source package metadata.
//!
//! - the `Files:` section of a `.dsc` control file
//! - the top entry of a `debian/changelog`
//! - a `debian/changelog` embedded in a unified diff

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

static CHANGELOG_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+) \(([^)]+)\) ([^;]+);").expect("Invalid regex pattern")
});

static CHANGELOG_TRAILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ -- (.*?)  (.+)$").expect("Invalid regex pattern"));

/// Lists the artifact names in a `.dsc` `Files:` section.
///
/// A line belongs to the section while it is indented and holds exactly three
/// fields (checksum, size, file name); the first other line ends it.
pub fn parse_dsc_files(dsc: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut lines = dsc.lines().skip_while(|line| line.trim_end() != "Files:");
    lines.next();

    for line in lines {
        if !line.starts_with(' ') {
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.len() != 3 {
            break;
        }
        log::debug!("add file: {}", words[2]);
        files.push(words[2].to_string());
    }
    files
}

/// The topmost entry of a Debian changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub package: String,
    pub version: String,
    pub distribution: String,
    pub maintainer: String,
    pub date: DateTime<FixedOffset>,
}

impl ChangelogEntry {
    /// Parses the first entry of `changelog`. Returns `None` if the header or
    /// the ` -- maintainer  date` trailer is missing or the date is malformed.
    pub fn parse_top(changelog: &str) -> Option<Self> {
        let mut lines = changelog.lines().skip_while(|l| l.trim().is_empty());

        let header = lines.next()?;
        let caps = CHANGELOG_HEADER.captures(header)?;
        let (package, version, distribution) = (
            caps[1].to_string(),
            caps[2].to_string(),
            caps[3].trim().to_string(),
        );

        let trailer = lines.find_map(|line| CHANGELOG_TRAILER.captures(line))?;
        let maintainer = trailer[1].to_string();
        let raw_date = trailer[2].trim();
        let date = match DateTime::parse_from_rfc2822(raw_date) {
            Ok(date) => date,
            Err(e) => {
                log::warn!("unable to parse changelog date '{}': {}", raw_date, e);
                return None;
            }
        };

        Some(ChangelogEntry {
            package,
            version,
            distribution,
            maintainer,
            date,
        })
    }

    /// The entry date as naive UTC, comparable with bug tracker timestamps.
    pub fn naive_utc_date(&self) -> NaiveDateTime {
        self.date.naive_utc()
    }
}

/// Rebuilds `debian/changelog` from the hunk of a unified diff that adds it.
///
/// The hunk starts after a `+++ .../debian/changelog` line and runs until
/// the next `---` line or the end of the diff. Hunk headers are skipped and
/// one marker character is stripped from every other line.
pub fn changelog_from_diff(diff: &str) -> Option<String> {
    let mut in_changelog = false;
    let mut content = String::new();

    for line in diff.lines() {
        if !in_changelog {
            if line.starts_with("+++") && line.ends_with("debian/changelog") {
                in_changelog = true;
            }
            continue;
        }
        if line.starts_with("---") {
            break;
        }
        if line.starts_with('@') {
            continue;
        }
        content.push_str(line.get(1..).unwrap_or(""));
        content.push('\n');
    }

    if in_changelog && !content.is_empty() {
        Some(content)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DSC: &str = "\
-----BEGIN PGP SIGNED MESSAGE-----
Hash: SHA256

Format: 3.0 (quilt)
Source: foo
Version: 1.0-1+deb10u1
Checksums-Sha256:
 aaaa 1234 foo_1.0.orig.tar.gz
 bbbb 567 foo_1.0-1+deb10u1.debian.tar.xz
Files:
 1111 1234 foo_1.0.orig.tar.gz
 2222 567 foo_1.0-1+deb10u1.debian.tar.xz
Dgit: deadbeef debian archive/debian/1.0-1+deb10u1

-----BEGIN PGP SIGNATURE-----
";

    const CHANGELOG: &str = "\
foo (1.0-1+deb10u1) buster-security; urgency=high

  * Fix CVE-2020-0001.

 -- Jane Doe <jane@example.org>  Fri, 10 Jan 2020 10:30:00 +0100

foo (1.0-1) unstable; urgency=medium

  * Initial release.

 -- Jane Doe <jane@example.org>  Mon, 06 Jan 2020 09:00:00 +0000
";

    #[test]
    fn dsc_files_section_only() {
        assert_eq!(
            parse_dsc_files(DSC),
            vec!["foo_1.0.orig.tar.gz", "foo_1.0-1+deb10u1.debian.tar.xz"]
        );
    }

    #[test]
    fn dsc_files_stop_at_malformed_line() {
        let dsc = "Files:\n 1 2 a.tar.gz\n 1 2 3 4\n 1 2 b.tar.gz\n";
        assert_eq!(parse_dsc_files(dsc), vec!["a.tar.gz"]);
    }

    #[test]
    fn dsc_without_files_section() {
        assert!(parse_dsc_files("Source: foo\nVersion: 1.0\n").is_empty());
    }

    #[test]
    fn parses_top_changelog_entry() {
        let entry = ChangelogEntry::parse_top(CHANGELOG).unwrap();
        assert_eq!(entry.package, "foo");
        assert_eq!(entry.version, "1.0-1+deb10u1");
        assert_eq!(entry.distribution, "buster-security");
        assert_eq!(entry.maintainer, "Jane Doe <jane@example.org>");
        assert_eq!(entry.date.to_rfc2822(), "Fri, 10 Jan 2020 10:30:00 +0100");
    }

    #[test]
    fn changelog_date_normalizes_to_utc() {
        let entry = ChangelogEntry::parse_top(CHANGELOG).unwrap();
        assert_eq!(
            entry.naive_utc_date().to_string(),
            "2020-01-10 09:30:00"
        );
    }

    #[test]
    fn malformed_changelog_has_no_entry() {
        assert_eq!(ChangelogEntry::parse_top(""), None);
        assert_eq!(ChangelogEntry::parse_top("not a changelog\n"), None);
        assert_eq!(
            ChangelogEntry::parse_top("foo (1.0) unstable; urgency=low\n\n -- A <a@b>  yesterday\n"),
            None
        );
    }

    #[test]
    fn extracts_changelog_hunk_from_diff() {
        let diff = "\
--- foo-1.0.orig/configure
+++ foo-1.0/configure
@@ -1 +1 @@
-old
+new
--- foo-1.0.orig/debian/changelog
+++ foo-1.0/debian/changelog
@@ -0,0 +1,5 @@
+foo (1.0-1) unstable; urgency=low
+
+  * Initial release.
+
+ -- Jane Doe <jane@example.org>  Mon, 06 Jan 2020 09:00:00 +0000
--- foo-1.0.orig/debian/control
+++ foo-1.0/debian/control
@@ -0,0 +1 @@
+Source: foo
";
        let changelog = changelog_from_diff(diff).unwrap();
        assert_eq!(
            changelog,
            "foo (1.0-1) unstable; urgency=low\n\n  * Initial release.\n\n -- Jane Doe <jane@example.org>  Mon, 06 Jan 2020 09:00:00 +0000\n"
        );
        let entry = ChangelogEntry::parse_top(&changelog).unwrap();
        assert_eq!(entry.version, "1.0-1");
    }

    #[test]
    fn changelog_hunk_may_end_the_diff() {
        let diff = "+++ foo-1.0/debian/changelog\n@@ -0,0 +1 @@\n+foo (1.0-1) unstable; urgency=low\n";
        assert_eq!(
            changelog_from_diff(diff).as_deref(),
            Some("foo (1.0-1) unstable; urgency=low\n")
        );
    }

    #[test]
    fn diff_without_changelog() {
        assert_eq!(changelog_from_diff("+++ foo/configure\n+x\n"), None);
    }
}

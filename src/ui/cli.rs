//! Command-line interface module.
//!
//! This module handles CLI argument parsing and turns the arguments into the
//! runtime [`Config`] and [`ComparisonRequest`].

use crate::config::{self, Config};
use crate::report::ComparisonRequest;
use clap::{Parser, ValueEnum};
use std::{path::PathBuf, time::Duration};

/// Compare two Debian source package versions from a security perspective
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The source package to compare
    pub package: String,

    /// The old version of the package, the default is the new version - 1
    #[arg(short = 'o', long = "old-version")]
    pub old_version: Option<String>,

    /// The new version of the package, the default is the old version + 1
    #[arg(short = 'n', long = "new-version")]
    pub new_version: Option<String>,

    /// Force a re-download of all files
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// A directory to store downloaded files
    #[arg(
        short = 'w',
        long = "working-dir",
        env = "DEBCOMPARE_WORKING_DIR",
        default_value = config::WORKING_DIR
    )]
    pub working_dir: PathBuf,

    /// Add more to increase verbosity
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Report format
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Plain)]
    pub format: OutputFormat,

    /// Only correlate bugs tagged security, including archived ones
    #[arg(long = "security-bugs")]
    pub security_bugs: bool,

    #[arg(long = "snapshot-url", env = "DEBCOMPARE_SNAPSHOT_URL", default_value = config::SNAPSHOT_URL)]
    pub snapshot_url: String,

    #[arg(long = "tracker-url", env = "DEBCOMPARE_TRACKER_URL", default_value = config::TRACKER_URL)]
    pub tracker_url: String,

    #[arg(long = "bts-url", env = "DEBCOMPARE_BTS_URL", default_value = config::BTS_URL)]
    pub bts_url: String,

    /// Path to the debdiff program
    #[arg(long = "debdiff", env = "DEBCOMPARE_DEBDIFF", default_value = config::DEBDIFF_PATH)]
    pub debdiff: PathBuf,

    /// HTTP connect and response timeout in seconds
    #[arg(long = "timeout", default_value = "10")]
    pub timeout: u64,

    /// debdiff timeout in seconds
    #[arg(long = "debdiff-timeout", default_value = "300")]
    pub debdiff_timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Console text, colored unless --no-color
    Plain,
    /// Phabricator remarkup
    Phab,
    /// One CSV row per bug or CVE
    Csv,
}

impl Args {
    pub fn config(&self) -> Config {
        Config {
            snapshot_url: self.snapshot_url.clone(),
            tracker_url: self.tracker_url.clone(),
            bts_url: self.bts_url.clone(),
            debdiff: self.debdiff.clone(),
            working_dir: self.working_dir.clone(),
            http_timeout: Duration::from_secs(self.timeout),
            tool_timeout: Duration::from_secs(self.debdiff_timeout),
            force: self.force,
            security_bugs: self.security_bugs,
        }
    }

    pub fn request(&self) -> ComparisonRequest {
        ComparisonRequest {
            package: self.package.clone(),
            old_version: self.old_version.clone(),
            new_version: self.new_version.clone(),
        }
    }

    /// Log level for the `-v` count: error, warn, info, then debug.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let args = Args::parse_from(["debcompare", "foo", "-o", "1.0+deb10u1"]);
        let config = args.config();
        let defaults = Config::default();

        assert_eq!(config.snapshot_url, defaults.snapshot_url);
        assert_eq!(config.http_timeout, defaults.http_timeout);
        assert_eq!(config.tool_timeout, defaults.tool_timeout);
        assert_eq!(args.request().old_version.as_deref(), Some("1.0+deb10u1"));
        assert_eq!(args.request().new_version, None);
        assert_eq!(args.format, OutputFormat::Plain);
        assert_eq!(args.log_level(), log::LevelFilter::Error);
    }

    #[test]
    fn verbosity_and_format() {
        let args = Args::parse_from(["debcompare", "-vvv", "--format", "phab", "-f", "foo"]);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);
        assert_eq!(args.format, OutputFormat::Phab);
        assert!(args.config().force);
    }
}

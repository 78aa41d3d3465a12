//! Inference of a missing comparison endpoint from Debian security versions.
//!
//! Security and point updates carry a `deb<D>u<U>` suffix, where `D` is the
//! target distribution generation and `U` a per-distribution counter. Given
//! one endpoint we can step the counter to find the other.

use crate::errors::{DebcompareError, Result};
use regex::Regex;
use std::{fmt, sync::LazyLock};

static SECURITY_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)([+~-])deb(\d+)u(\d+)$").expect("Invalid regex pattern")
});

/// A version string split into its `deb<D>u<U>` components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityVersion {
    pub base: String,
    pub separator: char,
    pub distribution: u32,
    pub update: u32,
}

impl SecurityVersion {
    /// Parses `version`, failing with `InvalidVersionFormat` when it doesn't end
    /// in a `[+-~]deb<D>u<U>` suffix.
    pub fn parse(version: &str) -> Result<Self> {
        let invalid = || DebcompareError::InvalidVersionFormat(version.to_string());
        let caps = SECURITY_SUFFIX.captures(version).ok_or_else(invalid)?;

        let separator = caps[2].chars().next().ok_or_else(invalid)?;
        let distribution = caps[3].parse().map_err(|_| invalid())?;
        let update = caps[4].parse().map_err(|_| invalid())?;

        Ok(SecurityVersion {
            base: caps[1].to_string(),
            separator,
            distribution,
            update,
        })
    }

    /// The release this update replaced. The first update (`u1`) replaces the
    /// unsuffixed base version.
    pub fn predecessor(&self) -> String {
        if self.update <= 1 {
            return self.base.clone();
        }
        self.with_update(self.update - 1).to_string()
    }

    /// The next update of the same distribution generation. Fails with
    /// `InvalidVersionFormat` when the counter can't be incremented.
    pub fn successor(&self) -> Result<String> {
        let update = self
            .update
            .checked_add(1)
            .ok_or_else(|| DebcompareError::InvalidVersionFormat(self.to_string()))?;
        Ok(self.with_update(update).to_string())
    }

    fn with_update(&self, update: u32) -> Self {
        SecurityVersion {
            update,
            ..self.clone()
        }
    }
}

impl fmt::Display for SecurityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}deb{}u{}",
            self.base, self.separator, self.distribution, self.update
        )
    }
}

/// Completes a comparison pair, inferring whichever endpoint is missing.
///
/// # Errors
/// - `MissingVersions` if neither endpoint is given
/// - `InvalidVersionFormat` if the supplied endpoint has no security suffix
pub fn infer_endpoints(old: Option<&str>, new: Option<&str>) -> Result<(String, String)> {
    match (old, new) {
        (Some(old), Some(new)) => Ok((old.to_string(), new.to_string())),
        (None, Some(new)) => {
            let old = SecurityVersion::parse(new)?.predecessor();
            log::debug!("old version determined: {}", old);
            Ok((old, new.to_string()))
        }
        (Some(old), None) => {
            let new = SecurityVersion::parse(old)?.successor()?;
            log::debug!("new version determined: {}", new);
            Ok((old.to_string(), new))
        }
        (None, None) => Err(DebcompareError::MissingVersions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(v: &str) -> String {
        SecurityVersion::parse(v).unwrap().predecessor()
    }

    fn succ(v: &str) -> String {
        SecurityVersion::parse(v).unwrap().successor().unwrap()
    }

    #[test]
    fn parses_all_separators() {
        for (version, sep) in [
            ("1.0+deb10u3", '+'),
            ("1.0-1-deb10u3", '-'),
            ("1.0~deb10u3", '~'),
        ] {
            let parsed = SecurityVersion::parse(version).unwrap();
            assert_eq!(parsed.separator, sep);
            assert_eq!(parsed.distribution, 10);
            assert_eq!(parsed.update, 3);
            assert_eq!(parsed.to_string(), version);
        }
    }

    #[test]
    fn keeps_epoch_and_revision_in_base() {
        let parsed = SecurityVersion::parse("1:2.4.38-3+deb10u7").unwrap();
        assert_eq!(parsed.base, "1:2.4.38-3");
        assert_eq!(pred("1:2.4.38-3+deb10u7"), "1:2.4.38-3+deb10u6");
    }

    #[test]
    fn predecessor_and_successor_are_inverse_above_first_update() {
        for version in ["1.0+deb10u2", "2.3-1~deb11u9", "0.9-4-deb9u12"] {
            assert_eq!(pred(&succ(version)), version);
            assert_eq!(succ(&pred(version)), version);
        }
    }

    #[test]
    fn first_update_steps_back_to_base() {
        assert_eq!(pred("1.0+deb10u1"), "1.0");
    }

    #[test]
    fn successor_of_first_update_predecessor_needs_the_parsed_suffix() {
        let parsed = SecurityVersion::parse("1.0+deb10u1").unwrap();
        assert_eq!(parsed.predecessor(), "1.0");
        // the base carries no suffix, so the round trip goes through the parsed value
        let mut rebuilt = parsed.clone();
        rebuilt.update = 0;
        assert_eq!(rebuilt.successor().unwrap(), "1.0+deb10u1");
    }

    #[test]
    fn rejects_versions_without_security_suffix() {
        for version in ["1.2.3", "1.0+deb10", "1.0+debXu1", ""] {
            assert!(matches!(
                SecurityVersion::parse(version),
                Err(DebcompareError::InvalidVersionFormat(_))
            ));
            assert!(infer_endpoints(Some(version), None).is_err());
            assert!(infer_endpoints(None, Some(version)).is_err());
        }
    }

    #[test]
    fn successor_of_largest_counter_is_invalid() {
        let largest = format!("1.0+deb10u{}", u32::MAX);
        assert!(matches!(
            SecurityVersion::parse(&largest).unwrap().successor(),
            Err(DebcompareError::InvalidVersionFormat(_))
        ));
        assert!(matches!(
            infer_endpoints(Some(&largest), None),
            Err(DebcompareError::InvalidVersionFormat(_))
        ));
        assert_eq!(pred(&largest), format!("1.0+deb10u{}", u32::MAX - 1));
    }

    #[test]
    fn infers_missing_endpoint() {
        assert_eq!(
            infer_endpoints(Some("1.0+deb10u1"), None).unwrap(),
            ("1.0+deb10u1".to_string(), "1.0+deb10u2".to_string())
        );
        assert_eq!(
            infer_endpoints(None, Some("1.0+deb10u1")).unwrap(),
            ("1.0".to_string(), "1.0+deb10u1".to_string())
        );
        assert_eq!(
            infer_endpoints(Some("1.0"), Some("1.1")).unwrap(),
            ("1.0".to_string(), "1.1".to_string())
        );
        assert!(matches!(
            infer_endpoints(None, None),
            Err(DebcompareError::MissingVersions)
        ));
    }
}

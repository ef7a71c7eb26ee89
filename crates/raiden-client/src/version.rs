// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Version parsing and comparison module
//!
//! A single [`Ord`] implementation on [`VersionData`] backs `<`, `>` and `==`,
//! so every ordering path in the crate agrees on how two versions compare.

use crate::error::{ClientError, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static MODIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<kind>dev|alpha|beta|rc|a|b)-?(?P<number>\d+)")
        .expect("modifier pattern is valid")
});

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[vV]?(?P<major>\d+)\.(?P<minor>\d+)\.(?P<revision>\d+)(?P<extra>.*)$")
        .expect("version pattern is valid")
});

/// Pre-release qualifier, declared from lowest to highest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModifierKind {
    Dev,
    Alpha,
    Beta,
    Rc,
    /// No qualifier: a stable release.
    Stable,
}

impl ModifierKind {
    fn from_token(token: &str) -> Self {
        match token {
            "a" | "alpha" => Self::Alpha,
            "b" | "beta" => Self::Beta,
            "rc" => Self::Rc,
            _ => Self::Dev,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionModifier {
    pub kind: ModifierKind,
    pub number: Option<u64>,
}

impl VersionModifier {
    pub const STABLE: Self = Self {
        kind: ModifierKind::Stable,
        number: None,
    };

    /// Extract the modifier from a free-form version suffix such as `rc1` or `.dev97+g1a2b`.
    pub fn parse(extra: Option<&str>) -> Self {
        let Some(captures) = extra.and_then(|e| MODIFIER_PATTERN.captures(e)) else {
            return Self::STABLE;
        };

        Self {
            kind: ModifierKind::from_token(&captures["kind"]),
            number: captures["number"].parse().ok(),
        }
    }
}

impl PartialOrd for VersionModifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionModifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind.cmp(&other.kind).then_with(|| match (self.number, other.number) {
            (Some(own), Some(theirs)) => own.cmp(&theirs),
            _ => Ordering::Equal,
        })
    }
}

/// Version identity of one release: `major.minor.revision` plus an optional suffix.
#[derive(Debug, Clone)]
pub struct VersionData {
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub extra: Option<String>,
}

impl VersionData {
    pub fn new(major: u64, minor: u64, revision: u64, extra: Option<String>) -> Self {
        Self {
            major,
            minor,
            revision,
            extra: extra.filter(|e| !e.is_empty()),
        }
    }

    /// Build from regex captures named `major`, `minor`, `revision` and optionally `extra`.
    ///
    /// Returns `None` when a numeric part does not fit.
    pub(crate) fn from_captures(captures: &regex::Captures<'_>) -> Option<Self> {
        Some(Self::new(
            captures.name("major")?.as_str().parse().ok()?,
            captures.name("minor")?.as_str().parse().ok()?,
            captures.name("revision")?.as_str().parse().ok()?,
            captures.name("extra").map(|m| m.as_str().to_string()),
        ))
    }

    pub fn modifier(&self) -> VersionModifier {
        VersionModifier::parse(self.extra.as_deref())
    }

    /// `major.minor.revision` followed by the raw suffix, e.g. `0.200.0rc1`.
    pub fn release(&self) -> String {
        format!(
            "{}.{}.{}{}",
            self.major,
            self.minor,
            self.revision,
            self.extra.as_deref().unwrap_or_default()
        )
    }
}

impl FromStr for VersionData {
    type Err = ClientError;

    /// Parse `1.2.0`, `v1.2.0` or `v1.2.0rc1`
    fn from_str(s: &str) -> Result<Self> {
        VERSION_PATTERN
            .captures(s.trim())
            .and_then(|c| Self::from_captures(&c))
            .ok_or_else(|| ClientError::NotFound(format!("invalid version: {s}")))
    }
}

impl fmt::Display for VersionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.release())
    }
}

impl PartialEq for VersionData {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionData {}

impl PartialOrd for VersionData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionData {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.revision)
            .cmp(&(other.major, other.minor, other.revision))
            .then_with(|| self.modifier().cmp(&other.modifier()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> VersionData {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_version() {
        let version = v("v1.2.0");
        assert_eq!(
            (version.major, version.minor, version.revision),
            (1, 2, 0)
        );
        assert!(version.extra.is_none());

        let version = v("0.200.0rc1");
        assert_eq!(version.revision, 0);
        assert_eq!(version.extra.as_deref(), Some("rc1"));
    }

    #[test]
    fn test_parse_version_invalid() {
        assert!("invalid".parse::<VersionData>().is_err());
        assert!("1.2".parse::<VersionData>().is_err());
        assert!("a.b.c".parse::<VersionData>().is_err());
    }

    #[test]
    fn test_modifier_extraction() {
        let cases = [
            ("a1", ModifierKind::Alpha, Some(1)),
            ("alpha-2", ModifierKind::Alpha, Some(2)),
            ("b3", ModifierKind::Beta, Some(3)),
            ("beta4", ModifierKind::Beta, Some(4)),
            ("rc5", ModifierKind::Rc, Some(5)),
            (".dev97+gb1d8ef2f", ModifierKind::Dev, Some(97)),
            ("rc1.dev97+gb1d8ef2f", ModifierKind::Rc, Some(1)),
        ];
        for (extra, kind, number) in cases {
            let modifier = VersionModifier::parse(Some(extra));
            assert_eq!(modifier.kind, kind, "{extra}");
            assert_eq!(modifier.number, number, "{extra}");
        }

        assert_eq!(VersionModifier::parse(None), VersionModifier::STABLE);
        assert_eq!(VersionModifier::parse(Some("-hotfix")), VersionModifier::STABLE);
    }

    #[test]
    fn test_modifier_precedence() {
        let ordered = ["1.0.0.dev1", "1.0.0a1", "1.0.0b1", "1.0.0rc1", "1.0.0"];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
            assert!(v(pair[1]) > v(pair[0]), "{} > {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_stable_beats_release_candidate() {
        assert!(v("v1.2.0") > v("v1.2.0rc1"));
        assert!(v("v1.2.0rc1") < v("v1.2.0"));
        assert_ne!(v("v1.2.0"), v("v1.2.0rc1"));
    }

    #[test]
    fn test_major_decides_regardless_of_modifier() {
        assert!(v("2.0.0.dev1") > v("1.9.9"));
        assert!(v("1.9.9") < v("2.0.0a1"));
        assert!(v("10.0.0rc1") > v("9.99.99"));
    }

    #[test]
    fn test_numeric_not_lexical() {
        assert!(v("0.10.0") > v("0.9.0"));
        assert!(v("0.100.2") > v("0.20.0"));
        assert!(v("1.0.0rc10") > v("1.0.0rc9"));
    }

    #[test]
    fn test_comparison_is_symmetric() {
        let versions = [
            "1.0.0", "1.0.0rc1", "1.0.0rc2", "1.0.0b1", "1.0.0a7", "0.9.9", "1.0.1.dev3",
        ];
        for a in versions {
            for b in versions {
                assert_eq!(v(a).cmp(&v(b)), v(b).cmp(&v(a)).reverse(), "{a} vs {b}");
                assert_eq!(v(a) < v(b), v(b) > v(a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_equal_modifiers_compare_equal() {
        assert_eq!(v("1.0.0rc1"), v("1.0.0rc1.dev5"));
        assert_eq!(v("1.0.0"), v("v1.0.0"));
    }

    #[test]
    fn test_release_string() {
        assert_eq!(v("v1.2.0").release(), "1.2.0");
        assert_eq!(v("v0.200.0rc1").release(), "0.200.0rc1");
        assert_eq!(VersionData::new(1, 2, 0, Some(String::new())).release(), "1.2.0");
    }
}

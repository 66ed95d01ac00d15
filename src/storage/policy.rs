//! Idle-expiration policy.
//!
//! Every stored entry carries an expiration threshold chosen at creation
//! time: a default, or a per-path override selected by regex. Override
//! selection requires exactly one pattern to match; if several patterns
//! match a path, the overrides cancel each other out and the default
//! applies.

use crate::error::{Error, Result};
use regex::Regex;
use std::time::Duration;
use tracing::debug;

/// Entries idle longer than this are evicted, unless overridden.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60);

/// One regex-selected expiration threshold.
#[derive(Debug, Clone)]
pub struct PatternOverride {
    pattern: Regex,
    threshold: Duration,
}

impl PatternOverride {
    pub fn new(pattern: &str, threshold: Duration) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::InvalidOverride(format!("bad pattern {pattern:?}: {e}")))?;
        Ok(Self { pattern, threshold })
    }

    /// Parse a `REGEX=SECONDS` spec, as passed on the command line.
    ///
    /// The split is on the last `=` so patterns containing `=` keep working.
    pub fn parse(spec: &str) -> Result<Self> {
        let (pattern, secs) = spec
            .rsplit_once('=')
            .ok_or_else(|| Error::InvalidOverride(format!("expected REGEX=SECONDS, got {spec:?}")))?;
        let secs: u64 = secs
            .parse()
            .map_err(|_| Error::InvalidOverride(format!("bad duration in {spec:?}")))?;
        Self::new(pattern, Duration::from_secs(secs))
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

/// Chooses an expiration threshold for each stored path.
///
/// The choice is made once, at creation; later policy changes never apply
/// retroactively to live entries.
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    default_threshold: Duration,
    overrides: Vec<PatternOverride>,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_EXPIRATION,
            overrides: Vec::new(),
        }
    }
}

impl ExpirationPolicy {
    pub fn new(default_threshold: Duration, overrides: Vec<PatternOverride>) -> Self {
        Self {
            default_threshold,
            overrides,
        }
    }

    pub fn default_threshold(&self) -> Duration {
        self.default_threshold
    }

    /// Threshold for a path: the override if exactly one pattern matches,
    /// the default otherwise.
    pub fn threshold_for(&self, path: &str) -> Duration {
        let mut matched: Option<&PatternOverride> = None;
        let mut match_count = 0usize;
        for rule in &self.overrides {
            if rule.pattern.is_match(path) {
                match_count += 1;
                matched = Some(rule);
            }
        }
        match match_count {
            1 => matched.map(|o| o.threshold).unwrap_or(self.default_threshold),
            0 => self.default_threshold,
            n => {
                debug!(
                    path,
                    matches = n,
                    "multiple expiration overrides matched, using default"
                );
                self.default_threshold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(overrides: &[(&str, u64)]) -> ExpirationPolicy {
        let overrides = overrides
            .iter()
            .map(|(p, s)| PatternOverride::new(p, Duration::from_secs(*s)).unwrap())
            .collect();
        ExpirationPolicy::new(Duration::from_secs(60), overrides)
    }

    #[test]
    fn test_no_overrides_uses_default() {
        let policy = policy(&[]);
        assert_eq!(policy.threshold_for("/a/b.mp4"), Duration::from_secs(60));
    }

    #[test]
    fn test_single_match_uses_override() {
        let policy = policy(&[(r"\.mp4$", 300), (r"\.txt$", 5)]);
        assert_eq!(policy.threshold_for("/a/b.mp4"), Duration::from_secs(300));
        assert_eq!(policy.threshold_for("/notes.txt"), Duration::from_secs(5));
        assert_eq!(policy.threshold_for("/other.bin"), Duration::from_secs(60));
    }

    #[test]
    fn test_multiple_matches_fall_back_to_default() {
        let policy = policy(&[(r"\.mp4$", 300), (r"^/videos/", 600)]);
        // Both patterns match, so neither wins.
        assert_eq!(
            policy.threshold_for("/videos/clip.mp4"),
            Duration::from_secs(60)
        );
        // Exactly one match still applies.
        assert_eq!(
            policy.threshold_for("/videos/clip.webm"),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_parse_override_spec() {
        let or = PatternOverride::parse(r"\.mp4$=300").unwrap();
        assert_eq!(or.pattern(), r"\.mp4$");
        assert_eq!(or.threshold(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PatternOverride::parse("no-equals").is_err());
        assert!(PatternOverride::parse(r"\.mp4$=forever").is_err());
        assert!(PatternOverride::parse("[invalid=10").is_err());
    }
}

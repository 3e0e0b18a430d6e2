//! Matchers deciding which discovered entries count as input.

use crate::{
    config::PatternSyntax,
    error::{Error, Result},
    traits::Matcher,
};
use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Glob-style wildcard matching against the full path.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    source: String,
    pattern: Pattern,
}

impl GlobMatcher {
    /// Compile a glob pattern, failing if it is syntactically invalid.
    pub fn new(pattern: &str) -> Result<Self> {
        let normalized = strip_cur_dir(Path::new(pattern));
        let compiled = Pattern::new(&normalized.to_string_lossy()).map_err(|e| {
            Error::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            source: pattern.to_string(),
            pattern: compiled,
        })
    }

    /// The pattern as originally supplied.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Matcher for GlobMatcher {
    fn matches(&self, path: &Path) -> bool {
        self.pattern
            .matches_path_with(&strip_cur_dir(path), GLOB_OPTIONS)
    }

    fn describe(&self) -> String {
        format!("glob '{}'", self.source)
    }
}

/// Regular expression searched in the entry's base name.
///
/// Only a non-empty match counts, so an expression that can only match the
/// empty string never selects anything.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    /// Compile a regular expression, failing if it is syntactically invalid.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { regex })
    }
}

impl Matcher for RegexMatcher {
    fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        self.regex
            .find(&name.to_string_lossy())
            .is_some_and(|m| !m.as_str().is_empty())
    }

    fn describe(&self) -> String {
        format!("regex '{}'", self.regex.as_str())
    }
}

/// Extension plus optional base-name prefix check.
#[derive(Debug, Clone)]
pub struct ExtensionMatcher {
    extension: String,
    prefix: Option<String>,
}

impl ExtensionMatcher {
    /// Create a matcher for `extension` (with or without the leading dot).
    pub fn new(extension: &str, prefix: Option<&str>) -> Result<Self> {
        let normalized = extension.trim_start_matches('.').to_lowercase();
        if normalized.is_empty() {
            return Err(Error::InvalidPattern {
                pattern: extension.to_string(),
                message: "extension must not be empty".to_string(),
            });
        }

        Ok(Self {
            extension: normalized,
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
        })
    }
}

impl Matcher for ExtensionMatcher {
    fn matches(&self, path: &Path) -> bool {
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));
        if !ext_ok {
            return false;
        }

        match (&self.prefix, path.file_name().and_then(|n| n.to_str())) {
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            (None, _) => true,
            (Some(_), None) => false,
        }
    }

    fn describe(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("'{}*.{}'", prefix, self.extension),
            None => format!("'*.{}'", self.extension),
        }
    }
}

impl PatternSyntax {
    /// Compile `pattern` with this syntax.
    pub fn build(self, pattern: &str) -> Result<Arc<dyn Matcher>> {
        Ok(match self {
            PatternSyntax::Glob => Arc::new(GlobMatcher::new(pattern)?),
            PatternSyntax::Regex => Arc::new(RegexMatcher::new(pattern)?),
        })
    }
}

/// Drop `.` components so `./in/*.txt` and `in/a.txt` compare equal.
fn strip_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

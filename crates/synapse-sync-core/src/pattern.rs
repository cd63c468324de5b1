//! Ignore patterns for the source walk.
//!
//! A small `.gitignore`-flavoured glob dialect compiled into one anchored
//! regular expression. Names are matched against the whole expression, so a
//! glob only excludes a record whose *title* it matches in full.
//!
//! | Glob | Regex |
//! |------|-------|
//! | `*.log` | `.*\.log` |
//! | `/tmp/` | `^tmp$` |
//! | `*/build` | `^build` |
//! | `.*` | `\..*` |

use regex::Regex;

use crate::error::Result;

const MATCH_NOTHING: &str = "^$";

/// Translate one glob into its regex fragment.
///
/// Rules are applied in order: leading `/` and trailing `/` become anchors,
/// then a leading `*/` and trailing `/*` do the same, then `.` is escaped and
/// `*` expands to `.*`. No other characters are escaped.
pub fn glob_to_regex(glob: &str) -> String {
    let mut s = glob.to_string();
    if let Some(rest) = s.strip_prefix('/') {
        s = format!("^{rest}");
    }
    if let Some(rest) = s.strip_suffix('/') {
        s = format!("{rest}$");
    }
    if let Some(rest) = s.strip_prefix("*/") {
        s = format!("^{rest}");
    }
    if let Some(rest) = s.strip_suffix("/*") {
        s = format!("{rest}$");
    }
    s.replace('.', "\\.").replace('*', ".*")
}

/// A compiled set of ignore globs.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    pattern: Regex,
}

impl IgnoreMatcher {
    /// Compile a set of globs. Duplicates are dropped and the set is sorted,
    /// so the same set always yields the same expression.
    pub fn new<I, S>(globs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fragments: Vec<String> = globs
            .into_iter()
            .map(|g| glob_to_regex(g.as_ref()))
            .collect();
        fragments.sort();
        fragments.dedup();

        if fragments.is_empty() {
            return Ok(Self::default());
        }

        let pattern = Regex::new(&format!("^({})$", fragments.join("|")))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    /// The compiled expression.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Default for IgnoreMatcher {
    fn default() -> Self {
        Self {
            pattern: Regex::new(MATCH_NOTHING).expect("static pattern"),
        }
    }
}

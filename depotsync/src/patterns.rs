//! Per-depot file name patterns.
//!
//! Each tracked depot has an ordered list of patterns. Plain entries name a
//! path exactly (with `*` and `?` as single-segment wildcards); entries
//! prefixed with `regex:` are raw regular expressions. The whole list is
//! compiled into one anchored alternation, `^(?:p1|p2|...)$`, so a file
//! matches only if its entire normalized path matches one of the patterns.
//!
//! # Reloading
//!
//! [`SharedPatternRegistry`] holds the active registry behind an `Arc`.
//! A reload builds a complete new registry first and swaps it in only when
//! every depot compiled; on failure the previous registry stays active.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::manifest::normalize_path;

/// Prefix marking a pattern as a raw regular expression.
pub const REGEX_PREFIX: &str = "regex:";

/// A single entry of a depot's pattern list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternRule {
    /// A path matched literally, except for `*` and `?` wildcards.
    Literal(String),
    /// A raw regular expression.
    Regex(String),
}

impl PatternRule {
    /// Classify a configured pattern string.
    pub fn parse(input: &str) -> Self {
        match input.strip_prefix(REGEX_PREFIX) {
            Some(expr) => Self::Regex(expr.to_string()),
            None => Self::Literal(input.to_string()),
        }
    }

    /// Regular expression source for this rule.
    pub fn to_regex_source(&self) -> String {
        match self {
            Self::Regex(expr) => expr.clone(),
            Self::Literal(path) => literal_to_regex(&normalize_path(path)),
        }
    }
}

/// Escape a literal path, turning `*` and `?` into wildcards that never
/// cross a `/`.
fn literal_to_regex(path: &str) -> String {
    let mut out = String::with_capacity(path.len() * 2);
    let mut literal = String::new();

    for c in path.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { "[^/]*" } else { "[^/]" });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}

/// Compiled matcher for one depot.
#[derive(Debug, Clone)]
pub struct DepotMatcher {
    rules: Vec<PatternRule>,
    regex: Regex,
}

impl DepotMatcher {
    /// Compile a depot's pattern list into a single anchored alternation.
    pub fn compile(depot_id: u32, patterns: &[String]) -> ConfigResult<Self> {
        let rules: Vec<PatternRule> = patterns.iter().map(|p| PatternRule::parse(p)).collect();
        let alternation = rules
            .iter()
            .map(PatternRule::to_regex_source)
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!("^(?:{})$", alternation)).map_err(|e| {
            ConfigError::InvalidPattern {
                depot_id,
                reason: e.to_string(),
            }
        })?;

        Ok(Self { rules, regex })
    }

    /// Whether `path` (in either slash style) matches any pattern.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(&normalize_path(path))
    }

    /// The rules this matcher was compiled from, in configured order.
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }
}

/// Immutable set of compiled matchers keyed by depot id.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    matchers: HashMap<u32, DepotMatcher>,
}

impl PatternRegistry {
    /// An empty registry; no depot is tracked.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile every depot's patterns. Any failure rejects the whole set.
    pub fn from_rules(rules: &BTreeMap<u32, Vec<String>>) -> ConfigResult<Self> {
        let mut matchers = HashMap::with_capacity(rules.len());
        for (depot_id, patterns) in rules {
            matchers.insert(*depot_id, DepotMatcher::compile(*depot_id, patterns)?);
        }
        Ok(Self { matchers })
    }

    /// Parse a `{"<depot id>": ["pattern", ...]}` document.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let rules: BTreeMap<u32, Vec<String>> =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Self::from_rules(&rules)
    }

    /// Load a pattern file from disk.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&json)
    }

    pub fn matcher_for(&self, depot_id: u32) -> Option<&DepotMatcher> {
        self.matchers.get(&depot_id)
    }

    pub fn is_tracked(&self, depot_id: u32) -> bool {
        self.matchers.contains_key(&depot_id)
    }

    /// Tracked depot ids in ascending order.
    pub fn depots(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.matchers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// Process-wide handle to the active [`PatternRegistry`].
///
/// Cloning the handle shares the same underlying registry.
#[derive(Debug, Clone, Default)]
pub struct SharedPatternRegistry {
    current: Arc<RwLock<Arc<PatternRegistry>>>,
}

impl SharedPatternRegistry {
    pub fn new(registry: PatternRegistry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// The registry active right now. Later reloads do not affect it.
    pub fn snapshot(&self) -> Arc<PatternRegistry> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new registry, returning it.
    pub fn replace(&self, registry: PatternRegistry) -> Arc<PatternRegistry> {
        let registry = Arc::new(registry);
        *self.current.write() = Arc::clone(&registry);
        registry
    }

    /// Reload from a pattern file.
    ///
    /// On failure the previous registry stays active and a warning is
    /// logged; the error is returned for callers that want to surface it.
    pub fn reload_from(&self, path: &Path) -> ConfigResult<Arc<PatternRegistry>> {
        match PatternRegistry::load(path) {
            Ok(registry) => {
                info!(
                    path = %path.display(),
                    depots = registry.len(),
                    "Loaded file patterns"
                );
                Ok(self.replace(registry))
            }
            Err(ConfigError::NotFound { path }) => {
                warn!(
                    path = %path.display(),
                    "Pattern file not found, no files will be downloaded"
                );
                Err(ConfigError::NotFound { path })
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload file patterns, keeping previous set");
                Err(e)
            }
        }
    }

    pub fn is_tracked(&self, depot_id: u32) -> bool {
        let tracked = self.current.read().is_tracked(depot_id);
        debug!(depot_id, tracked, "Checked depot tracking");
        tracked
    }
}

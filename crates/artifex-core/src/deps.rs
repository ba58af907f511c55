//! Dependency resolution: import/require references to installable package names.
//!
//! Best-effort by construction. Anything the patterns don't match, or that
//! doesn't normalize to a valid package name, is simply not a dependency.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Ordered-unique set of package names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySet(Vec<String>);

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `name` unless already present. Returns whether it was added.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.0.contains(&name) {
            return false;
        }
        self.0.push(name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl FromIterator<String> for DependencySet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}

/// Prefixes that never name an installable package.
const EXCLUDED_PREFIXES: &[&str] = &[".", "/", "node:", "http:", "https:", "data:", "#", "~"];

/// Node runtime modules. Sub-paths (`fs/promises`) are matched by first segment.
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

static REFERENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // import x from 'p' / export { y } from 'p'
        r#"\bfrom\s*['"]([^'"\s]+)['"]"#,
        // import 'p'
        r#"(?m)^\s*import\s*['"]([^'"\s]+)['"]"#,
        // import('p')
        r#"\bimport\s*\(\s*['"]([^'"\s]+)['"]\s*\)"#,
        // require('p')
        r#"\brequire\s*\(\s*['"]([^'"\s]+)['"]\s*\)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid reference pattern {p:?}: {e}")))
    .collect()
});

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:@[a-z0-9][a-z0-9._~-]*/)?[a-z0-9][a-z0-9._~-]*$")
        .expect("package name pattern is valid")
});

/// Whether `name` is the name of a Node runtime module.
pub fn is_builtin(name: &str) -> bool {
    let first = name.split('/').next().unwrap_or(name);
    NODE_BUILTINS.contains(&first)
}

/// Map an import specifier to its package identity, or `None` if it is
/// relative, builtin or not a valid package name.
pub fn package_name(specifier: &str) -> Option<String> {
    let specifier = specifier.trim();
    if specifier.is_empty() || EXCLUDED_PREFIXES.iter().any(|p| specifier.starts_with(p)) {
        return None;
    }
    let mut segments = specifier.split('/');
    let name = if specifier.starts_with('@') {
        let scope = segments.next()?;
        let pkg = segments.next().filter(|s| !s.is_empty())?;
        format!("{scope}/{pkg}")
    } else {
        segments.next()?.to_string()
    };
    if name.len() > 214 || is_builtin(&name) || !PACKAGE_NAME.is_match(&name) {
        return None;
    }
    Some(name)
}

/// Resolve the packages `code` depends on, in order of first reference.
pub fn resolve(code: &str) -> DependencySet {
    let mut refs: Vec<(usize, &str)> = REFERENCE_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(code))
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), m.as_str()))
        .collect();
    refs.sort_by_key(|(pos, _)| *pos);
    refs.into_iter()
        .filter_map(|(_, spec)| package_name(spec))
        .collect()
}

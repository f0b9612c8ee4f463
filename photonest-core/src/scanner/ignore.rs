//! Per-directory ignore rules.
//!
//! An album directory may carry a `.scanignore` file with one glob pattern
//! per line; matching entries never enter the pipeline. Patterns match file
//! names, not full paths.

use regex::Regex;
use tracing::warn;

/// Name of the per-directory ignore file.
pub const IGNORE_FILE_NAME: &str = ".scanignore";

/// Compiled ignore patterns for one directory.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    patterns: Vec<Regex>,
}

impl IgnoreRules {
    /// Parse ignore-file content. Blank lines and `#` comments are skipped;
    /// patterns that fail to compile are dropped with a warning.
    pub fn parse(content: &str) -> Self {
        let patterns = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(compile_glob)
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `name` (a bare file name) matches any pattern.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(name))
    }
}

/// Translate a glob into an anchored regex: `*` matches any run of
/// characters, `?` exactly one; everything else is literal.
fn compile_glob(glob: &str) -> Option<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    match Regex::new(&pattern) {
        Ok(compiled) => Some(compiled),
        Err(error) => {
            warn!(%glob, %error, "dropping unparseable ignore pattern");
            None
        }
    }
}

//! Include/exclude filtering of discovered paths
//!
//! Patterns are matched against the path relative to its discovery root,
//! anchored at the start of that relative path. Exclusion wins over
//! inclusion.

use crate::error::{PipelineError, PipelineResult};
use regex::Regex;
use std::path::{Component, Path};

/// Pure predicate composed from two optional compiled patterns
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl PathFilter {
    /// Compile a filter
    ///
    /// Identical include and exclude patterns would reject everything, so
    /// they are a configuration error, as is any invalid pattern.
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> PipelineResult<Self> {
        if let (Some(inc), Some(exc)) = (include, exclude) {
            if inc == exc {
                return Err(PipelineError::Config(
                    "include and exclude pattern are equal, nothing would be processed"
                        .to_string(),
                ));
            }
        }

        Ok(Self {
            include: include.map(|p| compile_anchored(p, "include")).transpose()?,
            exclude: exclude.map(|p| compile_anchored(p, "exclude")).transpose()?,
        })
    }

    /// Filter accepting every path
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Whether a root-relative path is accepted
    pub fn matches(&self, relative_path: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .map_or(true, |re| re.is_match(relative_path));
        let excluded = self
            .exclude
            .as_ref()
            .map_or(false, |re| re.is_match(relative_path));
        included && !excluded
    }

    /// Convenience: relativise `path` against `root` and test it
    pub fn matches_path(&self, root: &Path, path: &Path) -> bool {
        self.matches(&relative_path(root, path))
    }
}

fn compile_anchored(pattern: &str, which: &str) -> PipelineResult<Regex> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
        PipelineError::Config(format!("invalid {} pattern {:?}: {}", which, pattern, e))
    })
}

/// Render `path` relative to `root` as `/a/b.wav`
///
/// Separators are always `/` and the result always starts with one, for
/// files directly under the root as well as in subdirectories. A path
/// outside `root` is rendered whole.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::new();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            out.push('/');
            out.push_str(&part.to_string_lossy());
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

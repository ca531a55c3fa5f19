//! Include/exclude glob filtering of relative file paths.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::VfsError;

/// Compiled include and exclude patterns.
///
/// `*` never crosses a `/`; use `**` to match across directories.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    /// Compiled include patterns (None = include all).
    include_set: Option<GlobSet>,
    /// Compiled exclude patterns.
    exclude_set: Option<GlobSet>,
}

impl GlobFilter {
    /// Compile a filter.
    ///
    /// # Arguments
    /// * `include` - Patterns a path must match (empty = everything)
    /// * `exclude` - Patterns a path must not match
    ///
    /// # Errors
    /// Returns error if any pattern is invalid.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, VfsError> {
        Ok(Self {
            include_set: compile(include)?,
            exclude_set: compile(exclude)?,
        })
    }

    /// Check if a relative path passes the filter.
    pub fn matches(&self, path: &str) -> bool {
        let included: bool = match &self.include_set {
            Some(set) => set.is_match(path),
            None => true,
        };
        let excluded: bool = match &self.exclude_set {
            Some(set) => set.is_match(path),
            None => false,
        };
        included && !excluded
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Option<GlobSet>, VfsError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder: GlobSetBuilder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern: &str = pattern.as_ref();
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| VfsError::InvalidGlobPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }

    let set: GlobSet = builder.build().map_err(|e| VfsError::InvalidGlobPattern {
        pattern: patterns
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(", "),
        reason: e.to_string(),
    })?;
    Ok(Some(set))
}

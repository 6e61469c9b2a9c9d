use std::path::Path;

use crate::enums::{SampleScaling, TieBreak};

/// Extension of the single-slice files read and written by this crate.
pub const DEFAULT_EXTENSION: &str = "dcm";

/// Root under which UUID-derived UIDs are registered (ISO/IEC 9834-8).
pub const UUID_UID_ROOT: &str = "2.25";

#[derive(Clone, Debug)]
pub struct ReadOptions {
    pub extension: String,
    pub scaling: SampleScaling,
    pub tie_break: TieBreak,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            scaling: SampleScaling::default(),
            tie_break: TieBreak::default(),
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_scaling(mut self, scaling: SampleScaling) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Whether `path` carries the recognized slice extension (case-insensitive).
    pub fn matches_extension(&self, path: &Path) -> bool {
        has_extension(path, &self.extension)
    }
}

/// Organization UID roots used when identifiers are generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UidRoots {
    pub study: String,
    pub series: String,
    pub instance: String,
}

impl Default for UidRoots {
    fn default() -> Self {
        Self::uniform(UUID_UID_ROOT)
    }
}

impl UidRoots {
    /// Use the same root for study, series and instance UIDs.
    pub fn uniform(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            study: root.clone(),
            series: root.clone(),
            instance: root,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WriteOptions {
    pub extension: String,
    pub uid_roots: UidRoots,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            uid_roots: UidRoots::default(),
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_uid_roots(mut self, uid_roots: UidRoots) -> Self {
        self.uid_roots = uid_roots;
        self
    }

    pub fn matches_extension(&self, path: &Path) -> bool {
        has_extension(path, &self.extension)
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

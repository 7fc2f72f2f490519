//! Path eligibility with gitignore support.

use std::path::{Component, Path};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::Result;

/// Substrings that exclude a path wherever they occur: version control,
/// build caches, virtual environments, secrets and OS metadata.
const DENY_SUBSTRINGS: &[&str] = &[
    ".git",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    "node_modules",
    ".venv",
    ".env",
    ".DS_Store",
    ".pyc",
    ".pyo",
    ".swp",
];

/// Binary, media and archive extensions that are never primed.
const BINARY_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "so", "dylib", "dll", "exe", "bin", "dat", "db", "sqlite", "jpg", "jpeg", "png",
    "gif", "bmp", "ico", "svg", "mp3", "mp4", "avi", "mov", "pdf", "zip", "tar", "gz", "rar", "7z",
    "dmg", "pkg", "deb", "rpm", "iso", "jar", "war", "ear", "whl", "egg", "gem", "nupkg",
];

/// Extensions and the language tag used to fence their content.
const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("rs", "rust"),
    ("java", "java"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("kt", "kotlin"),
    ("scala", "scala"),
    ("r", "r"),
    ("m", "objc"),
    ("sh", "bash"),
    ("yml", "yaml"),
    ("yaml", "yaml"),
    ("json", "json"),
    ("xml", "xml"),
    ("md", "markdown"),
    ("rst", "rst"),
    ("txt", "text"),
    ("toml", "toml"),
    ("ini", "ini"),
    ("cfg", "ini"),
    ("conf", "conf"),
    ("dockerfile", "dockerfile"),
    ("makefile", "makefile"),
    ("mk", "makefile"),
];

/// Extensionless file names with a known language tag.
const LANGUAGE_FILE_NAMES: &[&str] = &["dockerfile", "makefile", "caddyfile"];

/// Project ignore rules, queried as a yes/no oracle.
pub trait IgnoreOracle: Send + Sync {
    /// Whether `path` (relative to the watch root) is excluded.
    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool;
}

/// Ignore oracle backed by a gitignore-style rule file.
#[derive(Debug)]
pub struct GitignoreOracle {
    gitignore: Gitignore,
}

impl GitignoreOracle {
    /// Load rules from `root/ignore_file`.
    ///
    /// A missing or unreadable rule file yields an oracle that excludes nothing.
    pub fn load(root: impl AsRef<Path>, ignore_file: &str) -> Self {
        let root = root.as_ref();
        let rule_path = root.join(ignore_file);

        if !rule_path.is_file() {
            tracing::warn!(path = %rule_path.display(), "No ignore file found");
            return Self {
                gitignore: Gitignore::empty(),
            };
        }

        let mut builder = GitignoreBuilder::new(root);
        if let Some(e) = builder.add(&rule_path) {
            tracing::warn!(path = %rule_path.display(), error = %e, "Ignore file partially parsed");
        }

        let gitignore = builder.build().unwrap_or_else(|e| {
            tracing::warn!(path = %rule_path.display(), error = %e, "Failed to build ignore rules");
            Gitignore::empty()
        });

        tracing::info!(
            path = %rule_path.display(),
            rules = gitignore.num_ignores(),
            "Loaded ignore rules"
        );

        Self { gitignore }
    }

    /// Build rules from inline patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is invalid.
    pub fn with_patterns(root: impl AsRef<Path>, patterns: &[&str]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root.as_ref());

        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| crate::Error::config(format!("invalid pattern: {e}")))?;
        }

        let gitignore = builder
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build gitignore: {e}")))?;

        Ok(Self { gitignore })
    }
}

impl IgnoreOracle for GitignoreOracle {
    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        if path.has_root() {
            return false;
        }
        self.gitignore
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}

/// Decides whether a path is a candidate for tracking and priming.
pub struct EligibilityFilter {
    extra_ignore_dirs: Vec<String>,
    oracle: Box<dyn IgnoreOracle>,
}

impl std::fmt::Debug for EligibilityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EligibilityFilter")
            .field("extra_ignore_dirs", &self.extra_ignore_dirs)
            .finish_non_exhaustive()
    }
}

impl EligibilityFilter {
    /// Create a filter from extra ignore directories and an ignore oracle.
    pub fn new(extra_ignore_dirs: &[String], oracle: impl IgnoreOracle + 'static) -> Self {
        let extra_ignore_dirs = extra_ignore_dirs
            .iter()
            .map(|d| d.trim().trim_matches('/').to_string())
            .filter(|d| !d.is_empty())
            .collect();

        Self {
            extra_ignore_dirs,
            oracle: Box::new(oracle),
        }
    }

    /// Check if a file path (relative to the watch root) is eligible.
    #[must_use]
    pub fn is_eligible(&self, path: &Path) -> bool {
        if is_denied(path) || is_binary(path) {
            return false;
        }

        if self.under_extra_dir(path, false) {
            return false;
        }

        !self.oracle.is_ignored(path, false)
    }

    /// Check if a directory should be skipped entirely during a walk.
    #[must_use]
    pub fn is_excluded_dir(&self, path: &Path) -> bool {
        is_denied(path) || self.under_extra_dir(path, true) || self.oracle.is_ignored(path, true)
    }

    fn under_extra_dir(&self, path: &Path, is_dir: bool) -> bool {
        let dirs: Vec<&std::ffi::OsStr> = {
            let mut parts: Vec<_> = path
                .components()
                .filter_map(|c| match c {
                    Component::Normal(name) => Some(name),
                    _ => None,
                })
                .collect();
            if !is_dir {
                parts.pop();
            }
            parts
        };

        self.extra_ignore_dirs.iter().any(|entry| {
            if entry.contains('/') {
                let prefix = Path::new(entry);
                path.starts_with(prefix) && (is_dir || path != prefix)
            } else {
                dirs.iter().any(|name| *name == entry.as_str())
            }
        })
    }

    /// Get the language tag for a file based on its extension or name.
    #[must_use]
    pub fn detect_language(path: &Path) -> Option<&'static str> {
        let by_ext = path.extension().and_then(|e| e.to_str()).and_then(|ext| {
            let ext = ext.to_lowercase();
            LANGUAGE_EXTENSIONS
                .iter()
                .find(|(e, _)| *e == ext)
                .map(|(_, lang)| *lang)
        });

        by_ext.or_else(|| {
            let name = path.file_name()?.to_str()?.to_lowercase();
            LANGUAGE_FILE_NAMES
                .iter()
                .find(|n| **n == name)
                .copied()
        })
    }
}

fn is_denied(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    DENY_SUBSTRINGS.iter().any(|s| path_str.contains(s))
}

fn is_binary(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        })
}

//! Source tree traversal honouring skip patterns, extensions and depth

use crate::error::BuildError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use locus_core::{CACHE_DIR, GraphConfig, path_key};
use std::path::{Path, PathBuf};

/// A file selected for the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Root-relative path with `/` separators.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub extension: String,
}

#[derive(Debug, Default)]
pub struct WalkOutput {
    /// Root-relative directory paths, parents before children.
    pub directories: Vec<String>,
    pub files: Vec<WalkedFile>,
    /// Entries the walker could not read: (path, reason).
    pub errors: Vec<(PathBuf, String)>,
}

pub(crate) fn skip_matcher(patterns: &[String]) -> Result<GlobSet, BuildError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| BuildError::InvalidSkipPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| BuildError::InvalidSkipPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

/// Walk `root` depth-first in name order.
///
/// The root itself is depth 0. A directory at depth `d <= max_depth` is
/// listed; deeper directories are neither listed nor entered. Locus cache
/// directories are never part of the tree.
pub fn walk(root: &Path, config: &GraphConfig) -> Result<WalkOutput, BuildError> {
    let skip = skip_matcher(&config.skip_dirs)?;
    let max_depth = config.max_depth;

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .git_ignore(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .require_git(false)
        .follow_links(false)
        .max_depth(Some(max_depth.saturating_add(1)))
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            if entry.depth() > max_depth {
                return false;
            }
            entry.file_name() != CACHE_DIR && !skip.is_match(entry.file_name())
        })
        .build();

    let mut output = WalkOutput::default();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "walk error");
                let path = match &err {
                    ignore::Error::WithPath { path, .. } => path.clone(),
                    _ => root.to_path_buf(),
                };
                output.errors.push((path, err.to_string()));
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel_path = path_key(rel);
        let Some(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            output.directories.push(rel_path);
        } else if file_type.is_file() {
            let extension = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string();
            if !extension.is_empty() && config.accepts_extension(&extension) {
                output.files.push(WalkedFile {
                    rel_path,
                    abs_path: entry.path().to_path_buf(),
                    extension,
                });
            }
        }
    }

    tracing::debug!(
        directories = output.directories.len(),
        files = output.files.len(),
        "walk complete"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_core::test_utils::create_repo_with_structure;

    #[test]
    fn test_walk_skips_and_filters() {
        let repo = create_repo_with_structure(&[
            ("pkg/a.py", "x = 1\n"),
            ("pkg/notes.md", "# notes\n"),
            ("node_modules/lib/index.js", "module.exports = {};\n"),
            ("pkg/__pycache__/a.cpython-312.pyc", ""),
            ("web/app.JS", "let a = 1;\n"),
        ]);
        let out = walk(repo.path(), &GraphConfig::default()).unwrap();
        assert_eq!(out.directories, vec!["pkg", "web"]);
        let files: Vec<_> = out.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(files, vec!["pkg/a.py", "web/app.JS"]);
    }

    #[test]
    fn test_walk_depth_limit() {
        let repo = create_repo_with_structure(&[
            ("top.py", ""),
            ("a/one.py", ""),
            ("a/b/two.py", ""),
            ("a/b/c/three.py", ""),
        ]);
        let config = GraphConfig {
            max_depth: 2,
            ..GraphConfig::default()
        };
        let out = walk(repo.path(), &config).unwrap();
        assert_eq!(out.directories, vec!["a", "a/b"]);
        let files: Vec<_> = out.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(files, vec!["a/b/two.py", "a/one.py", "top.py"]);
    }

    #[test]
    fn test_skip_dirs_accept_globs() {
        let repo = create_repo_with_structure(&[
            ("build-debug/x.py", ""),
            ("build-release/y.py", ""),
            ("src/z.py", ""),
        ]);
        let config = GraphConfig {
            skip_dirs: vec!["build-*".to_string()],
            ..GraphConfig::default()
        };
        let out = walk(repo.path(), &config).unwrap();
        assert_eq!(out.directories, vec!["src"]);
    }

    #[test]
    fn test_invalid_skip_pattern() {
        let config = GraphConfig {
            skip_dirs: vec!["[".to_string()],
            ..GraphConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            walk(dir.path(), &config),
            Err(BuildError::InvalidSkipPattern { .. })
        ));
    }
}

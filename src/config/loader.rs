//! Bundle root discovery and configuration file loading.
//!
//! A bundle root is the closest ancestor directory holding `lakeward.yml`
//! (or `lakeward.yaml`). The root file may name additional configuration
//! files through a top-level `include` section of glob patterns; matches are
//! loaded in pattern order, alphabetically within a pattern, deduplicated,
//! and merged over the root file.

use std::collections::HashSet;
use std::path::{Path as StdPath, PathBuf};

use tracing::debug;

use crate::dynvalue::{merge, Path, Value};
use crate::error::{ConfigError, LakewardError, Result};

use super::yaml;

/// Accepted root file names, in lookup order.
pub const ROOT_FILE_NAMES: [&str; 2] = ["lakeward.yml", "lakeward.yaml"];

/// Environment variable overriding root discovery.
pub const ROOT_ENV_VAR: &str = "LAKEWARD_ROOT";

/// Walks up from `start` to find the bundle root.
///
/// The `LAKEWARD_ROOT` environment variable short-circuits the walk; the
/// directory it names must itself contain a root file.
///
/// # Errors
///
/// Returns [`ConfigError::RootNotFound`] when no ancestor holds a root file.
pub fn find_root(start: &StdPath) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ROOT_ENV_VAR) {
        let dir = PathBuf::from(dir);
        if root_file(&dir).is_some() {
            return Ok(dir);
        }
        return Err(LakewardError::Config(ConfigError::RootNotFound {
            start: dir,
        }));
    }
    let mut dir = start;
    loop {
        if root_file(dir).is_some() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => {
                return Err(LakewardError::Config(ConfigError::RootNotFound {
                    start: start.to_path_buf(),
                }))
            }
        }
    }
}

/// The root file inside `root`, if one exists.
#[must_use]
pub fn root_file(root: &StdPath) -> Option<PathBuf> {
    ROOT_FILE_NAMES
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
}

/// Parses the root file of `root` without processing includes.
///
/// # Errors
///
/// Fails when the root file is missing or unparsable.
pub async fn load_root(root: &StdPath) -> Result<Value> {
    let file = root_file(root).ok_or_else(|| {
        LakewardError::Config(ConfigError::RootNotFound {
            start: root.to_path_buf(),
        })
    })?;
    yaml::load_file(&file).await
}

/// Loads the full configuration tree: the root file plus everything its
/// `include` section matches, merged in order.
///
/// Returns the merged tree and the list of files it was read from. The
/// `include` section is consumed and absent from the returned tree.
///
/// # Errors
///
/// Fails on unreadable or unparsable files, absolute include patterns,
/// non-glob include entries that match nothing, and `include` sections in
/// included files.
pub async fn load_tree(root: &StdPath) -> Result<(Value, Vec<PathBuf>)> {
    let tree = load_root(root).await?;
    expand_includes(root, tree).await
}

/// Expands the `include` section of an already-parsed root tree.
///
/// # Errors
///
/// See [`load_tree`].
pub async fn expand_includes(root: &StdPath, mut tree: Value) -> Result<(Value, Vec<PathBuf>)> {
    let root_path = root_file(root).ok_or_else(|| {
        LakewardError::Config(ConfigError::RootNotFound {
            start: root.to_path_buf(),
        })
    })?;
    let patterns = include_patterns(&tree)?;
    tree.remove_at(&Path::parse("include")?);

    let mut files = vec![root_path.clone()];
    let mut seen: HashSet<PathBuf> = files.iter().cloned().collect();
    for pattern in &patterns {
        for file in resolve_pattern(root, pattern)? {
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }

    for file in files.iter().skip(1) {
        debug!(file = %file.display(), "merging config file");
        let overlay = yaml::load_file(file).await?;
        if let Some(nested) = overlay.get_str_path("include") {
            return Err(LakewardError::Config(ConfigError::parse(
                nested.location().clone(),
                "include sections are only allowed in the bundle root file",
            )));
        }
        tree = merge(tree, overlay)?;
    }
    Ok((tree, files))
}

/// Extracts the `include` patterns from the root tree.
fn include_patterns(tree: &Value) -> Result<Vec<String>> {
    let Some(include) = tree.get_str_path("include") else {
        return Ok(Vec::new());
    };
    include_entries(include)
}

/// Validates an `include` node and returns its patterns. Shared with the
/// target merge, which splices target-level includes.
pub(crate) fn include_entries(include: &Value) -> Result<Vec<String>> {
    let Some(entries) = include.as_sequence() else {
        return Err(LakewardError::Config(ConfigError::parse(
            include.location().clone(),
            "include must be a sequence of glob patterns",
        )));
    };
    let mut patterns = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(pattern) = entry.as_str() else {
            return Err(LakewardError::Config(ConfigError::parse(
                entry.location().clone(),
                "include entries must be strings",
            )));
        };
        if StdPath::new(pattern).is_absolute() {
            return Err(LakewardError::Config(ConfigError::AbsoluteInclude {
                pattern: pattern.to_string(),
                location: entry.location().clone(),
            }));
        }
        patterns.push(pattern.to_string());
    }
    Ok(patterns)
}

/// Resolves one include pattern to existing files, alphabetically.
pub(crate) fn resolve_pattern(root: &StdPath, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = root.join(pattern);
    let is_literal = !pattern.contains(['*', '?', '[']);
    if is_literal {
        if !full.is_file() {
            return Err(LakewardError::Config(ConfigError::FileNotFound {
                path: full,
                reason: String::from("file named in include section does not exist"),
            }));
        }
        return Ok(vec![full]);
    }
    let glob_expr = full.to_string_lossy().into_owned();
    let paths = glob::glob(&glob_expr).map_err(|e| {
        LakewardError::Config(ConfigError::FileNotFound {
            path: full.clone(),
            reason: format!("invalid include pattern: {e}"),
        })
    })?;
    let mut matches: Vec<PathBuf> = paths.filter_map(std::result::Result::ok).filter(|p| p.is_file()).collect();
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write(dir: &StdPath, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.expect("mkdir");
        }
        tokio::fs::write(path, content).await.expect("write");
    }

    #[tokio::test]
    async fn test_find_root_walks_up() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "lakeward.yml", "bundle:\n  name: x\n").await;
        let nested = dir.path().join("src/jobs");
        tokio::fs::create_dir_all(&nested).await.expect("mkdir");

        let root = find_root(&nested).expect("root");
        assert_eq!(root, dir.path());
    }

    #[tokio::test]
    async fn test_find_root_fails_outside_bundle() {
        let dir = TempDir::new().expect("tempdir");
        let err = find_root(dir.path()).expect_err("no root");
        assert!(matches!(
            err,
            LakewardError::Config(ConfigError::RootNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_includes_merge_in_order_and_dedupe() {
        let dir = TempDir::new().expect("tempdir");
        write(
            dir.path(),
            "lakeward.yml",
            "bundle:\n  name: etl\ninclude:\n  - conf/*.yml\n  - conf/a.yml\n",
        )
        .await;
        write(dir.path(), "conf/a.yml", "x: from_a\ny: 1\n").await;
        write(dir.path(), "conf/b.yml", "x: from_b\n").await;

        let (tree, files) = load_tree(dir.path()).await.expect("load");
        // b merges after a, so its scalar wins.
        assert_eq!(tree.get_str_path("x").and_then(Value::as_str), Some("from_b"));
        assert_eq!(tree.get_str_path("y").and_then(Value::as_int), Some(1));
        assert!(tree.get_str_path("include").is_none());
        assert_eq!(files.len(), 3);
        assert!(files[1].ends_with("conf/a.yml"));
        assert!(files[2].ends_with("conf/b.yml"));
    }

    #[tokio::test]
    async fn test_absolute_include_rejected() {
        let dir = TempDir::new().expect("tempdir");
        write(
            dir.path(),
            "lakeward.yml",
            "include:\n  - /etc/passwd.yml\n",
        )
        .await;
        let err = load_tree(dir.path()).await.expect_err("absolute");
        assert!(matches!(
            err,
            LakewardError::Config(ConfigError::AbsoluteInclude { .. })
        ));
    }

    #[tokio::test]
    async fn test_literal_include_must_exist() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "lakeward.yml", "include:\n  - missing.yml\n").await;
        let err = load_tree(dir.path()).await.expect_err("missing");
        assert!(matches!(
            err,
            LakewardError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_nested_include_rejected() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "lakeward.yml", "include:\n  - extra.yml\n").await;
        write(dir.path(), "extra.yml", "include:\n  - more.yml\n").await;
        let err = load_tree(dir.path()).await.expect_err("nested include");
        assert!(matches!(
            err,
            LakewardError::Config(ConfigError::ParseError { .. })
        ));
    }
}

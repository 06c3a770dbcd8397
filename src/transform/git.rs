//! Git metadata capture.
//!
//! Reads `.git` directly rather than shelling out, so the capture works in
//! minimal environments. Everything here is best-effort: a bundle outside a
//! repository simply gets no git details.

use std::path::{Path as StdPath, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::bundle::Bundle;
use crate::mutator::{Diagnostics, Mutator};

/// Captures branch, origin URL, and commit into `bundle.git`.
///
/// Configured values win; anything read from the repository is marked
/// `inferred`, which production mode turns into a warning.
pub struct LoadGitDetails;

#[async_trait]
impl Mutator for LoadGitDetails {
    fn name(&self) -> &'static str {
        "LoadGitDetails"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        let Some(git_dir) = find_git_dir(&bundle.root) else {
            debug!("bundle is not inside a git repository");
            return Diagnostics::new();
        };

        let git = &mut bundle.config.bundle.git;
        let head = read_head(&git_dir).await;
        if git.branch.is_none() {
            if let Some(Head::Branch(branch)) = &head {
                git.branch = Some(branch.clone());
                git.inferred = true;
            }
        }
        if git.commit.is_none() {
            git.commit = match &head {
                Some(Head::Branch(branch)) => resolve_branch(&git_dir, branch).await,
                Some(Head::Detached(commit)) => Some(commit.clone()),
                None => None,
            };
        }
        if git.origin_url.is_none() {
            git.origin_url = read_origin_url(&git_dir).await;
        }

        if let Err(err) = bundle.commit_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

enum Head {
    Branch(String),
    Detached(String),
}

/// Walks up from the bundle root to find the `.git` directory.
fn find_git_dir(start: &StdPath) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        let candidate = dir.join(".git");
        if candidate.is_dir() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

async fn read_head(git_dir: &StdPath) -> Option<Head> {
    let head = fs::read_to_string(git_dir.join("HEAD")).await.ok()?;
    let head = head.trim();
    head.strip_prefix("ref: refs/heads/").map_or_else(
        || Some(Head::Detached(head.to_string())),
        |branch| Some(Head::Branch(branch.to_string())),
    )
}

/// Resolves a branch to its commit via the loose ref file, falling back to
/// `packed-refs`.
async fn resolve_branch(git_dir: &StdPath, branch: &str) -> Option<String> {
    let loose = git_dir.join("refs/heads").join(branch);
    if let Ok(commit) = fs::read_to_string(&loose).await {
        return Some(commit.trim().to_string());
    }
    let packed = fs::read_to_string(git_dir.join("packed-refs")).await.ok()?;
    let wanted = format!("refs/heads/{branch}");
    packed.lines().find_map(|line| {
        let (commit, name) = line.split_once(' ')?;
        (name == wanted).then(|| commit.to_string())
    })
}

/// Extracts the `origin` remote URL from `.git/config`.
async fn read_origin_url(git_dir: &StdPath) -> Option<String> {
    let config = fs::read_to_string(git_dir.join("config")).await.ok()?;
    let mut in_origin = false;
    for line in config.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_origin = line == "[remote \"origin\"]";
            continue;
        }
        if in_origin {
            if let Some(url) = line.strip_prefix("url") {
                return Some(url.trim_start_matches([' ', '=']).trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::apply;
    use tempfile::TempDir;

    async fn fake_repo(dir: &StdPath) {
        let git = dir.join(".git");
        fs::create_dir_all(git.join("refs/heads")).await.expect("mkdir");
        fs::write(git.join("HEAD"), "ref: refs/heads/main\n")
            .await
            .expect("head");
        fs::write(git.join("refs/heads/main"), "abc123\n")
            .await
            .expect("ref");
        fs::write(
            git.join("config"),
            "[remote \"origin\"]\n\turl = git@example.com:data/etl.git\n",
        )
        .await
        .expect("config");
    }

    #[tokio::test]
    async fn test_details_read_from_repository() {
        let dir = TempDir::new().expect("tempdir");
        fake_repo(dir.path()).await;
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();

        let diags = apply(&mut bundle, &LoadGitDetails).await;
        assert!(!diags.has_error());
        let git = &bundle.config.bundle.git;
        assert_eq!(git.branch.as_deref(), Some("main"));
        assert_eq!(git.commit.as_deref(), Some("abc123"));
        assert_eq!(git.origin_url.as_deref(), Some("git@example.com:data/etl.git"));
        assert!(git.inferred);
    }

    #[tokio::test]
    async fn test_configured_branch_wins() {
        let dir = TempDir::new().expect("tempdir");
        fake_repo(dir.path()).await;
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle.config.bundle.git.branch = Some(String::from("release"));
        bundle.commit_typed().expect("commit");

        let diags = apply(&mut bundle, &LoadGitDetails).await;
        assert!(!diags.has_error());
        let git = &bundle.config.bundle.git;
        assert_eq!(git.branch.as_deref(), Some("release"));
        assert!(!git.inferred);
    }

    #[tokio::test]
    async fn test_no_repository_is_quiet() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        let diags = apply(&mut bundle, &LoadGitDetails).await;
        assert!(!diags.has_error());
        assert!(bundle.config.bundle.git.is_empty());
    }
}

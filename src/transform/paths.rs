//! Local path translation.
//!
//! Tasks and pipeline libraries may reference source files by local path.
//! This pass resolves each such path relative to the file that declared it,
//! verifies the file exists (falling back to `.py`/`.ipynb` for notebooks),
//! synthesizes an `artifacts.<slug>` entry for it, and rewrites the
//! reference to `${artifacts.<slug>.remote_path}`, which the upload step
//! resolves once the remote location is known.

use std::path::{Path as StdPath, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::Bundle;
use crate::dynvalue::{Location, Path, Pattern, Value};
use crate::error::{ConfigError, LakewardError};
use crate::mutator::{Diagnostics, Mutator};
use crate::sync::notebook::is_notebook;

/// Pattern of a path-bearing node and whether it expects a notebook.
const PATH_PATTERNS: [(&str, bool); 5] = [
    ("resources.jobs.*.tasks[*].notebook_task.notebook_path", true),
    ("resources.jobs.*.tasks[*].spark_python_task.python_file", false),
    ("resources.pipelines.*.libraries[*].notebook.path", true),
    ("resources.pipelines.*.libraries[*].file.path", false),
    ("resources.dashboards.*.file_path", false),
];

/// Extensions tried when a notebook reference omits one.
const NOTEBOOK_EXTENSIONS: [&str; 2] = ["py", "ipynb"];

/// Rewrites local path references to artifact references.
pub struct TranslatePaths;

/// One collected reference awaiting translation.
struct Reference {
    node_path: Path,
    raw: String,
    location: Location,
    notebook_hint: bool,
}

#[async_trait]
impl Mutator for TranslatePaths {
    fn name(&self) -> &'static str {
        "TranslatePaths"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let references = match collect_references(&bundle.tree) {
            Ok(refs) => refs,
            Err(err) => return Diagnostics::from_error(err),
        };
        for reference in references {
            if let Err(err) = translate(bundle, &reference).await {
                return Diagnostics::from_error(err);
            }
        }
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

fn collect_references(tree: &Value) -> crate::error::Result<Vec<Reference>> {
    let mut references = Vec::new();
    for (pattern, notebook_hint) in PATH_PATTERNS {
        let pattern = Pattern::parse(pattern)?;
        tree.foreach(&mut |path, value| {
            if !pattern.matches(path) {
                return;
            }
            let Some(raw) = value.as_str() else {
                return;
            };
            if raw.is_empty() || raw.starts_with('/') || raw.contains("${") {
                return;
            }
            references.push(Reference {
                node_path: path.clone(),
                raw: raw.to_string(),
                location: value.location().clone(),
                notebook_hint,
            });
        });
    }
    Ok(references)
}

async fn translate(bundle: &mut Bundle, reference: &Reference) -> crate::error::Result<()> {
    let base = if reference.location.is_synthetic() {
        bundle.root.clone()
    } else {
        reference
            .location
            .file
            .parent()
            .map_or_else(|| bundle.root.clone(), StdPath::to_path_buf)
    };
    let local = resolve_local(&base, &reference.raw, reference.notebook_hint).ok_or_else(|| {
        LakewardError::Config(ConfigError::PathNotFound {
            path: reference.raw.clone(),
            location: reference.location.clone(),
        })
    })?;

    let notebook = reference.notebook_hint && is_notebook(&local).await.unwrap_or(false);
    let slug = slugify(&local, &bundle.root);
    debug!(path = %local.display(), slug = %slug, notebook, "translated local path");

    let artifact_path = Path::parse(&format!("artifacts.{slug}"))?;
    if bundle.tree.get(&artifact_path).is_none() {
        let mut file_entry = Value::empty_map();
        file_entry.set_at(
            &Path::parse("source")?,
            Value::from(local.to_string_lossy().into_owned()),
        )?;
        let mut entry = Value::empty_map();
        entry.set_at(&Path::parse("files")?, Value::from(vec![file_entry]))?;
        if notebook {
            entry.set_at(&Path::parse("notebook")?, Value::from(true))?;
        }
        bundle.tree.set_at(&artifact_path, entry)?;
    }

    bundle.tree.set_at(
        &reference.node_path,
        Value::from(format!("${{artifacts.{slug}.remote_path}}"))
            .with_location(reference.location.clone()),
    )?;
    Ok(())
}

/// Resolves a relative reference against `base`, trying notebook extensions
/// when the bare path is missing.
fn resolve_local(base: &StdPath, raw: &str, notebook_hint: bool) -> Option<PathBuf> {
    let candidate = base.join(raw);
    if candidate.is_file() {
        return Some(candidate);
    }
    if notebook_hint {
        for ext in NOTEBOOK_EXTENSIONS {
            let with_ext = base.join(format!("{raw}.{ext}"));
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
    }
    None
}

/// A stable artifact key for a local file, derived from its path relative
/// to the bundle root.
fn slugify(local: &StdPath, root: &StdPath) -> String {
    let relative = local.strip_prefix(root).unwrap_or(local);
    relative
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::load_str;
    use crate::mutator::apply;
    use crate::sync::notebook::NOTEBOOK_MARKER;
    use tempfile::TempDir;

    async fn bundle_with_tree(dir: &TempDir, source: &str) -> Bundle {
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        let file = dir.path().join("lakeward.yml");
        bundle.tree = load_str(source, &file).expect("parse");
        bundle
    }

    #[tokio::test]
    async fn test_notebook_reference_becomes_artifact() {
        let dir = TempDir::new().expect("tempdir");
        tokio::fs::create_dir_all(dir.path().join("src"))
            .await
            .expect("mkdir");
        tokio::fs::write(
            dir.path().join("src/run.py"),
            format!("{NOTEBOOK_MARKER}\nprint(1)\n"),
        )
        .await
        .expect("write");

        let mut bundle = bundle_with_tree(
            &dir,
            concat!(
                "resources:\n  jobs:\n    j:\n      tasks:\n",
                "        - task_key: t\n          notebook_task:\n",
                "            notebook_path: src/run\n",
            ),
        )
        .await;

        let diags = apply(&mut bundle, &TranslatePaths).await;
        assert!(!diags.has_error());

        let rewritten = bundle
            .tree
            .get_str_path("resources.jobs.j.tasks[0].notebook_task.notebook_path")
            .and_then(Value::as_str)
            .expect("rewritten");
        assert_eq!(rewritten, "${artifacts.src_run_py.remote_path}");

        let artifact = bundle
            .tree
            .get_str_path("artifacts.src_run_py")
            .expect("artifact entry");
        assert_eq!(
            artifact.get_str_path("notebook").and_then(Value::as_bool),
            Some(true)
        );
        assert!(artifact
            .get_str_path("files[0].source")
            .and_then(Value::as_str)
            .expect("source")
            .ends_with("src/run.py"));
    }

    #[tokio::test]
    async fn test_missing_path_is_fatal_with_location() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = bundle_with_tree(
            &dir,
            concat!(
                "resources:\n  jobs:\n    j:\n      tasks:\n",
                "        - task_key: t\n          spark_python_task:\n",
                "            python_file: src/gone.py\n",
            ),
        )
        .await;

        let diags = apply(&mut bundle, &TranslatePaths).await;
        assert!(diags.has_error());
        assert!(diags.first_error().expect("error").location.is_some());
    }

    #[tokio::test]
    async fn test_absolute_and_interpolated_paths_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = bundle_with_tree(
            &dir,
            concat!(
                "resources:\n  jobs:\n    j:\n      tasks:\n",
                "        - task_key: t\n          notebook_task:\n",
                "            notebook_path: /Workspace/Shared/run\n",
                "        - task_key: u\n          notebook_task:\n",
                "            notebook_path: \"${var.notebook}\"\n",
            ),
        )
        .await;

        let diags = apply(&mut bundle, &TranslatePaths).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle
                .tree
                .get_str_path("resources.jobs.j.tasks[0].notebook_task.notebook_path")
                .and_then(Value::as_str),
            Some("/Workspace/Shared/run")
        );
        assert!(bundle.tree.get_str_path("artifacts").is_none());
    }
}

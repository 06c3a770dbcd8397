//! Target selection and merging.
//!
//! Three mutators run in order across the load and initialize phases:
//! [`RewriteEnvironments`] migrates the legacy `environments` key,
//! [`SelectTarget`] decides which target this invocation deploys, and
//! [`MergeTarget`] folds the selected target's overrides into the root
//! config and drops the `targets` section.

use std::path::Path as StdPath;

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::Bundle;
use crate::config::{loader, yaml};
use crate::dynvalue::{merge, Path, Value};
use crate::error::{ConfigError, LakewardError};
use crate::mutator::{Diagnostic, Diagnostics, Mutator};

/// Sections of a target that merge over the same-named root section.
const MERGED_SECTIONS: [&str; 8] = [
    "workspace",
    "resources",
    "artifacts",
    "variables",
    "sync",
    "run_as",
    "permissions",
    "git",
];

/// Rewrites the legacy `environments` section to `targets`.
pub struct RewriteEnvironments;

#[async_trait]
impl Mutator for RewriteEnvironments {
    fn name(&self) -> &'static str {
        "RewriteEnvironments"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let Some(environments) = bundle.tree.get_str_path("environments") else {
            return Diagnostics::new();
        };
        if let Some(targets) = bundle.tree.get_str_path("targets") {
            return Diagnostics::from_error(LakewardError::Config(
                ConfigError::EnvironmentsAndTargets {
                    environments: environments.location().clone(),
                    targets: targets.location().clone(),
                },
            ));
        }
        let location = environments.location().clone();
        let Some(node) = bundle.tree.remove_at(&Path::parse("environments").expect("static path"))
        else {
            return Diagnostics::new();
        };
        if let Err(err) = bundle
            .tree
            .set_at(&Path::parse("targets").expect("static path"), node)
        {
            return Diagnostics::from_error(err);
        }
        Diagnostics::single(
            Diagnostic::warning("'environments' is deprecated, rename it to 'targets'")
                .with_location(location),
        )
    }
}

/// Selects the target this invocation operates on.
///
/// Priority: the `--target` flag, then the single target marked `default`,
/// then the only declared target. Writes the decision to `bundle.target` in
/// the tree.
pub struct SelectTarget;

#[async_trait]
impl Mutator for SelectTarget {
    fn name(&self) -> &'static str {
        "SelectTarget"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let selected = match select_name(bundle) {
            Ok(name) => name,
            Err(err) => return Diagnostics::from_error(err),
        };
        if let Err(err) = bundle.tree.set_at(
            &Path::parse("bundle.target").expect("static path"),
            Value::from(selected),
        ) {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

fn select_name(bundle: &Bundle) -> crate::error::Result<String> {
    let targets = bundle
        .tree
        .get_str_path("targets")
        .and_then(Value::as_map);

    if let Some(requested) = &bundle.target {
        let known = targets.is_some_and(|map| map.contains_key(requested));
        if !known {
            return Err(LakewardError::Config(ConfigError::UnknownTarget {
                name: requested.clone(),
            }));
        }
        return Ok(requested.clone());
    }

    let Some(targets) = targets else {
        return Err(LakewardError::Config(ConfigError::NoDefaultTarget));
    };
    let defaults: Vec<&String> = targets
        .iter()
        .filter(|(_, v)| {
            v.get_str_path("default")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .map(|(k, _)| k)
        .collect();
    match defaults.as_slice() {
        [single] => Ok((*single).clone()),
        [] if targets.len() == 1 => Ok(targets.keys().next().expect("non-empty").clone()),
        [] => Err(LakewardError::Config(ConfigError::NoDefaultTarget)),
        multiple => Err(LakewardError::internal(format!(
            "multiple default targets defined: {}",
            multiple
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Merges the selected target's overrides into the root config.
pub struct MergeTarget;

#[async_trait]
impl Mutator for MergeTarget {
    fn name(&self) -> &'static str {
        "MergeTarget"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let Some(name) = bundle
            .tree
            .get_str_path("bundle.target")
            .and_then(Value::as_str)
            .map(ToString::to_string)
        else {
            return Diagnostics::single(Diagnostic::error("no target selected before merge"));
        };

        let target_path = match Path::parse(&format!("targets.{name}")) {
            Ok(p) => p,
            Err(err) => return Diagnostics::from_error(err.into()),
        };
        let Some(target) = bundle.tree.remove_at(&target_path) else {
            // Target with no overrides.
            bundle.tree.remove_at(&Path::parse("targets").expect("static path"));
            return Diagnostics::new();
        };

        let target = match splice_includes(bundle, target).await {
            Ok(target) => target,
            Err(err) => return Diagnostics::from_error(err),
        };
        if let Err(err) = merge_sections(bundle, target) {
            return Diagnostics::from_error(err);
        }
        bundle.tree.remove_at(&Path::parse("targets").expect("static path"));
        Diagnostics::new()
    }
}

/// Merges files named by a target-level `include` over the target subtree.
///
/// Patterns resolve relative to the file that declared the include (the
/// bundle root for synthetic nodes), with the same validation as root-level
/// includes.
async fn splice_includes(bundle: &Bundle, mut target: Value) -> crate::error::Result<Value> {
    let Some(include) = target.remove_at(&Path::parse("include").expect("static path")) else {
        return Ok(target);
    };
    let base = if include.location().is_synthetic() {
        bundle.root.clone()
    } else {
        include
            .location()
            .file
            .parent()
            .map_or_else(|| bundle.root.clone(), StdPath::to_path_buf)
    };
    for pattern in loader::include_entries(&include)? {
        for file in loader::resolve_pattern(&base, &pattern)? {
            debug!(file = %file.display(), "splicing target include");
            let overlay = yaml::load_file(&file).await?;
            target = merge(target, overlay)?;
        }
    }
    Ok(target)
}

fn merge_sections(bundle: &mut Bundle, mut target: Value) -> crate::error::Result<()> {
    if let Some(mode) = target.remove_at(&Path::parse("mode")?) {
        bundle.tree.set_at(&Path::parse("bundle.mode")?, mode)?;
    }
    target.remove_at(&Path::parse("default")?);

    for section in MERGED_SECTIONS {
        let path = Path::parse(section)?;
        let Some(overlay) = target.remove_at(&path) else {
            continue;
        };
        let base = bundle.tree.remove_at(&path).unwrap_or_else(Value::invalid);
        let merged = merge(base, overlay)?;
        bundle.tree.set_at(&path, merged)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::load_str;
    use crate::mutator::apply;
    use std::path::Path as StdPath;
    use tempfile::TempDir;

    fn bundle_from(source: &str) -> Bundle {
        let mut bundle = Bundle::for_tests();
        bundle.tree = load_str(source, StdPath::new("lakeward.yml")).expect("parse");
        bundle
    }

    #[tokio::test]
    async fn test_environments_rewrite_warns() {
        let mut bundle = bundle_from("environments:\n  dev:\n    default: true\n");
        let diags = apply(&mut bundle, &RewriteEnvironments).await;
        assert!(!diags.has_error());
        assert_eq!(diags.len(), 1);
        assert!(bundle.tree.get_str_path("targets.dev").is_some());
        assert!(bundle.tree.get_str_path("environments").is_none());
    }

    #[tokio::test]
    async fn test_environments_and_targets_conflict() {
        let mut bundle = bundle_from("environments:\n  a: {}\ntargets:\n  b: {}\n");
        let diags = apply(&mut bundle, &RewriteEnvironments).await;
        assert!(diags.has_error());
    }

    #[tokio::test]
    async fn test_select_explicit_target() {
        let mut bundle = bundle_from("targets:\n  dev: {}\n  prod: {}\n");
        bundle.target = Some(String::from("prod"));
        let diags = apply(&mut bundle, &SelectTarget).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle.tree.get_str_path("bundle.target").and_then(Value::as_str),
            Some("prod")
        );
    }

    #[tokio::test]
    async fn test_select_unknown_target_fails() {
        let mut bundle = bundle_from("targets:\n  dev: {}\n");
        bundle.target = Some(String::from("staging"));
        let diags = apply(&mut bundle, &SelectTarget).await;
        assert!(diags.has_error());
    }

    #[tokio::test]
    async fn test_select_default_target() {
        let mut bundle =
            bundle_from("targets:\n  dev:\n    default: true\n  prod: {}\n");
        let diags = apply(&mut bundle, &SelectTarget).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle.tree.get_str_path("bundle.target").and_then(Value::as_str),
            Some("dev")
        );
    }

    #[tokio::test]
    async fn test_sole_target_is_implicit_default() {
        let mut bundle = bundle_from("targets:\n  only: {}\n");
        let diags = apply(&mut bundle, &SelectTarget).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle.tree.get_str_path("bundle.target").and_then(Value::as_str),
            Some("only")
        );
    }

    #[tokio::test]
    async fn test_target_include_splices_sibling_file() {
        let dir = TempDir::new().expect("tempdir");
        tokio::fs::write(
            dir.path().join("prod-extra.yml"),
            "workspace:\n  host: https://spliced\n",
        )
        .await
        .expect("write");

        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle.tree = load_str(
            concat!(
                "targets:\n  prod:\n    include:\n      - prod-extra.yml\n",
                "    workspace:\n      root_path: /kept\n",
            ),
            &dir.path().join("lakeward.yml"),
        )
        .expect("parse");
        bundle.target = Some(String::from("prod"));
        assert!(!apply(&mut bundle, &SelectTarget).await.has_error());

        let diags = apply(&mut bundle, &MergeTarget).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle.tree.get_str_path("workspace.host").and_then(Value::as_str),
            Some("https://spliced")
        );
        assert_eq!(
            bundle
                .tree
                .get_str_path("workspace.root_path")
                .and_then(Value::as_str),
            Some("/kept")
        );
    }

    #[tokio::test]
    async fn test_merge_folds_overrides_and_drops_targets() {
        let mut bundle = bundle_from(concat!(
            "bundle:\n  name: etl\n",
            "workspace:\n  host: https://base\n",
            "resources:\n  jobs:\n    nightly:\n      name: nightly\n",
            "targets:\n  prod:\n    mode: production\n",
            "    workspace:\n      host: https://prod\n",
            "    resources:\n      jobs:\n        nightly:\n          max_concurrent_runs: 1\n",
        ));
        bundle.target = Some(String::from("prod"));
        assert!(!apply(&mut bundle, &SelectTarget).await.has_error());
        let diags = apply(&mut bundle, &MergeTarget).await;
        assert!(!diags.has_error());

        assert_eq!(
            bundle.tree.get_str_path("workspace.host").and_then(Value::as_str),
            Some("https://prod")
        );
        assert_eq!(
            bundle
                .tree
                .get_str_path("resources.jobs.nightly.name")
                .and_then(Value::as_str),
            Some("nightly")
        );
        assert_eq!(
            bundle
                .tree
                .get_str_path("resources.jobs.nightly.max_concurrent_runs")
                .and_then(Value::as_int),
            Some(1)
        );
        assert_eq!(
            bundle.tree.get_str_path("bundle.mode").and_then(Value::as_str),
            Some("production")
        );
        assert!(bundle.tree.get_str_path("targets").is_none());
    }
}

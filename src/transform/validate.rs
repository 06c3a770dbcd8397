//! Resource validation.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::bundle::Bundle;
use crate::dynvalue::{Location, Value};
use crate::error::{ConfigError, LakewardError};
use crate::mutator::{Diagnostic, Diagnostics, Mutator};

/// Rejects resource keys reused across resource types.
///
/// Running a resource by key must be unambiguous, so `resources.jobs.x` and
/// `resources.pipelines.x` cannot coexist. The diagnostic lists every
/// location that defines the key.
pub struct ValidateUniqueResourceKeys;

#[async_trait]
impl Mutator for ValidateUniqueResourceKeys {
    fn name(&self) -> &'static str {
        "ValidateUniqueResourceKeys"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let mut seen: IndexMap<String, Vec<Location>> = IndexMap::new();
        let Some(types) = bundle
            .tree
            .get_str_path("resources")
            .and_then(Value::as_map)
        else {
            return Diagnostics::new();
        };
        for entries in types.values().filter_map(Value::as_map) {
            for (key, value) in entries {
                seen.entry(key.clone())
                    .or_default()
                    .extend(value.locations().cloned());
            }
        }

        let mut diags = Diagnostics::new();
        for (key, locations) in seen {
            if locations.len() > 1 {
                diags.push(Diagnostic::from(LakewardError::Config(
                    ConfigError::DuplicateResourceKey { key, locations },
                )));
            }
        }
        diags
    }
}

/// Rejects resource settings redefined across source files.
///
/// The file that first declares a resource is its origin. Other files may
/// contribute to it, adding new settings or appending sequence elements,
/// but writing a setting the origin (or an earlier include) already set
/// splits the definition. Runs before target merging; target overrides may
/// later legitimately rewrite any setting.
pub struct ValidateSingleOrigin;

#[async_trait]
impl Mutator for ValidateSingleOrigin {
    fn name(&self) -> &'static str {
        "ValidateSingleOrigin"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(types) = bundle
            .tree
            .get_str_path("resources")
            .and_then(Value::as_map)
        else {
            return diags;
        };
        for (type_name, entries) in types {
            let Some(entries) = entries.as_map() else {
                continue;
            };
            for (key, value) in entries {
                value.foreach(&mut |path, node| {
                    if node.as_map().is_some() || node.as_sequence().is_some() {
                        return;
                    }
                    let mut files: Vec<&std::path::Path> = node
                        .locations()
                        .map(|l| l.file.as_path())
                        .filter(|f| !f.as_os_str().is_empty())
                        .collect();
                    files.sort_unstable();
                    files.dedup();
                    if files.len() > 1 {
                        let listed = files
                            .iter()
                            .map(|f| f.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ");
                        diags.push(
                            Diagnostic::error(format!(
                                "setting '{path}' of resource '{type_name}.{key}' is defined \
                                 in multiple files: {listed}"
                            ))
                            .with_location(node.location().clone()),
                        );
                    }
                });
            }
        }
        diags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::load_str;
    use crate::dynvalue::merge;
    use crate::mutator::apply;
    use std::path::Path as StdPath;

    #[tokio::test]
    async fn test_duplicate_key_across_types_lists_all_locations() {
        let mut bundle = Bundle::for_tests();
        bundle.tree = load_str(
            "resources:\n  jobs:\n    etl: {}\n  pipelines:\n    etl: {}\n",
            StdPath::new("root.yml"),
        )
        .expect("parse");

        let diags = apply(&mut bundle, &ValidateUniqueResourceKeys).await;
        assert!(diags.has_error());
        let first = diags.first_error().expect("error");
        assert!(first.summary.contains("etl"));
        assert!(first.summary.contains("root.yml:3"));
        assert!(first.summary.contains("root.yml:5"));
    }

    #[tokio::test]
    async fn test_unique_keys_pass() {
        let mut bundle = Bundle::for_tests();
        bundle.tree = load_str(
            "resources:\n  jobs:\n    a: {}\n  pipelines:\n    b: {}\n",
            StdPath::new("root.yml"),
        )
        .expect("parse");
        let diags = apply(&mut bundle, &ValidateUniqueResourceKeys).await;
        assert!(!diags.has_error());
    }

    #[tokio::test]
    async fn test_redefined_setting_rejected() {
        let base = load_str(
            "resources:\n  jobs:\n    etl:\n      name: etl\n",
            StdPath::new("a.yml"),
        )
        .expect("parse a");
        let overlay = load_str(
            "resources:\n  jobs:\n    etl:\n      name: renamed\n",
            StdPath::new("b.yml"),
        )
        .expect("parse b");
        let mut bundle = Bundle::for_tests();
        bundle.tree = merge(base, overlay).expect("merge");

        let diags = apply(&mut bundle, &ValidateSingleOrigin).await;
        assert!(diags.has_error());
        let first = diags.first_error().expect("error");
        assert!(first.summary.contains("name"));
        assert!(first.summary.contains("a.yml"));
        assert!(first.summary.contains("b.yml"));
    }

    #[tokio::test]
    async fn test_include_may_contribute_to_declared_resource() {
        let base = load_str(
            concat!(
                "resources:\n  jobs:\n    j:\n      tasks:\n",
                "        - task_key: first\n",
            ),
            StdPath::new("root.yml"),
        )
        .expect("parse root");
        let overlay = load_str(
            concat!(
                "resources:\n  jobs:\n    j:\n      max_concurrent_runs: 2\n",
                "      tasks:\n        - task_key: second\n",
            ),
            StdPath::new("include.yml"),
        )
        .expect("parse include");
        let mut bundle = Bundle::for_tests();
        bundle.tree = merge(base, overlay).expect("merge");

        let diags = apply(&mut bundle, &ValidateSingleOrigin).await;
        assert!(!diags.has_error());

        let tasks = bundle
            .tree
            .get_str_path("resources.jobs.j.tasks")
            .and_then(Value::as_sequence)
            .expect("tasks");
        assert_eq!(tasks.len(), 2);
        assert!(tasks[1]
            .get_str_path("task_key")
            .expect("key")
            .location()
            .file
            .ends_with("include.yml"));
    }
}

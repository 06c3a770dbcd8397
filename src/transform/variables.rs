//! Variable initialization and lookup resolution.

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::Bundle;
use crate::dynvalue::{Path, Value};
use crate::error::{ConfigError, LakewardError};
use crate::mutator::{Diagnostics, Mutator};
use crate::workspace::{with_retries, DEFAULT_ATTEMPTS};

/// Environment variable prefix for variable overrides.
pub const ENV_VAR_PREFIX: &str = "BUNDLE_VAR_";

/// Binds a value to each declared variable.
///
/// Priority per variable: a `--var` override, the `BUNDLE_VAR_<name>`
/// environment variable, then the declared default. A variable that ends the
/// pass with no value is only an error once something references it.
pub struct InitVariables;

#[async_trait]
impl Mutator for InitVariables {
    fn name(&self) -> &'static str {
        "InitVariables"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let declared: Vec<String> = bundle
            .tree
            .get_str_path("variables")
            .and_then(Value::as_map)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();

        for name in bundle.var_overrides.keys() {
            if !declared.contains(name) {
                return Diagnostics::from_error(LakewardError::Config(
                    ConfigError::UndeclaredVariable { name: name.clone() },
                ));
            }
        }

        for name in declared {
            let assigned = bundle
                .var_overrides
                .get(&name)
                .cloned()
                .or_else(|| std::env::var(format!("{ENV_VAR_PREFIX}{name}")).ok());
            let Some(value) = assigned else {
                continue;
            };
            let path = match Path::parse(&format!("variables.{name}.value")) {
                Ok(p) => p,
                Err(err) => return Diagnostics::from_error(err.into()),
            };
            if let Err(err) = bundle.tree.set_at(&path, Value::from(value)) {
                return Diagnostics::from_error(err);
            }
        }
        Diagnostics::new()
    }
}

/// Resolves lookup-type variables through the workspace client.
///
/// Runs after interpolation so lookup names may themselves use variables.
/// A lookup only runs when the variable has no value yet.
pub struct ResolveLookups;

#[async_trait]
impl Mutator for ResolveLookups {
    fn name(&self) -> &'static str {
        "ResolveLookups"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        let pending: Vec<(String, &'static str, String)> = bundle
            .config
            .variables
            .iter()
            .filter(|(_, spec)| spec.value.is_none())
            .filter_map(|(name, spec)| {
                spec.lookup
                    .as_ref()
                    .and_then(crate::config::Lookup::field)
                    .map(|(kind, target)| (name.clone(), kind, target.to_string()))
            })
            .collect();
        if pending.is_empty() {
            return Diagnostics::new();
        }

        let workspace = match bundle.workspace() {
            Ok(ws) => ws,
            Err(err) => return Diagnostics::from_error(err),
        };
        for (name, kind, target) in pending {
            let resolved = with_retries("lookup", DEFAULT_ATTEMPTS, || {
                workspace.resolve_lookup(kind, &target)
            })
            .await;
            match resolved {
                Ok(id) => {
                    debug!(variable = %name, kind, target = %target, id = %id, "lookup resolved");
                    let path = match Path::parse(&format!("variables.{name}.value")) {
                        Ok(p) => p,
                        Err(err) => return Diagnostics::from_error(err.into()),
                    };
                    if let Err(err) = bundle.tree.set_at(&path, Value::from(id)) {
                        return Diagnostics::from_error(err);
                    }
                }
                Err(err) => return Diagnostics::from_error(err),
            }
        }
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::load_str;
    use crate::mutator::apply;
    use std::path::Path as StdPath;
    use std::sync::Arc;

    fn bundle_from(source: &str) -> Bundle {
        let mut bundle = Bundle::for_tests();
        bundle.tree = load_str(source, StdPath::new("lakeward.yml")).expect("parse");
        bundle
    }

    #[tokio::test]
    async fn test_override_beats_default() {
        let mut bundle = bundle_from("variables:\n  size:\n    default: 2\n");
        bundle
            .var_overrides
            .insert(String::from("size"), String::from("8"));
        let diags = apply(&mut bundle, &InitVariables).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle
                .tree
                .get_str_path("variables.size.value")
                .and_then(Value::as_str),
            Some("8")
        );
    }

    #[tokio::test]
    async fn test_default_left_for_interpolation() {
        let mut bundle = bundle_from("variables:\n  size:\n    default: 2\n");
        let diags = apply(&mut bundle, &InitVariables).await;
        assert!(!diags.has_error());
        assert!(bundle.tree.get_str_path("variables.size.value").is_none());
    }

    #[tokio::test]
    async fn test_undeclared_override_fails() {
        let mut bundle = bundle_from("variables:\n  size: {}\n");
        bundle
            .var_overrides
            .insert(String::from("missing"), String::from("1"));
        let diags = apply(&mut bundle, &InitVariables).await;
        assert!(diags.has_error());
    }

    #[tokio::test]
    async fn test_lookup_resolves_through_workspace() {
        let mut bundle = bundle_from(
            "variables:\n  warehouse_id:\n    lookup:\n      warehouse: main\n",
        );
        let dir = tempfile::TempDir::new().expect("tempdir");
        let mut ws = crate::workspace::FsWorkspace::new(
            dir.path(),
            crate::config::User {
                user_name: String::from("dev@example.com"),
                display_name: None,
            },
        );
        ws.register_lookup("warehouse", "main", "wh-42");
        bundle.set_workspace(Arc::new(ws));

        let diags = apply(&mut bundle, &ResolveLookups).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle
                .tree
                .get_str_path("variables.warehouse_id.value")
                .and_then(Value::as_str),
            Some("wh-42")
        );
    }

    #[tokio::test]
    async fn test_lookup_skipped_when_value_set() {
        let mut bundle = bundle_from(concat!(
            "variables:\n  warehouse_id:\n    value: preset\n",
            "    lookup:\n      warehouse: main\n",
        ));
        // No workspace attached: would fail if the lookup ran.
        let diags = apply(&mut bundle, &ResolveLookups).await;
        assert!(!diags.has_error());
    }
}

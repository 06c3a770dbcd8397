//! Configuration loading mutator.

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::Bundle;
use crate::config::loader;
use crate::dynvalue::Value;
use crate::mutator::{Diagnostics, Mutator};
use crate::phases::scripts::run_hook;

/// Loads the configuration tree from disk.
///
/// The root file is parsed first so a `preinit` hook, which may generate
/// further configuration files, runs before the `include` section expands.
pub struct LoadFiles;

#[async_trait]
impl Mutator for LoadFiles {
    fn name(&self) -> &'static str {
        "LoadFiles"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let mut tree = match loader::load_root(&bundle.root).await {
            Ok(tree) => tree,
            Err(err) => return Diagnostics::from_error(err),
        };

        let preinit = tree
            .get_str_path("experimental.scripts.preinit")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        if let Some(command) = preinit {
            if let Err(err) = run_hook("preinit", &command, &bundle.root).await {
                return Diagnostics::from_error(err);
            }
            // The hook may have rewritten the root file.
            tree = match loader::load_root(&bundle.root).await {
                Ok(tree) => tree,
                Err(err) => return Diagnostics::from_error(err),
            };
        }

        let (tree, files) = match loader::expand_includes(&bundle.root, tree).await {
            Ok(loaded) => loaded,
            Err(err) => return Diagnostics::from_error(err),
        };
        debug!(files = files.len(), "configuration loaded");
        bundle.tree = tree;
        bundle.config_files = files;
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

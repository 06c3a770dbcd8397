//! Current-user population and workspace path defaults.

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::Bundle;
use crate::mutator::{Diagnostics, Mutator};
use crate::workspace::{with_retries, DEFAULT_ATTEMPTS};

/// Fetches the authenticated identity into `workspace.current_user`.
pub struct PopulateCurrentUser;

#[async_trait]
impl Mutator for PopulateCurrentUser {
    fn name(&self) -> &'static str {
        "PopulateCurrentUser"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let workspace = match bundle.workspace() {
            Ok(ws) => ws,
            Err(err) => return Diagnostics::from_error(err),
        };
        let user = match with_retries("current_user", DEFAULT_ATTEMPTS, || workspace.current_user())
            .await
        {
            Ok(user) => user,
            Err(err) => return Diagnostics::from_error(err),
        };
        debug!(user = %user.user_name, "authenticated");
        bundle.config.workspace.current_user = Some(user);
        if let Err(err) = bundle.commit_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

/// Derives `workspace.root_path` and the artifact/file/state paths under it
/// when they are not configured.
pub struct DefaultWorkspacePaths;

#[async_trait]
impl Mutator for DefaultWorkspacePaths {
    fn name(&self) -> &'static str {
        "DefaultWorkspacePaths"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        let workspace = &mut bundle.config.workspace;
        if workspace.root_path.is_none() {
            let Some(user) = &workspace.current_user else {
                return Diagnostics::single(crate::mutator::Diagnostic::error(
                    "cannot derive workspace.root_path without an authenticated user",
                ));
            };
            workspace.root_path = Some(format!(
                "/Workspace/Users/{}/.bundle/{}/{}",
                user.user_name,
                bundle.config.bundle.name,
                bundle
                    .config
                    .bundle
                    .target
                    .as_deref()
                    .unwrap_or("default"),
            ));
        }
        let root = workspace.root_path.clone().expect("set above");
        let root = root.trim_end_matches('/');
        workspace
            .artifact_path
            .get_or_insert_with(|| format!("{root}/artifacts"));
        workspace
            .file_path
            .get_or_insert_with(|| format!("{root}/files"));
        workspace
            .state_path
            .get_or_insert_with(|| format!("{root}/state"));

        if let Err(err) = bundle.commit_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::User;
    use crate::mutator::apply;

    #[tokio::test]
    async fn test_paths_derived_from_root() {
        let mut bundle = Bundle::for_tests();
        bundle.config.bundle.name = String::from("etl");
        bundle.config.bundle.target = Some(String::from("dev"));
        bundle.config.workspace.current_user = Some(User {
            user_name: String::from("jane@example.com"),
            display_name: None,
        });
        bundle.commit_typed().expect("commit");

        let diags = apply(&mut bundle, &DefaultWorkspacePaths).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle.config.workspace.root_path.as_deref(),
            Some("/Workspace/Users/jane@example.com/.bundle/etl/dev")
        );
        assert_eq!(
            bundle.config.workspace.file_path.as_deref(),
            Some("/Workspace/Users/jane@example.com/.bundle/etl/dev/files")
        );
        assert_eq!(
            bundle.config.workspace.state_path.as_deref(),
            Some("/Workspace/Users/jane@example.com/.bundle/etl/dev/state")
        );
    }

    #[tokio::test]
    async fn test_configured_paths_kept() {
        let mut bundle = Bundle::for_tests();
        bundle.config.workspace.root_path = Some(String::from("/Shared/bundles/etl"));
        bundle.config.workspace.artifact_path = Some(String::from("/Volumes/wheels"));
        bundle.commit_typed().expect("commit");

        let diags = apply(&mut bundle, &DefaultWorkspacePaths).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle.config.workspace.artifact_path.as_deref(),
            Some("/Volumes/wheels")
        );
        assert_eq!(
            bundle.config.workspace.file_path.as_deref(),
            Some("/Shared/bundles/etl/files")
        );
    }
}

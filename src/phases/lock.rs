//! Deployment lock mutators.
//!
//! The lock lives in the remote state area and keeps concurrent deploys of
//! the same target from interleaving. Locking can be disabled per bundle;
//! `--force-lock` or `deployment.lock.force` steals a live lock.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::bundle::Bundle;
use crate::mutator::{Diagnostic, Diagnostics, Mutator};
use crate::workspace::{holder_id, with_retries, DEFAULT_ATTEMPTS};

/// Acquires the deployment lock.
pub struct AcquireLock;

#[async_trait]
impl Mutator for AcquireLock {
    fn name(&self) -> &'static str {
        "AcquireLock"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let options = &bundle.config.bundle.deployment.lock;
        if !options.is_enabled() {
            return Diagnostics::single(Diagnostic::info("deployment lock is disabled"));
        }
        let force = bundle.force_lock || options.force;

        let state_path = match bundle.state_path() {
            Ok(path) => path.to_string(),
            Err(err) => return Diagnostics::from_error(err),
        };
        let workspace = match bundle.workspace() {
            Ok(ws) => ws,
            Err(err) => return Diagnostics::from_error(err),
        };
        let holder = holder_id();
        let lock = match with_retries("lock acquire", DEFAULT_ATTEMPTS, || {
            workspace.acquire_lock(&state_path, &holder, force)
        })
        .await
        {
            Ok(lock) => lock,
            Err(err) => return Diagnostics::from_error(err),
        };
        info!(lock_id = %lock.lock_id, holder = %lock.holder, "deployment lock acquired");
        bundle.lock = Some(lock);

        if force {
            return Diagnostics::single(Diagnostic::warning(
                "deployment lock was taken by force; a concurrent deploy may be disrupted",
            ));
        }
        Diagnostics::new()
    }
}

/// Releases the deployment lock held by this invocation.
///
/// A release failure is reported as a warning: the lock expires on its own
/// and the deployment itself already succeeded.
pub struct ReleaseLock;

#[async_trait]
impl Mutator for ReleaseLock {
    fn name(&self) -> &'static str {
        "ReleaseLock"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let Some(lock) = bundle.lock.take() else {
            return Diagnostics::new();
        };
        let state_path = match bundle.state_path() {
            Ok(path) => path.to_string(),
            Err(err) => return Diagnostics::from_error(err),
        };
        let workspace = match bundle.workspace() {
            Ok(ws) => ws,
            Err(err) => return Diagnostics::from_error(err),
        };
        match with_retries("lock release", DEFAULT_ATTEMPTS, || {
            workspace.release_lock(&state_path, &lock.lock_id)
        })
        .await
        {
            Ok(()) => Diagnostics::new(),
            Err(err) => {
                warn!(error = %err, "could not release deployment lock");
                Diagnostics::single(Diagnostic::warning(format!(
                    "could not release deployment lock (it will expire): {err}"
                )))
            }
        }
    }
}

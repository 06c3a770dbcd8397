//! Interpolation mutators.
//!
//! Thin wrappers over [`crate::dynvalue::interpolate`] so phases can run
//! scoped passes: the initialize phase resolves `bundle.*`, `workspace.*`,
//! and `var.*` while leaving `resources.*` references for the IaC render,
//! and the build phase later resolves `artifacts.*`.

use async_trait::async_trait;

use crate::bundle::Bundle;
use crate::dynvalue::interpolate;
use crate::mutator::{Diagnostics, Mutator};

/// Resolves `${...}` references whose first segment is in `scopes`.
pub struct InterpolateScoped {
    scopes: &'static [&'static str],
}

impl InterpolateScoped {
    /// Interpolation pass over the given reference scopes.
    #[must_use]
    pub const fn new(scopes: &'static [&'static str]) -> Self {
        Self { scopes }
    }
}

#[async_trait]
impl Mutator for InterpolateScoped {
    fn name(&self) -> &'static str {
        "InterpolateScoped"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let tree = std::mem::replace(&mut bundle.tree, crate::dynvalue::Value::invalid());
        match interpolate(tree, self.scopes) {
            Ok(tree) => {
                bundle.tree = tree;
                if let Err(err) = bundle.refresh_typed() {
                    return Diagnostics::from_error(err);
                }
                Diagnostics::new()
            }
            Err(err) => Diagnostics::from_error(err),
        }
    }
}

//! The mutator framework.
//!
//! A mutator is a named unit of work over a bundle: `apply` inspects or
//! rewrites the bundle and reports diagnostics. Phases are sequences of
//! mutators; [`apply_seq`] runs them in order, stopping at the first error
//! while always returning the accumulated list. Every mutator run logs
//! start/complete/failed events.

mod diag;

pub use diag::{Diagnostic, Diagnostics, Severity};

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::bundle::Bundle;

/// A named unit of work over a bundle.
#[async_trait]
pub trait Mutator: Send + Sync {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Applies the mutator to the bundle.
    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics;
}

/// Runs a single mutator with start/complete/failed logging.
pub async fn apply(bundle: &mut Bundle, mutator: &dyn Mutator) -> Diagnostics {
    debug!(mutator = mutator.name(), "mutator start");
    let diags = mutator.apply(bundle).await;
    if diags.has_error() {
        error!(
            mutator = mutator.name(),
            summary = diags.first_error().map(|d| d.summary.as_str()),
            "mutator failed"
        );
    } else {
        debug!(mutator = mutator.name(), "mutator complete");
    }
    diags
}

/// Runs mutators in order, stopping at the first error diagnostic.
///
/// The returned list always contains everything reported up to and
/// including the failing mutator.
pub async fn apply_seq(bundle: &mut Bundle, mutators: &[Box<dyn Mutator>]) -> Diagnostics {
    let mut all = Diagnostics::new();
    for mutator in mutators {
        let diags = apply(bundle, mutator.as_ref()).await;
        let failed = diags.has_error();
        all.extend(diags);
        if failed {
            return all;
        }
    }
    info!(count = mutators.len(), "mutator sequence complete");
    all
}

/// Lifts a closure into a named mutator.
pub struct ApplyFunc<F> {
    name: &'static str,
    func: F,
}

impl<F> ApplyFunc<F>
where
    F: Fn(&mut Bundle) -> Diagnostics + Send + Sync,
{
    /// Creates a mutator from a synchronous closure.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

#[async_trait]
impl<F> Mutator for ApplyFunc<F>
where
    F: Fn(&mut Bundle) -> Diagnostics + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        (self.func)(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Bundle;

    struct Marker(&'static str, bool);

    #[async_trait]
    impl Mutator for Marker {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
            let seen = bundle
                .tree
                .get_str_path("seen")
                .and_then(crate::dynvalue::Value::as_str)
                .unwrap_or_default()
                .to_string();
            bundle
                .tree
                .set_at(
                    &crate::dynvalue::Path::parse("seen").expect("path"),
                    crate::dynvalue::Value::from(format!("{seen}{},", self.0)),
                )
                .expect("set");
            if self.1 {
                Diagnostics::single(Diagnostic::error(format!("{} failed", self.0)))
            } else {
                Diagnostics::new()
            }
        }
    }

    #[tokio::test]
    async fn test_seq_runs_in_order() {
        let mut bundle = Bundle::for_tests();
        let mutators: Vec<Box<dyn Mutator>> =
            vec![Box::new(Marker("a", false)), Box::new(Marker("b", false))];
        let diags = apply_seq(&mut bundle, &mutators).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle.tree.get_str_path("seen").and_then(crate::dynvalue::Value::as_str),
            Some("a,b,")
        );
    }

    #[tokio::test]
    async fn test_seq_stops_at_first_error() {
        let mut bundle = Bundle::for_tests();
        let mutators: Vec<Box<dyn Mutator>> = vec![
            Box::new(Marker("a", false)),
            Box::new(Marker("boom", true)),
            Box::new(Marker("c", false)),
        ];
        let diags = apply_seq(&mut bundle, &mutators).await;
        assert!(diags.has_error());
        assert_eq!(
            bundle.tree.get_str_path("seen").and_then(crate::dynvalue::Value::as_str),
            Some("a,boom,")
        );
    }

    #[tokio::test]
    async fn test_apply_func() {
        let mut bundle = Bundle::for_tests();
        let m = ApplyFunc::new("inline", |_b: &mut Bundle| {
            Diagnostics::single(Diagnostic::info("ran"))
        });
        let diags = apply(&mut bundle, &m).await;
        assert_eq!(diags.len(), 1);
        assert!(!diags.has_error());
    }
}

//! Folding of keyed sequences.
//!
//! File and target merges concatenate sequences, so a target override of a
//! job cluster produces two elements sharing a key. This pass folds such
//! sequences element-wise after all merges are done: job clusters by
//! `job_cluster_key`, tasks by `task_key`, pipeline clusters by `label`
//! (defaulting to `default`, lowercased).

use async_trait::async_trait;

use crate::bundle::Bundle;
use crate::dynvalue::{merge_keyed_elements, Pattern, Value, ValueData};
use crate::mutator::{Diagnostics, Mutator};

/// One keyed-sequence rule.
struct Rule {
    pattern: &'static str,
    key_field: &'static str,
    default_key: Option<&'static str>,
    lowercase: bool,
}

const RULES: [Rule; 3] = [
    Rule {
        pattern: "resources.jobs.*.job_clusters",
        key_field: "job_cluster_key",
        default_key: None,
        lowercase: false,
    },
    Rule {
        pattern: "resources.jobs.*.tasks",
        key_field: "task_key",
        default_key: None,
        lowercase: false,
    },
    Rule {
        pattern: "resources.pipelines.*.clusters",
        key_field: "label",
        default_key: Some("default"),
        lowercase: true,
    },
];

/// Folds all keyed sequences in the tree.
pub struct MergeKeyedSequences;

#[async_trait]
impl Mutator for MergeKeyedSequences {
    fn name(&self) -> &'static str {
        "MergeKeyedSequences"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        for rule in &RULES {
            let pattern = match Pattern::parse(rule.pattern) {
                Ok(p) => p,
                Err(err) => return Diagnostics::from_error(err.into()),
            };
            let tree = std::mem::replace(&mut bundle.tree, Value::invalid());
            let result = tree.map_by_pattern(&pattern, &mut |_, value| {
                if value.as_sequence().is_none() {
                    return Ok(value);
                }
                let (data, loc, extra, anchor) = value.into_parts();
                let ValueData::Sequence(elements) = data else {
                    unreachable!("checked above");
                };
                let folded = merge_keyed_elements(
                    elements,
                    rule.key_field,
                    rule.default_key,
                    rule.lowercase,
                )?;
                Ok(Value::assemble(
                    ValueData::Sequence(folded),
                    loc,
                    extra,
                    anchor,
                ))
            });
            match result {
                Ok(tree) => bundle.tree = tree,
                Err(err) => return Diagnostics::from_error(err),
            }
        }
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

//! Deep merge of dynamic values.
//!
//! Merge policy: operands must share a kind (nil merges with anything). Map
//! merge is recursive by key, right wins for leaves, and the base insertion
//! order is preserved with new keys appended. Sequences concatenate, base
//! first. A merged scalar keeps the override payload but records the base
//! locations as secondaries.
//!
//! Keyed sequences (job clusters by `job_cluster_key`, tasks by `task_key`,
//! pipeline clusters by `label`) do not merge here; they are folded
//! element-wise by [`merge_keyed_elements`], which the initialize phase
//! applies after all file and target merges are done.

use indexmap::IndexMap;

use crate::error::{ConfigError, LakewardError, Result};

use super::path::Path;
use super::value::{Value, ValueData};

/// Merges `override_value` over `base`, returning the combined value.
///
/// # Errors
///
/// Returns [`ConfigError::MergeKindMismatch`] when the operands have
/// different kinds and neither is nil.
pub fn merge(base: Value, override_value: Value) -> Result<Value> {
    let mut path = Path::root();
    merge_inner(base, override_value, &mut path)
}

fn merge_inner(base: Value, override_value: Value, path: &mut Path) -> Result<Value> {
    // Invalid operands behave as absent.
    if !base.is_valid() {
        return Ok(override_value);
    }
    if !override_value.is_valid() {
        return Ok(base);
    }
    // Nil yields to the other side but leaves its location behind.
    if base.is_nil() {
        let mut out = override_value;
        out.record_locations_of(&base);
        return Ok(out);
    }
    if override_value.is_nil() {
        let mut out = base;
        out.record_location(override_value.location().clone());
        return Ok(out);
    }

    if base.kind() != override_value.kind() {
        return Err(LakewardError::Config(ConfigError::MergeKindMismatch {
            left_kind: base.kind().to_string(),
            right_kind: override_value.kind().to_string(),
            path: path.to_string(),
        }));
    }

    match (base.into_parts(), override_value.into_parts()) {
        ((ValueData::Map(b), b_loc, b_extra, _), (ValueData::Map(o), o_loc, o_extra, anchor)) => {
            let merged = merge_maps(b, o, path)?;
            let mut out = Value::assemble(ValueData::Map(merged), b_loc, b_extra, anchor);
            out.record_location(o_loc);
            for loc in o_extra {
                out.record_location(loc);
            }
            Ok(out)
        }
        (
            (ValueData::Sequence(mut b), b_loc, b_extra, _),
            (ValueData::Sequence(o), o_loc, o_extra, anchor),
        ) => {
            b.extend(o);
            let mut out = Value::assemble(ValueData::Sequence(b), b_loc, b_extra, anchor);
            out.record_location(o_loc);
            for loc in o_extra {
                out.record_location(loc);
            }
            Ok(out)
        }
        ((_, b_loc, b_extra, _), (o_data, o_loc, o_extra, anchor)) => {
            // Scalar over scalar: override wins, both locations recorded.
            let mut out = Value::assemble(o_data, o_loc, o_extra, anchor);
            out.record_location(b_loc);
            for loc in b_extra {
                out.record_location(loc);
            }
            Ok(out)
        }
    }
}

fn merge_maps(
    base: IndexMap<String, Value>,
    override_map: IndexMap<String, Value>,
    path: &mut Path,
) -> Result<IndexMap<String, Value>> {
    let mut out = base;
    for (key, o_value) in override_map {
        path.push_key(key.clone());
        // Merging in place keeps the base insertion order; appending only
        // happens for keys the base never had.
        if let Some(slot) = out.get_mut(&key) {
            let b_value = std::mem::replace(slot, Value::invalid());
            *slot = merge_inner(b_value, o_value, path)?;
        } else {
            out.insert(key, o_value);
        }
        path.pop();
    }
    Ok(out)
}

/// Folds a sequence of maps element-wise by the value of `key_field`.
///
/// Elements sharing a key merge into the first occurrence, preserving its
/// position. Elements without the key field take `default_key` (lowercased
/// when `lowercase` is set); with no default they append positionally.
///
/// # Errors
///
/// Propagates merge kind mismatches between elements sharing a key.
pub fn merge_keyed_elements(
    elements: Vec<Value>,
    key_field: &str,
    default_key: Option<&str>,
    lowercase: bool,
) -> Result<Vec<Value>> {
    let key_path = Path::parse(key_field)?;
    let mut by_key: IndexMap<String, Value> = IndexMap::new();
    let mut unkeyed: Vec<Value> = Vec::new();

    for element in elements {
        let key = element
            .get(&key_path)
            .and_then(Value::scalar_string)
            .or_else(|| default_key.map(ToString::to_string))
            .map(|k| if lowercase { k.to_lowercase() } else { k });

        let Some(key) = key else {
            unkeyed.push(element);
            continue;
        };

        // Merging in place keeps the first occurrence's position.
        if let Some(slot) = by_key.get_mut(&key) {
            let existing = std::mem::replace(slot, Value::invalid());
            *slot = merge(existing, element)?;
        } else {
            by_key.insert(key, element);
        }
    }

    let mut out: Vec<Value> = by_key.into_values().collect();
    out.extend(unkeyed);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynvalue::Location;

    fn map(entries: Vec<(&str, Value)>) -> Value {
        let mut m = IndexMap::new();
        for (k, v) in entries {
            m.insert(k.to_string(), v);
        }
        Value::from(m)
    }

    #[test]
    fn test_scalar_merge_keeps_both_locations() {
        let base = Value::from("x").with_location(Location::new("base.yml", 1, 1));
        let over = Value::from("prod-x").with_location(Location::new("prod.yml", 5, 3));

        let merged = merge(base, over).expect("merge");
        assert_eq!(merged.as_str(), Some("prod-x"));
        assert_eq!(merged.location(), &Location::new("prod.yml", 5, 3));
        assert!(merged
            .extra_locations()
            .contains(&Location::new("base.yml", 1, 1)));
    }

    #[test]
    fn test_map_merge_preserves_base_key_order() {
        let base = map(vec![
            ("alpha", Value::from(1_i64)),
            ("beta", Value::from(2_i64)),
            ("gamma", Value::from(3_i64)),
        ]);
        let over = map(vec![
            ("beta", Value::from(20_i64)),
            ("delta", Value::from(4_i64)),
        ]);

        let merged = merge(base, over).expect("merge");
        let keys: Vec<&String> = merged.as_map().expect("map").keys().collect();
        assert_eq!(keys, vec!["alpha", "beta", "gamma", "delta"]);
        assert_eq!(
            merged.get_str_path("beta").and_then(Value::as_int),
            Some(20)
        );
    }

    #[test]
    fn test_sequence_merge_concatenates() {
        let base = Value::from(vec![Value::from("a")]);
        let over = Value::from(vec![Value::from("b"), Value::from("c")]);

        let merged = merge(base, over).expect("merge");
        let seq = merged.as_sequence().expect("seq");
        let items: Vec<Option<&str>> = seq.iter().map(Value::as_str).collect();
        assert_eq!(items, vec![Some("a"), Some("b"), Some("c")]);
    }

    #[test]
    fn test_kind_mismatch_is_an_error() {
        let base = map(vec![("x", Value::from(1_i64))]);
        let over = map(vec![("x", Value::from(vec![Value::from(2_i64)]))]);

        let err = merge(base, over).expect_err("mismatch");
        assert!(err.to_string().contains("x"));
    }

    #[test]
    fn test_nil_yields_to_override() {
        let base = Value::nil().with_location(Location::new("base.yml", 2, 1));
        let over = Value::from(7_i64);
        let merged = merge(base, over).expect("merge");
        assert_eq!(merged.as_int(), Some(7));
        assert!(merged
            .extra_locations()
            .contains(&Location::new("base.yml", 2, 1)));
    }

    #[test]
    fn test_keyed_elements_fold_by_key() {
        let a = map(vec![
            ("job_cluster_key", Value::from("main")),
            ("num_workers", Value::from(2_i64)),
        ]);
        let b = map(vec![
            ("job_cluster_key", Value::from("gpu")),
            ("num_workers", Value::from(1_i64)),
        ]);
        let a_override = map(vec![
            ("job_cluster_key", Value::from("main")),
            ("num_workers", Value::from(8_i64)),
        ]);

        let folded =
            merge_keyed_elements(vec![a, b, a_override], "job_cluster_key", None, false)
                .expect("fold");
        assert_eq!(folded.len(), 2);
        assert_eq!(
            folded[0].get_str_path("num_workers").and_then(Value::as_int),
            Some(8)
        );
        assert_eq!(
            folded[1].get_str_path("job_cluster_key").and_then(Value::as_str),
            Some("gpu")
        );
    }

    #[test]
    fn test_keyed_elements_default_label_lowercased() {
        let unlabeled = map(vec![("num_workers", Value::from(2_i64))]);
        let default_upper = map(vec![
            ("label", Value::from("Default")),
            ("num_workers", Value::from(4_i64)),
        ]);

        let folded = merge_keyed_elements(
            vec![unlabeled, default_upper],
            "label",
            Some("default"),
            true,
        )
        .expect("fold");
        assert_eq!(folded.len(), 1);
        assert_eq!(
            folded[0].get_str_path("num_workers").and_then(Value::as_int),
            Some(4)
        );
    }
}

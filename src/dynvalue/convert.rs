//! Typed projection: bidirectional conversion between the dynamic tree and
//! the statically defined config schema.
//!
//! Conversion bridges through `serde_json`, so any `Deserialize` type can be
//! projected out of the tree and any `Serialize` type back in. The from-typed
//! direction re-attaches source locations by walking a reference tree, and
//! omits zero values unless the reference tree already carried the path,
//! preserving the difference between "the user set this to false" and
//! "never set".

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{ConfigError, LakewardError, Result};

use super::value::{Value, ValueData};

impl Value {
    /// Converts the dynamic value to plain JSON, dropping provenance.
    /// Invalid values become `null`; timestamps render as RFC 3339 strings.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self.data() {
            ValueData::Invalid | ValueData::Nil => JsonValue::Null,
            ValueData::Bool(b) => JsonValue::Bool(*b),
            ValueData::Int(i) => JsonValue::from(*i),
            ValueData::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            ValueData::Str(s) => JsonValue::String(s.clone()),
            ValueData::Time(t) => JsonValue::String(t.to_rfc3339()),
            ValueData::Sequence(seq) => {
                JsonValue::Array(seq.iter().map(Self::to_json).collect())
            }
            ValueData::Map(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json());
                }
                JsonValue::Object(out)
            }
        }
    }

    /// Builds a dynamic value from plain JSON with synthetic locations.
    #[must_use]
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::nil(),
            JsonValue::Bool(b) => Self::from(b),
            JsonValue::Number(n) => n.as_i64().map_or_else(
                || Self::from(n.as_f64().unwrap_or(0.0)),
                Self::from,
            ),
            JsonValue::String(s) => Self::from(s),
            JsonValue::Array(items) => {
                Self::from(items.into_iter().map(Self::from_json).collect::<Vec<_>>())
            }
            JsonValue::Object(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, Self::from_json(v));
                }
                Self::from(out)
            }
        }
    }
}

/// Projects a dynamic value onto a typed schema `T`.
///
/// # Errors
///
/// Returns [`ConfigError::SchemaMismatch`] when the tree does not fit `T`.
pub fn to_typed<T: DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.to_json())
        .map_err(|e| LakewardError::Config(ConfigError::schema(e.to_string())))
}

/// Projects a typed value back into the dynamic tree.
///
/// Locations are copied from `reference` for every path that still exists;
/// zero values (false, 0, "", empty sequences) are omitted unless the
/// reference tree carries the path. Empty maps are kept: a keyed-collection
/// entry with no settings is still an entry.
///
/// # Errors
///
/// Returns a serialization error when `t` cannot be represented as JSON.
pub fn from_typed<T: Serialize>(t: &T, reference: &Value) -> Result<Value> {
    let json = serde_json::to_value(t)
        .map_err(|e| LakewardError::Config(ConfigError::schema(e.to_string())))?;
    Ok(rebuild(Value::from_json(json), reference))
}

/// Re-attaches locations from `reference` and prunes zero values the
/// reference never had.
fn rebuild(value: Value, reference: &Value) -> Value {
    let (data, _, _, anchor) = value.into_parts();
    let data = match data {
        ValueData::Map(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (key, child) in map {
                let child_ref = reference
                    .as_map()
                    .and_then(|m| m.get(&key));
                match child_ref {
                    Some(r) => out.insert(key, rebuild(child, r)),
                    None => {
                        // An empty map is an explicit entry of a keyed
                        // collection, not an unset field; it stays.
                        if child.is_zero() && child.as_map().is_none() {
                            continue;
                        }
                        out.insert(key, rebuild_fresh(child))
                    }
                };
            }
            ValueData::Map(out)
        }
        ValueData::Sequence(seq) => {
            let out = seq
                .into_iter()
                .enumerate()
                .map(
                    |(i, child)| match reference.as_sequence().and_then(|s| s.get(i)) {
                        Some(r) => rebuild(child, r),
                        None => rebuild_fresh(child),
                    },
                )
                .collect();
            ValueData::Sequence(out)
        }
        other => other,
    };
    let mut out = Value::assemble(
        data,
        reference.location().clone(),
        reference.extra_locations().to_vec(),
        anchor,
    );
    out = out.with_anchor(reference.is_anchor());
    out
}

/// Rebuild with no reference: keep synthetic locations, still prune zero
/// map entries.
fn rebuild_fresh(value: Value) -> Value {
    let (data, loc, extra, anchor) = value.into_parts();
    let data = match data {
        ValueData::Map(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (key, child) in map {
                if child.is_zero() && child.as_map().is_none() {
                    continue;
                }
                out.insert(key, rebuild_fresh(child));
            }
            ValueData::Map(out)
        }
        ValueData::Sequence(seq) => {
            ValueData::Sequence(seq.into_iter().map(rebuild_fresh).collect())
        }
        other => other,
    };
    Value::assemble(data, loc, extra, anchor)
}

/// Parses an RFC 3339 timestamp into the time kind, used by the YAML reader
/// for plain scalars that look like timestamps.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynvalue::{Location, Path};
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct JobStub {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_concurrent_runs: Option<i64>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    }

    fn located_tree() -> Value {
        let mut v = Value::empty_map();
        v.set_at(
            &Path::parse("name").expect("path"),
            Value::from("etl").with_location(Location::new("root.yml", 3, 9)),
        )
        .expect("set");
        v
    }

    #[test]
    fn test_to_typed_projects_fields() {
        let tree = located_tree();
        let job: JobStub = to_typed(&tree).expect("project");
        assert_eq!(job.name, "etl");
        assert_eq!(job.max_concurrent_runs, None);
    }

    #[test]
    fn test_roundtrip_preserves_locations() {
        let tree = located_tree();
        let job: JobStub = to_typed(&tree).expect("project");
        let back = from_typed(&job, &tree).expect("back");

        let name = back.get_str_path("name").expect("name");
        assert_eq!(name.as_str(), Some("etl"));
        assert_eq!(name.location(), &Location::new("root.yml", 3, 9));
    }

    #[test]
    fn test_zero_values_pruned_unless_referenced() {
        let tree = located_tree();
        let job = JobStub {
            name: String::from("etl"),
            max_concurrent_runs: None,
            tags: Vec::new(),
        };
        let back = from_typed(&job, &tree).expect("back");
        assert!(back.get_str_path("tags").is_none());
    }

    #[test]
    fn test_explicit_zero_survives_via_reference() {
        let mut tree = located_tree();
        tree.set_at(
            &Path::parse("max_concurrent_runs").expect("path"),
            Value::from(0_i64).with_location(Location::new("root.yml", 4, 3)),
        )
        .expect("set");

        let job: JobStub = to_typed(&tree).expect("project");
        assert_eq!(job.max_concurrent_runs, Some(0));

        let back = from_typed(&job, &tree).expect("back");
        let zero = back.get_str_path("max_concurrent_runs").expect("kept");
        assert_eq!(zero.as_int(), Some(0));
        assert_eq!(zero.location(), &Location::new("root.yml", 4, 3));
    }

    #[test]
    fn test_empty_map_entry_survives_roundtrip() {
        #[derive(Debug, Serialize, Deserialize, Default)]
        struct Keyed {
            #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
            entries: IndexMap<String, serde_json::Map<String, JsonValue>>,
        }

        let mut keyed = Keyed::default();
        keyed
            .entries
            .insert(String::from("empty"), serde_json::Map::new());
        let back = from_typed(&keyed, &Value::empty_map()).expect("back");
        assert!(back.get_str_path("entries.empty").is_some());

        let again: Keyed = to_typed(&back).expect("project");
        assert!(again.entries.contains_key("empty"));
    }

    #[test]
    fn test_schema_mismatch_reports_error() {
        let mut tree = Value::empty_map();
        tree.set_at(
            &Path::parse("name").expect("path"),
            Value::from(vec![Value::from(1_i64)]),
        )
        .expect("set");
        let err = to_typed::<JobStub>(&tree).expect_err("mismatch");
        assert!(matches!(
            err,
            LakewardError::Config(ConfigError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2024-05-01T10:00:00Z").is_some());
        assert!(parse_timestamp("not a time").is_none());
    }
}

//! JSON schema generation for the configuration format.
//!
//! The schema is derived from the typed config model via `schemars`, then
//! post-processed: the loader-only `include` property is patched in, and
//! field descriptions are overlaid from an OpenAPI-shaped descriptions
//! document. The document may factor shared text into
//! `components/schemas` entries and reference them with `$ref`; references
//! resolve during the overlay, and a referenced definition in the generated
//! schema is inlined so the description lands on the property itself.

use schemars::schema_for;
use serde_json::{json, Value as JsonValue};

use crate::error::{ConfigError, LakewardError, Result};

use super::spec::BundleConfig;

/// Generates the JSON schema of the full configuration format.
///
/// # Errors
///
/// Returns an internal error when the schema cannot be serialized, and a
/// config error when the descriptions document is malformed.
pub fn bundle_schema() -> Result<JsonValue> {
    let schema = schema_for!(BundleConfig);
    let mut json = serde_json::to_value(&schema)
        .map_err(|e| LakewardError::internal(format!("schema serialization: {e}")))?;

    if let Some(properties) = json
        .get_mut("properties")
        .and_then(JsonValue::as_object_mut)
    {
        properties.insert(
            String::from("include"),
            json!({
                "type": "array",
                "items": {"type": "string"},
                "description": "Glob patterns of additional configuration files, \
                                relative to the bundle root. Only valid in the root file."
            }),
        );
    }

    apply_descriptions(&mut json, &descriptions_doc())?;
    Ok(json)
}

/// Overlays an OpenAPI-shaped descriptions document onto a generated
/// schema. The document root must be inline; nested nodes may be
/// `#/components/schemas/...` references.
///
/// # Errors
///
/// Fails on a top-level `$ref` and on unresolvable references.
fn apply_descriptions(schema: &mut JsonValue, doc: &JsonValue) -> Result<()> {
    if doc.get("$ref").is_some() {
        return Err(LakewardError::Config(ConfigError::schema(
            "descriptions document must not be a top-level $ref",
        )));
    }
    let components = doc.get("components").cloned().unwrap_or_else(|| json!({}));
    let defs = schema.get("$defs").cloned().unwrap_or_else(|| json!({}));
    overlay(schema, doc, &components, &defs)
}

fn overlay(
    schema: &mut JsonValue,
    desc: &JsonValue,
    components: &JsonValue,
    defs: &JsonValue,
) -> Result<()> {
    let desc = resolve_component(desc, components)?;

    // A described property that the model expresses as a reference is
    // inlined, so the description attaches to the property itself.
    if let Some(name) = schema
        .get("$ref")
        .and_then(JsonValue::as_str)
        .and_then(|r| r.strip_prefix("#/$defs/"))
    {
        if let Some(target) = defs.get(name) {
            *schema = target.clone();
        }
    }

    if let (Some(obj), Some(text)) = (schema.as_object_mut(), desc.get("description")) {
        obj.insert(String::from("description"), text.clone());
    }

    if let Some(children) = desc.get("properties").and_then(JsonValue::as_object) {
        for (key, child) in children {
            if let Some(slot) = schema
                .get_mut("properties")
                .and_then(|props| props.get_mut(key))
            {
                overlay(slot, child, components, defs)?;
            }
        }
    }
    if let Some(child) = desc.get("additionalProperties") {
        if let Some(slot) = schema.get_mut("additionalProperties") {
            overlay(slot, child, components, defs)?;
        }
    }
    if let Some(child) = desc.get("items") {
        if let Some(slot) = schema.get_mut("items") {
            overlay(slot, child, components, defs)?;
        }
    }
    Ok(())
}

/// Follows `#/components/schemas/...` references to the inline node.
fn resolve_component<'a>(desc: &'a JsonValue, components: &'a JsonValue) -> Result<&'a JsonValue> {
    let mut current = desc;
    let mut hops = 0;
    while let Some(reference) = current.get("$ref").and_then(JsonValue::as_str) {
        let name = reference
            .strip_prefix("#/components/schemas/")
            .ok_or_else(|| {
                LakewardError::Config(ConfigError::schema(format!(
                    "unsupported description reference '{reference}'"
                )))
            })?;
        current = components
            .get("schemas")
            .and_then(|schemas| schemas.get(name))
            .ok_or_else(|| {
                LakewardError::Config(ConfigError::schema(format!(
                    "unknown description component '{name}'"
                )))
            })?;
        hops += 1;
        if hops > 8 {
            return Err(LakewardError::Config(ConfigError::schema(format!(
                "description reference cycle through '{reference}'"
            ))));
        }
    }
    Ok(current)
}

/// The descriptions overlaid onto the generated schema, shaped like an
/// OpenAPI document.
fn descriptions_doc() -> JsonValue {
    json!({
        "description": "A Lakeward bundle: resources, artifacts and settings \
                        deployed together against a target.",
        "properties": {
            "bundle": {
                "description": "Identity of the bundle.",
                "properties": {
                    "name": {"description": "Bundle name, used in default workspace paths."},
                    "target": {"description": "The selected target; set during initialization."},
                    "mode": {"description": "Deployment mode of the selected target."}
                }
            },
            "workspace": {
                "description": "Where the bundle deploys to.",
                "properties": {
                    "host": {"description": "Workspace host the bundle deploys against."},
                    "root_path": {"description": "Remote root of this bundle's deployment."},
                    "file_path": {"description": "Remote directory synced source files land in."},
                    "artifact_path": {"description": "Remote directory built artifacts upload to."},
                    "state_path": {"description": "Remote directory holding deployment state."}
                }
            },
            "artifacts": {
                "description": "Buildable artifacts, keyed by name.",
                "additionalProperties": {"$ref": "#/components/schemas/artifact"}
            },
            "variables": {
                "description": "Declared variables, keyed by name.",
                "additionalProperties": {
                    "properties": {
                        "description": {"description": "Human-readable purpose of the variable."},
                        "default": {"description": "Value used when nothing else sets one."},
                        "lookup": {"description": "Resolve the value by looking up a named \
                                                   workspace object."}
                    }
                }
            },
            "sync": {
                "description": "File sync filters.",
                "properties": {
                    "include": {"description": "Glob patterns re-included after an exclusion."},
                    "exclude": {"description": "Glob patterns left out of the sync."}
                }
            },
            "targets": {
                "description": "Per-target overrides of any other section, keyed by \
                                target name."
            },
            "run_as": {
                "description": "Identity resources run as after deployment."
            },
            "permissions": {
                "description": "Permissions applied to every deployed resource."
            }
        },
        "components": {
            "schemas": {
                "artifact": {
                    "description": "One buildable artifact.",
                    "properties": {
                        "type": {"description": "Artifact type; 'whl' gets a default build \
                                                 command."},
                        "build": {"description": "Shell command producing the files."},
                        "path": {"description": "Directory the build command runs in."},
                        "files": {
                            "description": "Files the build produces.",
                            "items": {
                                "properties": {
                                    "source": {"description": "Local file or glob."}
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_covers_top_level_sections() {
        let schema = bundle_schema().expect("schema");
        let properties = schema["properties"].as_object().expect("properties");
        for section in [
            "bundle",
            "workspace",
            "resources",
            "artifacts",
            "variables",
            "sync",
            "targets",
            "include",
        ] {
            assert!(properties.contains_key(section), "missing {section}");
        }
    }

    #[test]
    fn test_sections_carry_overlaid_descriptions() {
        let schema = bundle_schema().expect("schema");
        assert_eq!(
            schema["properties"]["workspace"]["description"]
                .as_str()
                .expect("description"),
            "Where the bundle deploys to."
        );
        assert_eq!(
            schema["properties"]["sync"]["properties"]["exclude"]["description"]
                .as_str()
                .expect("description"),
            "Glob patterns left out of the sync."
        );
    }

    #[test]
    fn test_component_reference_resolves_and_inlines() {
        let schema = bundle_schema().expect("schema");
        let artifact = &schema["properties"]["artifacts"]["additionalProperties"];
        // The model refers to a $defs entry; the overlay inlined it.
        assert!(artifact.get("$ref").is_none());
        assert_eq!(
            artifact["description"].as_str(),
            Some("One buildable artifact.")
        );
        assert_eq!(
            artifact["properties"]["build"]["description"].as_str(),
            Some("Shell command producing the files.")
        );
    }

    #[test]
    fn test_top_level_reference_rejected() {
        let mut schema = json!({"properties": {}});
        let doc = json!({"$ref": "#/components/schemas/root"});
        let err = apply_descriptions(&mut schema, &doc).expect_err("top-level ref");
        assert!(err.to_string().contains("top-level"));
    }

    #[test]
    fn test_unknown_component_rejected() {
        let mut schema = json!({"properties": {"bundle": {}}});
        let doc = json!({
            "properties": {"bundle": {"$ref": "#/components/schemas/missing"}}
        });
        let err = apply_descriptions(&mut schema, &doc).expect_err("unknown component");
        assert!(err.to_string().contains("missing"));
    }
}

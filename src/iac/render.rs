//! Rendering the typed configuration into the engine's native format.
//!
//! The engine consumes a JSON document with one block per resource type.
//! Declaration order is preserved so renders are deterministic and diffs
//! stay readable. Cross-resource references written as
//! `${resources.jobs.x.id}` in bundle configuration become engine-native
//! interpolation (`${job.x.id}`), which the engine resolves at apply time.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tokio::fs;

use crate::config::BundleConfig;
use crate::error::{LakewardError, Result};

/// Rendered configuration file name inside the engine working directory.
pub const CONFIG_FILE_NAME: &str = "main.tf.json";

/// Engine-native block name for each resource type section.
const TYPE_NAMES: [(&str, &str); 8] = [
    ("jobs", "job"),
    ("pipelines", "pipeline"),
    ("experiments", "experiment"),
    ("models", "ml_model"),
    ("registered_models", "registered_model"),
    ("schemas", "schema"),
    ("model_serving_endpoints", "model_serving_endpoint"),
    ("dashboards", "dashboard"),
];

/// Renders the engine configuration document.
///
/// # Errors
///
/// Fails when a resource cannot be serialized.
pub fn render_config(config: &BundleConfig) -> Result<JsonValue> {
    let mut resource = Map::new();
    insert_block(&mut resource, "job", &config.resources.jobs)?;
    insert_block(&mut resource, "pipeline", &config.resources.pipelines)?;
    insert_block(&mut resource, "experiment", &config.resources.experiments)?;
    insert_block(&mut resource, "ml_model", &config.resources.models)?;
    insert_block(&mut resource, "registered_model", &config.resources.registered_models)?;
    insert_block(&mut resource, "schema", &config.resources.schemas)?;
    insert_block(
        &mut resource,
        "model_serving_endpoint",
        &config.resources.model_serving_endpoints,
    )?;
    insert_block(&mut resource, "dashboard", &config.resources.dashboards)?;

    let mut doc = JsonValue::Object(Map::from_iter([(
        String::from("resource"),
        JsonValue::Object(resource),
    )]));
    rewrite_references(&mut doc);
    Ok(doc)
}

/// Renders and writes the configuration into `workdir`.
///
/// # Errors
///
/// Fails on serialization or filesystem errors.
pub async fn write_config(config: &BundleConfig, workdir: &Path) -> Result<PathBuf> {
    let doc = render_config(config)?;
    let rendered = serde_json::to_vec_pretty(&doc)
        .map_err(|e| LakewardError::internal(format!("render serialization: {e}")))?;
    fs::create_dir_all(workdir).await?;
    let file = workdir.join(CONFIG_FILE_NAME);
    fs::write(&file, rendered).await?;
    Ok(file)
}

fn insert_block<T: Serialize>(
    resource: &mut Map<String, JsonValue>,
    type_name: &str,
    entries: &indexmap::IndexMap<String, T>,
) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut block = Map::with_capacity(entries.len());
    for (key, value) in entries {
        let rendered = serde_json::to_value(value)
            .map_err(|e| LakewardError::internal(format!("render of '{key}': {e}")))?;
        block.insert(key.clone(), rendered);
    }
    resource.insert(type_name.to_string(), JsonValue::Object(block));
    Ok(())
}

/// Rewrites `${resources.…}` references in every string of the document.
fn rewrite_references(value: &mut JsonValue) {
    match value {
        JsonValue::String(s) => {
            if s.contains("${resources.") {
                *s = rewrite_str(s);
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(rewrite_references),
        JsonValue::Object(map) => map.values_mut().for_each(rewrite_references),
        _ => {}
    }
}

/// Rewrites one string, leaving unknown resource types untouched.
fn rewrite_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${resources.") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let inner = &rest[start + "${resources.".len()..start + end];
        match inner.split_once('.').and_then(|(plural, tail)| {
            TYPE_NAMES
                .iter()
                .find(|(p, _)| *p == plural)
                .map(|(_, native)| (native, tail))
        }) {
            Some((native, tail)) => {
                out.push_str("${");
                out.push_str(native);
                out.push('.');
                out.push_str(tail);
                out.push('}');
            }
            None => out.push_str(&rest[start..=start + end]),
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resources::{Job, NotebookTask, Pipeline, Task};

    fn sample_config() -> BundleConfig {
        let mut config = BundleConfig::default();
        config.resources.pipelines.insert(
            String::from("ingest"),
            Pipeline {
                name: String::from("ingest"),
                ..Pipeline::default()
            },
        );
        config.resources.jobs.insert(
            String::from("refresh"),
            Job {
                name: String::from("refresh"),
                tasks: vec![Task {
                    task_key: String::from("trigger"),
                    notebook_task: Some(NotebookTask {
                        notebook_path: String::from("/files/run.py"),
                        base_parameters: indexmap::indexmap! {
                            String::from("pipeline_id") =>
                                String::from("${resources.pipelines.ingest.id}"),
                        },
                    }),
                    ..Task::default()
                }],
                ..Job::default()
            },
        );
        config
    }

    #[test]
    fn test_render_groups_by_type() {
        let doc = render_config(&sample_config()).expect("render");
        assert!(doc["resource"]["job"]["refresh"].is_object());
        assert!(doc["resource"]["pipeline"]["ingest"].is_object());
        assert!(doc["resource"].get("experiment").is_none());
    }

    #[test]
    fn test_cross_references_become_engine_native() {
        let doc = render_config(&sample_config()).expect("render");
        let param = &doc["resource"]["job"]["refresh"]["tasks"][0]["notebook_task"]
            ["base_parameters"]["pipeline_id"];
        assert_eq!(param, "${pipeline.ingest.id}");
    }

    #[test]
    fn test_unknown_reference_scope_is_untouched() {
        assert_eq!(
            rewrite_str("${resources.widgets.x.id} and ${var.y}"),
            "${resources.widgets.x.id} and ${var.y}"
        );
        assert_eq!(
            rewrite_str("a=${resources.jobs.j.id},b=${resources.jobs.k.id}"),
            "a=${job.j.id},b=${job.k.id}"
        );
    }

    #[tokio::test]
    async fn test_write_config_creates_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let file = write_config(&sample_config(), &dir.path().join("engine"))
            .await
            .expect("write");
        assert!(file.ends_with(CONFIG_FILE_NAME));
        let raw = tokio::fs::read(&file).await.expect("read");
        assert!(serde_json::from_slice::<JsonValue>(&raw).is_ok());
    }
}

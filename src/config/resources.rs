//! Typed resource definitions.
//!
//! These mirror the remotely managed objects a bundle can declare: batch
//! jobs, streaming pipelines, experiments, model registrations, schemas,
//! serving endpoints, and dashboards. Every map of resources is keyed by a
//! user-chosen identifier that must be unique across all resource types.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::spec::{Permission, RunAs};

/// All declared resources, each keyed by a user-chosen identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Resources {
    /// Batch jobs.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub jobs: IndexMap<String, Job>,
    /// Streaming pipelines.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub pipelines: IndexMap<String, Pipeline>,
    /// Tracking experiments.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub experiments: IndexMap<String, Experiment>,
    /// Model registrations (legacy registry).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub models: IndexMap<String, MlModel>,
    /// Catalog-backed registered models.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub registered_models: IndexMap<String, RegisteredModel>,
    /// Catalog schemas.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub schemas: IndexMap<String, SchemaResource>,
    /// Model serving endpoints.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub model_serving_endpoints: IndexMap<String, ModelServingEndpoint>,
    /// Dashboards.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dashboards: IndexMap<String, Dashboard>,
}

impl Resources {
    /// Iterates `(resource_type, key)` over every declared resource.
    pub fn keys_by_type(&self) -> impl Iterator<Item = (&'static str, &String)> {
        let jobs = self.jobs.keys().map(|k| ("jobs", k));
        let pipelines = self.pipelines.keys().map(|k| ("pipelines", k));
        let experiments = self.experiments.keys().map(|k| ("experiments", k));
        let models = self.models.keys().map(|k| ("models", k));
        let registered = self.registered_models.keys().map(|k| ("registered_models", k));
        let schemas = self.schemas.keys().map(|k| ("schemas", k));
        let endpoints = self
            .model_serving_endpoints
            .keys()
            .map(|k| ("model_serving_endpoints", k));
        let dashboards = self.dashboards.keys().map(|k| ("dashboards", k));
        jobs.chain(pipelines)
            .chain(experiments)
            .chain(models)
            .chain(registered)
            .chain(schemas)
            .chain(endpoints)
            .chain(dashboards)
    }

    /// Total number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys_by_type().count()
    }

    /// Whether no resources are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pause state for schedules, triggers, and continuous runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseStatus {
    /// Paused: the trigger never fires.
    Paused,
    /// Active.
    Unpaused,
}

/// A batch job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Ordered task list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
    /// Shared job clusters, referenced from tasks by key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub job_clusters: Vec<JobCluster>,
    /// Maximum concurrent runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_runs: Option<i64>,
    /// Cron schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<CronSchedule>,
    /// Event trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerSettings>,
    /// Continuous-run settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuous: Option<Continuous>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tags: IndexMap<String, String>,
    /// Identity the job runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as: Option<RunAs>,
    /// Access control.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
}

/// One task of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Unique key within the job.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_key: String,
    /// Notebook task payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_task: Option<NotebookTask>,
    /// Python file task payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark_python_task: Option<SparkPythonTask>,
    /// Python wheel task payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_wheel_task: Option<PythonWheelTask>,
    /// Key of a shared job cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_cluster_key: Option<String>,
    /// Existing interactive cluster id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_cluster_id: Option<String>,
    /// Dedicated cluster spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_cluster: Option<ClusterSpec>,
    /// Libraries attached to the task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<Library>,
    /// Upstream task dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TaskDependency>,
}

/// Notebook task payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NotebookTask {
    /// Workspace path (or local path pre-translation) of the notebook.
    pub notebook_path: String,
    /// Parameters passed to the notebook.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub base_parameters: IndexMap<String, String>,
}

/// Python file task payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SparkPythonTask {
    /// Path of the Python file.
    pub python_file: String,
    /// Command-line parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// Python wheel task payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PythonWheelTask {
    /// Package name of the wheel.
    pub package_name: String,
    /// Entry point to invoke.
    pub entry_point: String,
    /// Named parameters.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub named_parameters: IndexMap<String, String>,
}

/// A library attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Library {
    /// Path to a wheel file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whl: Option<String>,
    /// Path to a jar file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar: Option<String>,
    /// A PyPI requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pypi: Option<PypiLibrary>,
}

/// A PyPI requirement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PypiLibrary {
    /// Requirement string, e.g. `requests==2.31`.
    pub package: String,
    /// Optional index URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// Task dependency edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskDependency {
    /// Key of the upstream task.
    pub task_key: String,
}

/// A shared job cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobCluster {
    /// Key tasks reference this cluster by.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_cluster_key: String,
    /// Cluster definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_cluster: Option<ClusterSpec>,
}

/// A cluster definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterSpec {
    /// Runtime version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spark_version: String,
    /// Instance type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type_id: Option<String>,
    /// Number of workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<i64>,
    /// Engine configuration overrides.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub spark_conf: IndexMap<String, String>,
    /// Cloud tags.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom_tags: IndexMap<String, String>,
}

/// Cron schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CronSchedule {
    /// Quartz cron expression.
    pub quartz_cron_expression: String,
    /// Timezone id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_id: Option<String>,
    /// Pause state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_status: Option<PauseStatus>,
}

/// Event trigger settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TriggerSettings {
    /// Pause state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_status: Option<PauseStatus>,
    /// File-arrival trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_arrival: Option<FileArrivalTrigger>,
}

/// File-arrival trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileArrivalTrigger {
    /// Storage URL watched for new files.
    pub url: String,
}

/// Continuous-run settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Continuous {
    /// Pause state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_status: Option<PauseStatus>,
}

/// A streaming pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pipeline {
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Development mode (relaxed validation, faster iteration).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub development: bool,
    /// Continuous execution.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continuous: bool,
    /// Destination catalog or database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Cluster definitions, keyed by label.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<PipelineCluster>,
    /// Source libraries (notebooks and files).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<PipelineLibrary>,
    /// Pipeline configuration.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub configuration: IndexMap<String, String>,
    /// Access control.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
}

/// A pipeline cluster, selected by label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineCluster {
    /// Cluster label; absent means `default`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Number of workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<i64>,
    /// Instance type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type_id: Option<String>,
    /// Cloud tags.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom_tags: IndexMap<String, String>,
}

/// A pipeline source library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineLibrary {
    /// A notebook source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook: Option<PathReference>,
    /// A plain file source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathReference>,
}

/// A path reference inside a pipeline library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PathReference {
    /// Workspace path (or local path pre-translation).
    pub path: String,
}

/// A tracking experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Experiment {
    /// Experiment name (workspace path).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Artifact storage location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<String>,
    /// Access control.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
}

/// A model registration in the legacy registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MlModel {
    /// Model name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Access control.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
}

/// A catalog-backed registered model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegisteredModel {
    /// Model name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Parent catalog.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub catalog_name: String,
    /// Parent schema.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_name: String,
    /// Comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A catalog schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaResource {
    /// Schema name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Parent catalog.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub catalog_name: String,
    /// Comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Key-value properties.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, String>,
}

/// A model serving endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelServingEndpoint {
    /// Endpoint name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Access control.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
}

/// A dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Dashboard {
    /// Display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Local path of the serialized dashboard definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Warehouse used for queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
    /// Access control.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
}

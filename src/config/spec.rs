//! The typed configuration schema.
//!
//! [`BundleConfig`] is the statically typed view of the dynamic tree after
//! loading and target merging. It is projected out of the tree with
//! [`crate::dynvalue::to_typed`] and written back with
//! [`crate::dynvalue::from_typed`], so mutators can work against real types
//! without losing source locations.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::resources::Resources;

/// Root of the typed configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BundleConfig {
    /// Bundle identity and deployment options.
    #[serde(default)]
    pub bundle: BundleInfo,
    /// Remote workspace settings and derived paths.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Declared resources.
    #[serde(default, skip_serializing_if = "Resources::is_empty")]
    pub resources: Resources,
    /// Buildable artifacts, keyed by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub artifacts: IndexMap<String, ArtifactConfig>,
    /// Declared variables, keyed by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableSpec>,
    /// File sync filters.
    #[serde(default, skip_serializing_if = "SyncSpec::is_empty")]
    pub sync: SyncSpec,
    /// Identity deployed resources run as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as: Option<RunAs>,
    /// Bundle-wide access control, prepended to each resource's own.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
    /// Opt-in features.
    #[serde(default, skip_serializing_if = "Experimental::is_empty")]
    pub experimental: Experimental,
    /// Per-target overrides; consumed by target selection, absent afterwards.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub targets: IndexMap<String, TargetConfig>,
}

/// Bundle identity and deployment options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BundleInfo {
    /// Bundle name, the namespace for remote paths and state.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Selected target; set during loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Deployment mode, folded in from the selected target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Git details captured at load time.
    #[serde(default, skip_serializing_if = "GitInfo::is_empty")]
    pub git: GitInfo,
    /// Deployment behavior knobs.
    #[serde(default)]
    pub deployment: DeploymentOptions,
}

/// Deployment mode of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Per-user sandbox: prefixed names, paused triggers, concurrent runs
    /// allowed.
    Development,
    /// Locked-down deployment: requires an explicit run-as identity.
    Production,
}

/// Git details of the bundle root, captured best-effort at load time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GitInfo {
    /// Current branch name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// URL of the `origin` remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    /// Commit hash of `HEAD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Whether the branch was inferred rather than configured.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inferred: bool,
}

impl GitInfo {
    /// Whether no git details were captured or configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.branch.is_none() && self.origin_url.is_none() && self.commit.is_none()
    }
}

/// Deployment behavior knobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeploymentOptions {
    /// Fail the deploy when declared jobs or pipelines are currently running.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fail_on_active_runs: bool,
    /// Deployment lock settings.
    #[serde(default)]
    pub lock: LockOptions,
}

/// Deployment lock settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LockOptions {
    /// Whether locking is enabled; absent means enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Steal an existing lock instead of failing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

impl LockOptions {
    /// Whether the deployment lock is in effect.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Remote workspace settings and derived paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceConfig {
    /// Workspace URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Named credentials profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Remote root under which everything for this bundle and target lives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_path: Option<String>,
    /// Remote directory for built artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    /// Remote directory the source tree is synced into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Remote directory for deployment state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<String>,
    /// Authenticated identity; populated during initialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<User>,
}

/// An authenticated workspace identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct User {
    /// Login name, an email address or a service principal id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    /// The local part of the user name, usable in paths and prefixes.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.user_name
            .split_once('@')
            .map_or(self.user_name.as_str(), |(local, _)| local)
    }

    /// Whether the identity is a service principal (UUID-shaped user name).
    #[must_use]
    pub fn is_service_principal(&self) -> bool {
        uuid::Uuid::parse_str(&self.user_name).is_ok()
    }
}

/// A buildable artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactConfig {
    /// Artifact kind; `whl` gets a default build command.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    /// Shell command that produces the files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    /// Working directory of the build, relative to the bundle root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Files produced by the build.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ArtifactFile>,
    /// Whether the artifact is a notebook; set for synthesized path entries.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub notebook: bool,
    /// Remote path of the uploaded artifact; set during upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
}

/// One file produced by an artifact build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactFile {
    /// Local path, possibly a glob before the build runs.
    pub source: String,
    /// Remote path after upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
}

/// A declared variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VariableSpec {
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default when no override is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Resolved value; set during initialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    /// Resolve the value by looking up a named remote object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<Lookup>,
}

/// A remote object lookup; exactly one field should be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Lookup {
    /// Cluster by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    /// Cluster policy by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_policy: Option<String>,
    /// Instance pool by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_pool: Option<String>,
    /// SQL warehouse by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    /// Job by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    /// Pipeline by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    /// Metastore by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metastore: Option<String>,
}

impl Lookup {
    /// The `(object_type, name)` pair of the single populated field.
    #[must_use]
    pub fn field(&self) -> Option<(&'static str, &str)> {
        let candidates: [(&'static str, &Option<String>); 7] = [
            ("cluster", &self.cluster),
            ("cluster_policy", &self.cluster_policy),
            ("instance_pool", &self.instance_pool),
            ("warehouse", &self.warehouse),
            ("job", &self.job),
            ("pipeline", &self.pipeline),
            ("metastore", &self.metastore),
        ];
        candidates
            .into_iter()
            .find_map(|(kind, value)| value.as_deref().map(|v| (kind, v)))
    }
}

/// File sync filters, gitignore-style glob patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncSpec {
    /// Patterns re-included after exclusion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    /// Patterns excluded from sync.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl SyncSpec {
    /// Whether no filters are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Identity deployed resources run as.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunAs {
    /// A named user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// A named service principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_principal_name: Option<String>,
}

impl RunAs {
    /// Whether either identity field is set.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.user_name.is_some() || self.service_principal_name.is_some()
    }
}

/// One access control entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Permission {
    /// Permission level, e.g. `CAN_MANAGE` or `CAN_VIEW`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub level: String,
    /// Grantee user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Grantee group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Grantee service principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_principal_name: Option<String>,
}

/// Opt-in features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Experimental {
    /// Lifecycle hook scripts, keyed by hook name
    /// (`preinit`, `postinit`, `prebuild`, `postbuild`, `predeploy`,
    /// `postdeploy`).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scripts: IndexMap<String, String>,
}

impl Experimental {
    /// Whether no experimental features are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Per-target overrides, merged over the root config when the target is
/// selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TargetConfig {
    /// Whether this target is used when none is named.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
    /// Deployment mode of the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Workspace overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceConfig>,
    /// Resource overrides, merged field-by-field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    /// Artifact overrides.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub artifacts: IndexMap<String, ArtifactConfig>,
    /// Variable overrides.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableSpec>,
    /// Sync filter overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncSpec>,
    /// Run-as override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as: Option<RunAs>,
    /// Permission overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
    /// Git detail overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
}

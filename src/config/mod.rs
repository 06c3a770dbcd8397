//! Configuration model and loading.
//!
//! The typed schema ([`spec`], [`resources`]), the location-annotated YAML
//! reader ([`yaml`]), bundle root discovery with include expansion
//! ([`loader`]), and JSON schema generation ([`schema`]).

pub mod loader;
pub mod resources;
pub mod schema;
pub mod spec;
pub mod yaml;

pub use resources::Resources;
pub use spec::{
    ArtifactConfig, ArtifactFile, BundleConfig, BundleInfo, DeploymentOptions, Experimental,
    GitInfo, LockOptions, Lookup, Mode, Permission, RunAs, SyncSpec, TargetConfig, User,
    VariableSpec, WorkspaceConfig,
};

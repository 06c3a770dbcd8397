//! The artifact pipeline: prepare, build, upload.
//!
//! Prepare anchors artifact paths to the files that declared them. Build
//! runs each artifact's build command (with a built-in default for `whl`)
//! capturing output. Upload pushes produced files that something references
//! to the remote artifact area and rewrites the referring libraries.

use std::path::{Path as StdPath, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bundle::Bundle;
use crate::config::resources::Library;
use crate::dynvalue::{Pattern, Value};
use crate::error::{BuildError, LakewardError, Result};
use crate::mutator::{Diagnostic, Diagnostics, Mutator};
use crate::sync::notebook::remote_name;
use crate::workspace::{with_retries, DEFAULT_ATTEMPTS};

/// Default build command for `whl` artifacts.
const WHL_BUILD_COMMAND: &str = "python3 setup.py bdist_wheel";

/// Glob for files a `whl` build produces when none are declared.
const WHL_OUTPUT_GLOB: &str = "dist/*.whl";

/// Anchors `path` and `files[].source` of every artifact to the declaring
/// file's directory.
pub struct PrepareArtifacts;

#[async_trait]
impl Mutator for PrepareArtifacts {
    fn name(&self) -> &'static str {
        "PrepareArtifacts"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        let patterns = ["artifacts.*.path", "artifacts.*.files[*].source"];
        for pattern in patterns {
            let pattern = match Pattern::parse(pattern) {
                Ok(p) => p,
                Err(err) => return Diagnostics::from_error(err.into()),
            };
            let root = bundle.root.clone();
            let tree = std::mem::replace(&mut bundle.tree, Value::invalid());
            let result = tree.map_by_pattern(&pattern, &mut |_, value| {
                let Some(raw) = value.as_str() else {
                    return Ok(value);
                };
                if StdPath::new(raw).is_absolute() {
                    return Ok(value);
                }
                let base = if value.location().is_synthetic() {
                    root.clone()
                } else {
                    value
                        .location()
                        .file
                        .parent()
                        .map_or_else(|| root.clone(), StdPath::to_path_buf)
                };
                let absolute = base.join(raw).to_string_lossy().into_owned();
                let location = value.location().clone();
                Ok(Value::from(absolute).with_location(location))
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

/// Runs each artifact's build command.
pub struct BuildArtifacts;

#[async_trait]
impl Mutator for BuildArtifacts {
    fn name(&self) -> &'static str {
        "BuildArtifacts"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        let mut diags = Diagnostics::new();
        let names: Vec<String> = bundle.config.artifacts.keys().cloned().collect();
        for name in names {
            let artifact = bundle.config.artifacts[&name].clone();
            let command = artifact.build.clone().or_else(|| {
                (artifact.artifact_type.as_deref() == Some("whl"))
                    .then(|| String::from(WHL_BUILD_COMMAND))
            });
            let Some(command) = command else {
                if artifact.files.is_empty() && !artifact.notebook {
                    return Diagnostics::from_error(LakewardError::Build(
                        BuildError::NothingToBuild { artifact: name },
                    ));
                }
                continue;
            };

            let workdir = artifact
                .path
                .as_deref()
                .map_or_else(|| bundle.root.clone(), PathBuf::from);
            info!(artifact = %name, command = %command, "building artifact");
            match run_build(&name, &command, &workdir).await {
                Ok(output) => {
                    if !output.trim().is_empty() {
                        diags.push(
                            Diagnostic::info(format!("built artifact '{name}'"))
                                .with_detail(output),
                        );
                    }
                }
                Err(err) => {
                    let mut diag = Diagnostic::from(err);
                    diag.summary = format!("build of artifact '{name}' failed: {}", diag.summary);
                    diags.push(diag);
                    return diags;
                }
            }

            // A whl build that declares no files picks up everything in dist/.
            if bundle.config.artifacts[&name].files.is_empty()
                && artifact.artifact_type.as_deref() == Some("whl")
            {
                let glob_source = workdir.join(WHL_OUTPUT_GLOB).to_string_lossy().into_owned();
                bundle.config.artifacts[&name]
                    .files
                    .push(crate::config::ArtifactFile {
                        source: glob_source,
                        remote_path: None,
                    });
            }
        }
        if let Err(err) = bundle.commit_typed() {
            return Diagnostics::from_error(err);
        }
        diags
    }
}

async fn run_build(name: &str, command: &str, workdir: &StdPath) -> Result<String> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .output()
        .await
        .map_err(|e| {
            LakewardError::Build(BuildError::CommandSpawn {
                artifact: name.to_string(),
                message: e.to_string(),
            })
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(LakewardError::Build(BuildError::CommandFailed {
            artifact: name.to_string(),
            code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
        }));
    }
    Ok(format!("{stdout}{stderr}"))
}

/// Uploads referenced artifact files and rewrites libraries to the remote
/// paths.
pub struct UploadArtifacts;

#[async_trait]
impl Mutator for UploadArtifacts {
    fn name(&self) -> &'static str {
        "UploadArtifacts"
    }

    async fn apply(&self, bundle: &mut Bundle) -> Diagnostics {
        if let Err(err) = bundle.refresh_typed() {
            return Diagnostics::from_error(err);
        }
        let workspace = match bundle.workspace() {
            Ok(ws) => ws,
            Err(err) => return Diagnostics::from_error(err),
        };
        let (artifact_path, file_path) = {
            let ws = &bundle.config.workspace;
            let Some(artifact_path) = ws.artifact_path.clone() else {
                return Diagnostics::single(Diagnostic::error(
                    "workspace.artifact_path is not set",
                ));
            };
            let Some(file_path) = ws.file_path.clone() else {
                return Diagnostics::single(Diagnostic::error("workspace.file_path is not set"));
            };
            (artifact_path, file_path)
        };

        let names: Vec<String> = bundle.config.artifacts.keys().cloned().collect();
        for name in names {
            let artifact = bundle.config.artifacts[&name].clone();
            let synthetic = artifact.build.is_none() && artifact.artifact_type.is_none();
            let mut first_remote: Option<String> = None;

            for (index, file) in artifact.files.iter().enumerate() {
                for local in expand_source(&file.source) {
                    let referenced = synthetic || is_referenced(bundle, &local);
                    if !referenced {
                        debug!(file = %local.display(), "no referencing library, skipping upload");
                        continue;
                    }
                    let remote = if synthetic {
                        let relative = local
                            .strip_prefix(&bundle.root)
                            .unwrap_or(&local)
                            .to_string_lossy()
                            .into_owned();
                        format!(
                            "{}/{}",
                            file_path.trim_end_matches('/'),
                            remote_name(&relative, artifact.notebook)
                        )
                    } else {
                        let basename = local
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        format!("{}/{basename}", artifact_path.trim_end_matches('/'))
                    };

                    let content = match tokio::fs::read(&local).await {
                        Ok(content) => content,
                        Err(e) => {
                            return Diagnostics::from_error(LakewardError::Build(
                                BuildError::CommandSpawn {
                                    artifact: name.clone(),
                                    message: format!(
                                        "cannot read produced file {}: {e}",
                                        local.display()
                                    ),
                                },
                            ))
                        }
                    };
                    info!(file = %local.display(), remote = %remote, "uploading artifact file");
                    if let Err(err) = with_retries("upload", DEFAULT_ATTEMPTS, || {
                        workspace.upload_file(&remote, content.clone())
                    })
                    .await
                    {
                        return Diagnostics::from_error(err);
                    }

                    rewrite_libraries(bundle, &local, &remote);
                    bundle.config.artifacts[&name].files[index].remote_path =
                        Some(remote.clone());
                    first_remote.get_or_insert(remote);
                }
            }
            if let Some(remote) = first_remote {
                bundle.config.artifacts[&name].remote_path = Some(remote);
            }
        }
        if let Err(err) = bundle.commit_typed() {
            return Diagnostics::from_error(err);
        }
        Diagnostics::new()
    }
}

/// Expands a source entry, which may be a glob, to concrete files.
fn expand_source(source: &str) -> Vec<PathBuf> {
    if !source.contains(['*', '?', '[']) {
        return vec![PathBuf::from(source)];
    }
    glob::glob(source).map_or_else(
        |_| Vec::new(),
        |paths| {
            let mut matches: Vec<PathBuf> = paths.filter_map(std::result::Result::ok).collect();
            matches.sort();
            matches
        },
    )
}

/// Whether any library declaration matches the produced file.
fn is_referenced(bundle: &Bundle, file: &StdPath) -> bool {
    bundle
        .config
        .resources
        .jobs
        .values()
        .flat_map(|job| job.tasks.iter())
        .flat_map(|task| task.libraries.iter())
        .any(|library| library_matches(bundle, library, file))
}

fn library_matches(bundle: &Bundle, library: &Library, file: &StdPath) -> bool {
    [library.whl.as_deref(), library.jar.as_deref()]
        .into_iter()
        .flatten()
        .any(|declared| {
            let absolute = if StdPath::new(declared).is_absolute() {
                PathBuf::from(declared)
            } else {
                bundle.root.join(declared)
            };
            glob::Pattern::new(&absolute.to_string_lossy())
                .is_ok_and(|pattern| pattern.matches_path(file))
        })
}

/// Points every library matching the uploaded file at its remote path.
fn rewrite_libraries(bundle: &mut Bundle, local: &StdPath, remote: &str) {
    let root = bundle.root.clone();
    let jobs = &mut bundle.config.resources.jobs;
    for job in jobs.values_mut() {
        for task in &mut job.tasks {
            for library in &mut task.libraries {
                let matches_local = |declared: &str| {
                    let absolute = if StdPath::new(declared).is_absolute() {
                        PathBuf::from(declared)
                    } else {
                        root.join(declared)
                    };
                    glob::Pattern::new(&absolute.to_string_lossy())
                        .is_ok_and(|pattern| pattern.matches_path(local))
                };
                if library.whl.as_deref().is_some_and(matches_local) {
                    library.whl = Some(remote.to_string());
                }
                if library.jar.as_deref().is_some_and(matches_local) {
                    library.jar = Some(remote.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resources::{Job, Task};
    use crate::config::{ArtifactConfig, ArtifactFile, User};
    use crate::mutator::apply;
    use crate::workspace::FsWorkspace;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_user() -> User {
        User {
            user_name: String::from("dev@example.com"),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_build_failure_captures_output() {
        let dir = TempDir::new().expect("tempdir");
        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle.config.artifacts.insert(
            String::from("broken"),
            ArtifactConfig {
                build: Some(String::from("echo oops >&2; exit 3")),
                ..ArtifactConfig::default()
            },
        );
        bundle.commit_typed().expect("commit");

        let diags = apply(&mut bundle, &BuildArtifacts).await;
        assert!(diags.has_error());
        let err = diags.first_error().expect("error");
        assert!(err.summary.contains("broken"));
    }

    #[tokio::test]
    async fn test_nothing_to_build_is_fatal() {
        let mut bundle = Bundle::for_tests();
        bundle.config.artifacts.insert(
            String::from("empty"),
            ArtifactConfig::default(),
        );
        bundle.commit_typed().expect("commit");

        let diags = apply(&mut bundle, &BuildArtifacts).await;
        assert!(diags.has_error());
    }

    #[tokio::test]
    async fn test_upload_rewrites_referencing_library() {
        let dir = TempDir::new().expect("tempdir");
        let wheel = dir.path().join("dist/pkg-1.0-py3-none-any.whl");
        tokio::fs::create_dir_all(wheel.parent().expect("parent"))
            .await
            .expect("mkdir");
        tokio::fs::write(&wheel, b"wheel-bytes").await.expect("write");

        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle.config.workspace.artifact_path = Some(String::from("/bundles/etl/artifacts"));
        bundle.config.workspace.file_path = Some(String::from("/bundles/etl/files"));
        bundle.config.artifacts.insert(
            String::from("pkg"),
            ArtifactConfig {
                build: Some(String::from("true")),
                files: vec![ArtifactFile {
                    source: wheel.to_string_lossy().into_owned(),
                    remote_path: None,
                }],
                ..ArtifactConfig::default()
            },
        );
        bundle.config.resources.jobs.insert(
            String::from("j"),
            Job {
                tasks: vec![Task {
                    task_key: String::from("t"),
                    libraries: vec![Library {
                        whl: Some(String::from("dist/*.whl")),
                        ..Library::default()
                    }],
                    ..Task::default()
                }],
                ..Job::default()
            },
        );
        bundle.commit_typed().expect("commit");
        bundle.set_workspace(Arc::new(FsWorkspace::new(
            dir.path().join("remote"),
            test_user(),
        )));

        let diags = apply(&mut bundle, &UploadArtifacts).await;
        assert!(!diags.has_error());

        let library = &bundle.config.resources.jobs["j"].tasks[0].libraries[0];
        assert_eq!(
            library.whl.as_deref(),
            Some("/bundles/etl/artifacts/pkg-1.0-py3-none-any.whl")
        );
        assert_eq!(
            bundle.config.artifacts["pkg"].files[0].remote_path.as_deref(),
            Some("/bundles/etl/artifacts/pkg-1.0-py3-none-any.whl")
        );
    }

    #[tokio::test]
    async fn test_unreferenced_file_skipped() {
        let dir = TempDir::new().expect("tempdir");
        let orphan = dir.path().join("dist/orphan.whl");
        tokio::fs::create_dir_all(orphan.parent().expect("parent"))
            .await
            .expect("mkdir");
        tokio::fs::write(&orphan, b"x").await.expect("write");

        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle.config.workspace.artifact_path = Some(String::from("/a"));
        bundle.config.workspace.file_path = Some(String::from("/f"));
        bundle.config.artifacts.insert(
            String::from("pkg"),
            ArtifactConfig {
                build: Some(String::from("true")),
                files: vec![ArtifactFile {
                    source: orphan.to_string_lossy().into_owned(),
                    remote_path: None,
                }],
                ..ArtifactConfig::default()
            },
        );
        bundle.commit_typed().expect("commit");
        bundle.set_workspace(Arc::new(FsWorkspace::new(
            dir.path().join("remote"),
            test_user(),
        )));

        let diags = apply(&mut bundle, &UploadArtifacts).await;
        assert!(!diags.has_error());
        assert!(bundle.config.artifacts["pkg"].files[0].remote_path.is_none());
    }

    #[tokio::test]
    async fn test_synthetic_notebook_uploads_under_file_path() {
        let dir = TempDir::new().expect("tempdir");
        let nb = dir.path().join("src/run.py");
        tokio::fs::create_dir_all(nb.parent().expect("parent"))
            .await
            .expect("mkdir");
        tokio::fs::write(&nb, b"# Lakeward notebook source\n")
            .await
            .expect("write");

        let mut bundle = Bundle::for_tests();
        bundle.root = dir.path().to_path_buf();
        bundle.config.workspace.artifact_path = Some(String::from("/bundles/etl/artifacts"));
        bundle.config.workspace.file_path = Some(String::from("/bundles/etl/files"));
        bundle.config.artifacts.insert(
            String::from("src_run_py"),
            ArtifactConfig {
                files: vec![ArtifactFile {
                    source: nb.to_string_lossy().into_owned(),
                    remote_path: None,
                }],
                notebook: true,
                ..ArtifactConfig::default()
            },
        );
        bundle.commit_typed().expect("commit");
        bundle.set_workspace(Arc::new(FsWorkspace::new(
            dir.path().join("remote"),
            test_user(),
        )));

        let diags = apply(&mut bundle, &UploadArtifacts).await;
        assert!(!diags.has_error());
        assert_eq!(
            bundle.config.artifacts["src_run_py"].remote_path.as_deref(),
            Some("/bundles/etl/files/src/run")
        );
    }
}

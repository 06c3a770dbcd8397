//! Notebook detection.
//!
//! A local `*.py` file whose first line is the platform notebook marker is
//! imported as a notebook: its remote name drops the `.py` suffix and a
//! conversion between plain file and notebook must be replayed as
//! delete-then-put.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::Result;

/// First-line comment marking a Python file as a notebook export.
pub const NOTEBOOK_MARKER: &str = "# Lakeward notebook source";

/// Whether the local file tracks as a notebook.
///
/// Only `*.py` files qualify; the first line must equal the marker exactly.
///
/// # Errors
///
/// Fails when the file cannot be opened or read.
pub async fn is_notebook(path: &Path) -> Result<bool> {
    if path.extension().is_none_or(|ext| ext != "py") {
        return Ok(false);
    }
    let file = File::open(path).await?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).await?;
    Ok(first_line.trim_end() == NOTEBOOK_MARKER)
}

/// The remote name of a synced path: notebooks drop the `.py` suffix.
#[must_use]
pub fn remote_name(relative_path: &str, notebook: bool) -> String {
    if notebook {
        relative_path
            .strip_suffix(".py")
            .unwrap_or(relative_path)
            .to_string()
    } else {
        relative_path.to_string()
    }
}

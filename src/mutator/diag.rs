//! Structured diagnostics.
//!
//! Mutators report through diagnostics rather than bare errors, so a single
//! run can surface every problem it found with full source locations. An
//! error diagnostic stops the pipeline; warnings and infos never do.

use std::fmt;

use colored::Colorize;
use serde::Serialize;

use crate::dynvalue::{Location, Path};
use crate::error::LakewardError;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fatal: fails the run.
    Error,
    /// Surfaced, but the run continues.
    Warning,
    /// Informational.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        write!(f, "{s}")
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Severity of the record.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Optional multi-line detail (e.g. captured build output).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted config path the diagnostic refers to.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "path_as_string")]
    pub path: Option<Path>,
    /// Source location the diagnostic refers to.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "location_as_string")]
    pub location: Option<Location>,
}

#[allow(clippy::ref_option)]
fn path_as_string<S: serde::Serializer>(
    path: &Option<Path>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match path {
        Some(p) => serializer.serialize_some(&p.to_string()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::ref_option)]
fn location_as_string<S: serde::Serializer>(
    location: &Option<Location>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match location {
        Some(l) => serializer.serialize_some(&l.to_string()),
        None => serializer.serialize_none(),
    }
}

impl Diagnostic {
    /// Creates an error diagnostic.
    #[must_use]
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            path: None,
            location: None,
        }
    }

    /// Creates a warning diagnostic.
    #[must_use]
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
            path: None,
            location: None,
        }
    }

    /// Creates an info diagnostic.
    #[must_use]
    pub fn info(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            summary: summary.into(),
            detail: None,
            path: None,
            location: None,
        }
    }

    /// Attaches a detail body.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches a config path.
    #[must_use]
    pub fn with_path(mut self, path: Path) -> Self {
        self.path = Some(path);
        self
    }

    /// Attaches a source location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Renders the diagnostic for terminal output with a colored severity
    /// marker.
    #[must_use]
    pub fn render(&self) -> String {
        let marker = match self.severity {
            Severity::Error => "error".red().bold().to_string(),
            Severity::Warning => "warning".yellow().bold().to_string(),
            Severity::Info => "info".cyan().to_string(),
        };
        let mut out = format!("{marker}: {}", self.summary);
        if let Some(path) = &self.path {
            out.push_str(&format!("\n  at {path}"));
        }
        if let Some(location) = &self.location {
            out.push_str(&format!("\n  in {location}"));
        }
        if let Some(detail) = &self.detail {
            for line in detail.lines() {
                out.push_str(&format!("\n    {line}"));
            }
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

impl From<LakewardError> for Diagnostic {
    fn from(err: LakewardError) -> Self {
        use crate::error::ConfigError;
        // Config errors that know their source location surface it.
        let location = match &err {
            LakewardError::Config(
                ConfigError::InterpolationCycle { location, .. }
                | ConfigError::UnresolvedReference { location, .. }
                | ConfigError::PathNotFound { location, .. }
                | ConfigError::ParseError { location, .. }
                | ConfigError::AbsoluteInclude { location, .. },
            ) => Some(location.clone()),
            _ => None,
        };
        let mut d = Self::error(err.to_string());
        d.location = location;
        d
    }
}

/// An ordered list of diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// An empty diagnostics list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// A list holding a single record.
    #[must_use]
    pub fn single(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }

    /// Wraps an error as a single error diagnostic.
    #[must_use]
    pub fn from_error(err: LakewardError) -> Self {
        Self::single(Diagnostic::from(err))
    }

    /// Appends a record.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Appends all records from another list.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Whether any record is an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// The first error record, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.0.iter().find(|d| d.severity == Severity::Error)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_error() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning("inferred git branch"));
        assert!(!diags.has_error());
        diags.push(Diagnostic::error("duplicate key"));
        assert!(diags.has_error());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_render_includes_path_and_location() {
        let d = Diagnostic::error("bad value")
            .with_path(Path::parse("resources.jobs.j").expect("path"))
            .with_location(Location::new("root.yml", 2, 4));
        let rendered = d.render();
        assert!(rendered.contains("resources.jobs.j"));
        assert!(rendered.contains("root.yml:2:4"));
    }

    #[test]
    fn test_json_serialization_shape() {
        let d = Diagnostic::warning("w").with_location(Location::new("a.yml", 1, 2));
        let json = serde_json::to_value(Diagnostics::single(d)).expect("json");
        assert_eq!(json[0]["severity"], "warning");
        assert_eq!(json[0]["location"], "a.yml:1:2");
    }
}

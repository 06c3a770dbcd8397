//! Reference interpolation: `${a.b.c}` resolution over the dynamic tree.
//!
//! Any string leaf may embed dot-path references. A leaf that is exactly one
//! reference adopts the referenced value's kind; embedded references
//! stringify scalars. `${var.NAME}` dereferences a declared variable (its
//! `value`, falling back to its `default`). Resolution recurses through
//! referenced strings; a currently-resolving set detects cycles.
//!
//! Interpolation is scoped: the caller may restrict resolvable top-level
//! prefixes. References outside the scope stay literal, which is how the
//! initialize phase resolves `bundle.*`/`workspace.*` while leaving
//! `resources.*` cross-references for the IaC handoff.

use crate::error::{ConfigError, LakewardError, Result};

use super::path::Path;
use super::value::{Location, Value};
use super::walk::WalkControl;

/// Hard recursion limit; anything deeper is reported as a cycle.
const MAX_RESOLVE_DEPTH: usize = 64;

/// Returns true if the string embeds at least one `${...}` reference.
#[must_use]
pub fn contains_reference(s: &str) -> bool {
    s.contains("${")
}

/// Resolves references in every string leaf of `tree`.
///
/// `scopes` lists the resolvable top-level prefixes (e.g. `bundle`,
/// `workspace`, `var`); an empty slice resolves everything. Out-of-scope
/// references remain literal.
///
/// # Errors
///
/// Returns configuration errors for unresolvable in-scope references,
/// undeclared or valueless variables, and interpolation cycles.
pub fn interpolate(tree: Value, scopes: &[&str]) -> Result<Value> {
    let snapshot = tree.clone();
    let resolved = tree.transform(&mut |_, value| {
        let Some(s) = value.as_str() else {
            return Ok(WalkControl::Keep(value));
        };
        if !contains_reference(s) {
            return Ok(WalkControl::Keep(value));
        }
        let mut visiting = Vec::new();
        let out = resolve_leaf(&snapshot, s, value.location(), scopes, &mut visiting)?;
        match out {
            Some(new_value) => {
                let mut replaced = new_value.with_location(value.location().clone());
                for loc in value.extra_locations() {
                    replaced.record_location(loc.clone());
                }
                Ok(WalkControl::Keep(replaced))
            }
            None => Ok(WalkControl::Keep(value)),
        }
    })?;
    Ok(resolved.unwrap_or_else(Value::invalid))
}

/// Resolves one string leaf. Returns `None` when nothing changed (all
/// references out of scope).
fn resolve_leaf(
    tree: &Value,
    s: &str,
    location: &Location,
    scopes: &[&str],
    visiting: &mut Vec<String>,
) -> Result<Option<Value>> {
    let segments = split_references(s);

    // A pure reference adopts the referenced value's kind.
    if let [Segment::Reference(reference)] = segments.as_slice() {
        if !in_scope(reference, scopes) {
            return Ok(None);
        }
        let resolved = resolve_reference(tree, reference, location, scopes, visiting)?;
        return Ok(Some(resolved));
    }

    let mut out = String::new();
    let mut changed = false;
    for segment in &segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Reference(reference) => {
                if in_scope(reference, scopes) {
                    let resolved =
                        resolve_reference(tree, reference, location, scopes, visiting)?;
                    let rendered = resolved.scalar_string().ok_or_else(|| {
                        LakewardError::Config(ConfigError::UnresolvedReference {
                            reference: reference.clone(),
                            location: location.clone(),
                        })
                    })?;
                    out.push_str(&rendered);
                    changed = true;
                } else {
                    out.push_str("${");
                    out.push_str(reference);
                    out.push('}');
                }
            }
        }
    }
    Ok(changed.then(|| Value::from(out)))
}

/// Resolves a single dot-path reference, recursing through referenced
/// strings and detecting cycles.
fn resolve_reference(
    tree: &Value,
    reference: &str,
    location: &Location,
    scopes: &[&str],
    visiting: &mut Vec<String>,
) -> Result<Value> {
    if visiting.iter().any(|r| r == reference) || visiting.len() >= MAX_RESOLVE_DEPTH {
        let mut paths = visiting.clone();
        paths.push(reference.to_string());
        return Err(LakewardError::Config(ConfigError::InterpolationCycle {
            paths,
            location: location.clone(),
        }));
    }

    visiting.push(reference.to_string());
    let result = resolve_reference_value(tree, reference, location, scopes, visiting);
    visiting.pop();
    result
}

fn resolve_reference_value(
    tree: &Value,
    reference: &str,
    location: &Location,
    scopes: &[&str],
    visiting: &mut Vec<String>,
) -> Result<Value> {
    let target = if let Some(var_name) = reference.strip_prefix("var.") {
        lookup_variable(tree, var_name)?
    } else {
        let path = Path::parse(reference).map_err(|e| {
            LakewardError::Config(ConfigError::UnresolvedReference {
                reference: format!("{reference} ({e})"),
                location: location.clone(),
            })
        })?;
        tree.get(&path).cloned().ok_or_else(|| {
            LakewardError::Config(ConfigError::UnresolvedReference {
                reference: reference.to_string(),
                location: location.clone(),
            })
        })?
    };

    // A referenced string may itself contain references.
    if let Some(s) = target.as_str() {
        if contains_reference(s) {
            let inner = resolve_leaf(tree, s, target.location(), scopes, visiting)?;
            if let Some(v) = inner {
                return Ok(v);
            }
        }
    }
    Ok(target)
}

/// Dereferences `${var.NAME}`: the variable's `value` if set, else its
/// `default`.
fn lookup_variable(tree: &Value, name: &str) -> Result<Value> {
    let declaration = tree
        .get_str_path(&format!("variables.{name}"))
        .ok_or_else(|| {
            LakewardError::Config(ConfigError::UndeclaredVariable {
                name: name.to_string(),
            })
        })?;

    if let Some(value) = declaration.get_str_path("value") {
        if value.is_valid() && !value.is_nil() {
            return Ok(value.clone());
        }
    }
    if let Some(default) = declaration.get_str_path("default") {
        if default.is_valid() && !default.is_nil() {
            return Ok(default.clone());
        }
    }
    Err(LakewardError::Config(ConfigError::UnresolvedVariable {
        name: name.to_string(),
    }))
}

fn in_scope(reference: &str, scopes: &[&str]) -> bool {
    if scopes.is_empty() {
        return true;
    }
    let head = reference.split('.').next().unwrap_or(reference);
    scopes.iter().any(|s| *s == head)
}

enum Segment {
    Literal(String),
    Reference(String),
}

/// Splits a string into literal runs and `${...}` reference bodies.
/// An unterminated `${` is treated as literal text.
fn split_references(s: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        segments.push(Segment::Reference(rest[start + 2..start + end].trim().to_string()));
        rest = &rest[start + end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    segments
}

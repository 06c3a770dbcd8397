//! Config paths and match patterns.
//!
//! A [`Path`] addresses one node in the dynamic tree as a sequence of map
//! keys and sequence indexes, written `resources.jobs.j.tasks[1].name`.
//! A [`Pattern`] is a path with wildcards: `*` matches any key and `[*]`
//! matches any index.

use std::fmt;

/// One step of a path: a map key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    /// Map key.
    Key(String),
    /// Sequence index.
    Index(usize),
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A path into the dynamic tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Component>);

impl Path {
    /// The empty path (the tree root).
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from components.
    #[must_use]
    pub const fn from_components(components: Vec<Component>) -> Self {
        Self(components)
    }

    /// Parses a dotted path string such as `resources.jobs.j.tasks[1]`.
    ///
    /// # Errors
    ///
    /// Returns a description of the malformed segment.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut components = Vec::new();
        if s.is_empty() {
            return Ok(Self(components));
        }
        for segment in s.split('.') {
            parse_segment(segment, &mut components)?;
        }
        Ok(Self(components))
    }

    /// The components of this path.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.0
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a key component.
    pub fn push_key(&mut self, key: impl Into<String>) {
        self.0.push(Component::Key(key.into()));
    }

    /// Appends an index component.
    pub fn push_index(&mut self, index: usize) {
        self.0.push(Component::Index(index));
    }

    /// Removes the last component.
    pub fn pop(&mut self) -> Option<Component> {
        self.0.pop()
    }

    /// Returns a new path with a key appended.
    #[must_use]
    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut p = self.clone();
        p.push_key(key);
        p
    }

    /// Returns a new path with an index appended.
    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        let mut p = self.clone();
        p.push_index(index);
        p
    }

    /// Whether `prefix` is a prefix of this path.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        prefix.0.len() <= self.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// The first component as a key, if there is one.
    #[must_use]
    pub fn first_key(&self) -> Option<&str> {
        match self.0.first() {
            Some(Component::Key(k)) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.0 {
            match c {
                Component::Key(k) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{k}")?;
                }
                Component::Index(i) => write!(f, "[{i}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

/// One step of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternComponent {
    /// An exact map key.
    Key(String),
    /// An exact sequence index.
    Index(usize),
    /// Any map key.
    AnyKey,
    /// Any sequence index.
    AnyIndex,
}

/// A path pattern with `*` (any key) and `[*]` (any index) wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern(Vec<PatternComponent>);

impl Pattern {
    /// Builds a pattern from components.
    #[must_use]
    pub const fn from_components(components: Vec<PatternComponent>) -> Self {
        Self(components)
    }

    /// Parses a pattern string such as `resources.jobs.*.tasks[*]`.
    ///
    /// # Errors
    ///
    /// Returns a description of the malformed segment.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut components = Vec::new();
        if s.is_empty() {
            return Ok(Self(components));
        }
        for segment in s.split('.') {
            parse_pattern_segment(segment, &mut components)?;
        }
        Ok(Self(components))
    }

    /// The components of this pattern.
    #[must_use]
    pub fn components(&self) -> &[PatternComponent] {
        &self.0
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the pattern is empty (matches only the root).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the pattern matches `path` exactly (same length).
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.0.len() == path.len() && self.matches_prefix(path)
    }

    /// Whether `path` is a prefix-compatible partial match; used by the
    /// walker to decide whether to descend.
    #[must_use]
    pub fn matches_prefix(&self, path: &Path) -> bool {
        if path.len() > self.0.len() {
            return false;
        }
        path.components()
            .iter()
            .zip(self.0.iter())
            .all(|(c, p)| component_matches(c, p))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.0 {
            match c {
                PatternComponent::Key(k) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{k}")?;
                }
                PatternComponent::AnyKey => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "*")?;
                }
                PatternComponent::Index(i) => write!(f, "[{i}]")?,
                PatternComponent::AnyIndex => write!(f, "[*]")?,
            }
            first = false;
        }
        Ok(())
    }
}

fn component_matches(c: &Component, p: &PatternComponent) -> bool {
    match (c, p) {
        (Component::Key(k), PatternComponent::Key(pk)) => k == pk,
        (Component::Key(_), PatternComponent::AnyKey)
        | (Component::Index(_), PatternComponent::AnyIndex) => true,
        (Component::Index(i), PatternComponent::Index(pi)) => *i == *pi,
        _ => false,
    }
}

/// Splits a dot-free segment such as `tasks[1][2]` into a key component
/// followed by index components.
fn parse_segment(segment: &str, out: &mut Vec<Component>) -> Result<(), String> {
    let (key, indexes) = split_indexes(segment)?;
    if key.is_empty() && indexes.is_empty() {
        return Err(format!("empty path segment in '{segment}'"));
    }
    if !key.is_empty() {
        out.push(Component::Key(key.to_string()));
    }
    for idx in indexes {
        let i: usize = idx
            .parse()
            .map_err(|_| format!("invalid index '[{idx}]' in path segment '{segment}'"))?;
        out.push(Component::Index(i));
    }
    Ok(())
}

fn parse_pattern_segment(segment: &str, out: &mut Vec<PatternComponent>) -> Result<(), String> {
    let (key, indexes) = split_indexes(segment)?;
    if key.is_empty() && indexes.is_empty() {
        return Err(format!("empty pattern segment in '{segment}'"));
    }
    if !key.is_empty() {
        if key == "*" {
            out.push(PatternComponent::AnyKey);
        } else {
            out.push(PatternComponent::Key(key.to_string()));
        }
    }
    for idx in indexes {
        if idx == "*" {
            out.push(PatternComponent::AnyIndex);
        } else {
            let i: usize = idx
                .parse()
                .map_err(|_| format!("invalid index '[{idx}]' in pattern segment '{segment}'"))?;
            out.push(PatternComponent::Index(i));
        }
    }
    Ok(())
}

/// Splits `key[1][2]` into (`key`, ["1", "2"]).
fn split_indexes(segment: &str) -> Result<(&str, Vec<&str>), String> {
    let Some(bracket) = segment.find('[') else {
        return Ok((segment, Vec::new()));
    };
    let key = &segment[..bracket];
    let mut rest = &segment[bracket..];
    let mut indexes = Vec::new();
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(format!("malformed index syntax in '{segment}'"));
        }
        let close = rest
            .find(']')
            .ok_or_else(|| format!("unclosed '[' in '{segment}'"))?;
        indexes.push(&rest[1..close]);
        rest = &rest[close + 1..];
    }
    Ok((key, indexes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        let p = Path::parse("resources.jobs.j.tasks[1].name").expect("parse");
        assert_eq!(p.len(), 6);
        assert_eq!(p.to_string(), "resources.jobs.j.tasks[1].name");
    }

    #[test]
    fn test_parse_rejects_bad_index() {
        assert!(Path::parse("a.b[x]").is_err());
        assert!(Path::parse("a.b[1").is_err());
    }

    #[test]
    fn test_pattern_matching() {
        let pat = Pattern::parse("resources.jobs.*.tasks[*]").expect("parse");
        let hit = Path::parse("resources.jobs.etl.tasks[0]").expect("parse");
        let miss_kind = Path::parse("resources.pipelines.etl.tasks[0]").expect("parse");
        let miss_len = Path::parse("resources.jobs.etl.tasks").expect("parse");

        assert!(pat.matches(&hit));
        assert!(!pat.matches(&miss_kind));
        assert!(!pat.matches(&miss_len));
        assert!(pat.matches_prefix(&miss_len));
    }

    #[test]
    fn test_starts_with() {
        let p = Path::parse("bundle.git.branch").expect("parse");
        let prefix = Path::parse("bundle").expect("parse");
        let other = Path::parse("workspace").expect("parse");
        assert!(p.starts_with(&prefix));
        assert!(!p.starts_with(&other));
    }
}

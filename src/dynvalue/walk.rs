//! Tree traversal primitives: get, set, walk, pattern mapping.
//!
//! The walker visits depth-first, pre-order. The visitor returns a new value
//! or one of two sentinels: [`WalkControl::Drop`] removes the node from its
//! parent, [`WalkControl::Skip`] keeps the returned value without visiting
//! its children. Locations attach to the returned value: they propagate from
//! the input unless the visitor attaches fresh ones.

use crate::error::Result;

use super::path::{Component, Path, Pattern, PatternComponent};
use super::value::{Value, ValueData};

/// Visitor verdict for one node.
#[derive(Debug)]
pub enum WalkControl {
    /// Keep this value and visit its children.
    Keep(Value),
    /// Keep this value as-is; do not visit children.
    Skip(Value),
    /// Remove this node from its parent.
    Drop,
}

impl Value {
    /// Looks up the node at `path`, or `None` if any step misses.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Self> {
        let mut current = self;
        for component in path.components() {
            match (component, current.data()) {
                (Component::Key(k), ValueData::Map(m)) => current = m.get(k)?,
                (Component::Index(i), ValueData::Sequence(s)) => current = s.get(*i)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Looks up the node at `path`, returning a clone or the invalid
    /// sentinel. Non-matching keys produce the invalid kind rather than an
    /// error, so lookups compose through walks.
    #[must_use]
    pub fn get_or_invalid(&self, path: &Path) -> Self {
        self.get(path).cloned().unwrap_or_else(Self::invalid)
    }

    /// Convenience: looks up a dotted path string.
    #[must_use]
    pub fn get_str_path(&self, path: &str) -> Option<&Self> {
        let parsed = Path::parse(path).ok()?;
        self.get(&parsed)
    }

    /// Sets the node at `path`, creating intermediate maps as needed.
    /// Setting index `len` on a sequence appends.
    ///
    /// # Errors
    ///
    /// Returns an internal error when a step addresses an existing node of
    /// the wrong kind or a sequence index past the end.
    pub fn set_at(&mut self, path: &Path, new: Self) -> Result<()> {
        use crate::error::LakewardError;

        let mut current = self;
        let components = path.components();
        for (depth, component) in components.iter().enumerate() {
            let last = depth == components.len() - 1;
            match component {
                Component::Key(k) => {
                    if !matches!(current.data(), ValueData::Map(_)) {
                        if current.is_valid() && !current.is_nil() {
                            return Err(LakewardError::internal(format!(
                                "cannot set key '{k}' on a {} value",
                                current.kind()
                            )));
                        }
                        *current.data_mut() = ValueData::Map(indexmap::IndexMap::new());
                    }
                    let map = current
                        .as_map_mut()
                        .ok_or_else(|| LakewardError::internal("map access after coercion"))?;
                    if last {
                        map.insert(k.clone(), new);
                        return Ok(());
                    }
                    current = map.entry(k.clone()).or_insert_with(Self::empty_map);
                }
                Component::Index(i) => {
                    let seq = current.as_sequence_mut().ok_or_else(|| {
                        LakewardError::internal(format!("cannot index into a non-sequence with [{i}]"))
                    })?;
                    if *i > seq.len() {
                        return Err(LakewardError::internal(format!(
                            "index [{i}] out of bounds (len {})",
                            seq.len()
                        )));
                    }
                    if *i == seq.len() {
                        seq.push(Self::empty_map());
                    }
                    if last {
                        seq[*i] = new;
                        return Ok(());
                    }
                    current = &mut seq[*i];
                }
            }
        }
        // Empty path replaces the root.
        *current = new;
        Ok(())
    }

    /// Removes and returns the node at `path`.
    pub fn remove_at(&mut self, path: &Path) -> Option<Self> {
        let components = path.components();
        let (last, parent_path) = components.split_last()?;
        let parent = {
            let mut current = self;
            for component in parent_path {
                match component {
                    Component::Key(k) => current = current.as_map_mut()?.get_mut(k)?,
                    Component::Index(i) => current = current.as_sequence_mut()?.get_mut(*i)?,
                }
            }
            current
        };
        match last {
            Component::Key(k) => parent.as_map_mut()?.shift_remove(k),
            Component::Index(i) => {
                let seq = parent.as_sequence_mut()?;
                (*i < seq.len()).then(|| seq.remove(*i))
            }
        }
    }

    /// Depth-first pre-order transformation of the whole tree.
    ///
    /// Invalid values are skipped without error and without visiting.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by the visitor.
    pub fn transform<F>(self, f: &mut F) -> Result<Option<Self>>
    where
        F: FnMut(&Path, Self) -> Result<WalkControl>,
    {
        let mut path = Path::root();
        transform_inner(self, &mut path, f)
    }

    /// Visits every node without modification.
    pub fn foreach<F>(&self, f: &mut F)
    where
        F: FnMut(&Path, &Self),
    {
        let mut path = Path::root();
        foreach_inner(self, &mut path, f);
    }

    /// Applies `f` to every node whose path matches `pattern`, rebuilding
    /// the spine. Containers are only descended into where the pattern
    /// prefix can still match.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn map_by_pattern<F>(self, pattern: &Pattern, f: &mut F) -> Result<Self>
    where
        F: FnMut(&Path, Self) -> Result<Self>,
    {
        let mut path = Path::root();
        map_pattern_inner(self, pattern, &mut path, f)
    }

    /// Applies `f` to every node under `prefix` (inclusive).
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn map_under<F>(self, prefix: &Path, f: &mut F) -> Result<Self>
    where
        F: FnMut(&Path, Self) -> Result<WalkControl>,
    {
        let prefix = prefix.clone();
        let transformed = self.transform(&mut |path, value| {
            if path.starts_with(&prefix) {
                f(path, value)
            } else if prefix.starts_with(path) {
                // On the way down to the prefix; keep descending.
                Ok(WalkControl::Keep(value))
            } else {
                Ok(WalkControl::Skip(value))
            }
        })?;
        Ok(transformed.unwrap_or_else(Self::invalid))
    }
}

fn transform_inner<F>(value: Value, path: &mut Path, f: &mut F) -> Result<Option<Value>>
where
    F: FnMut(&Path, Value) -> Result<WalkControl>,
{
    if !value.is_valid() {
        return Ok(Some(value));
    }
    let value = match f(path, value)? {
        WalkControl::Drop => return Ok(None),
        WalkControl::Skip(v) => return Ok(Some(v)),
        WalkControl::Keep(v) => v,
    };
    match value.into_parts() {
        (ValueData::Map(map), loc, extra, anchor) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (key, child) in map {
                path.push_key(key.clone());
                let mapped = transform_inner(child, path, f)?;
                path.pop();
                if let Some(v) = mapped {
                    out.insert(key, v);
                }
            }
            Ok(Some(Value::assemble(ValueData::Map(out), loc, extra, anchor)))
        }
        (ValueData::Sequence(seq), loc, extra, anchor) => {
            let mut out = Vec::with_capacity(seq.len());
            for (i, child) in seq.into_iter().enumerate() {
                path.push_index(i);
                let mapped = transform_inner(child, path, f)?;
                path.pop();
                if let Some(v) = mapped {
                    out.push(v);
                }
            }
            Ok(Some(Value::assemble(
                ValueData::Sequence(out),
                loc,
                extra,
                anchor,
            )))
        }
        (data, loc, extra, anchor) => Ok(Some(Value::assemble(data, loc, extra, anchor))),
    }
}

fn foreach_inner<F>(value: &Value, path: &mut Path, f: &mut F)
where
    F: FnMut(&Path, &Value),
{
    if !value.is_valid() {
        return;
    }
    f(path, value);
    match value.data() {
        ValueData::Map(map) => {
            for (key, child) in map {
                path.push_key(key.clone());
                foreach_inner(child, path, f);
                path.pop();
            }
        }
        ValueData::Sequence(seq) => {
            for (i, child) in seq.iter().enumerate() {
                path.push_index(i);
                foreach_inner(child, path, f);
                path.pop();
            }
        }
        _ => {}
    }
}

fn map_pattern_inner<F>(
    value: Value,
    pattern: &Pattern,
    path: &mut Path,
    f: &mut F,
) -> Result<Value>
where
    F: FnMut(&Path, Value) -> Result<Value>,
{
    if !value.is_valid() {
        return Ok(value);
    }
    if pattern.matches(path) {
        return f(path, value);
    }
    // Only descend where the pattern can still be completed.
    let depth = path.len();
    match value.into_parts() {
        (ValueData::Map(map), loc, extra, anchor)
            if matches!(
                pattern.components().get(depth),
                Some(PatternComponent::Key(_) | PatternComponent::AnyKey)
            ) =>
        {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (key, child) in map {
                path.push_key(key.clone());
                let mapped = if pattern.matches_prefix(path) {
                    map_pattern_inner(child, pattern, path, f)?
                } else {
                    child
                };
                path.pop();
                out.insert(key, mapped);
            }
            Ok(Value::assemble(ValueData::Map(out), loc, extra, anchor))
        }
        (ValueData::Sequence(seq), loc, extra, anchor)
            if matches!(
                pattern.components().get(depth),
                Some(PatternComponent::Index(_) | PatternComponent::AnyIndex)
            ) =>
        {
            let mut out = Vec::with_capacity(seq.len());
            for (i, child) in seq.into_iter().enumerate() {
                path.push_index(i);
                let mapped = if pattern.matches_prefix(path) {
                    map_pattern_inner(child, pattern, path, f)?
                } else {
                    child
                };
                path.pop();
                out.push(mapped);
            }
            Ok(Value::assemble(ValueData::Sequence(out), loc, extra, anchor))
        }
        (data, loc, extra, anchor) => Ok(Value::assemble(data, loc, extra, anchor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynvalue::Location;
    use indexmap::IndexMap;

    fn sample() -> Value {
        let mut tasks = Vec::new();
        let mut t0 = IndexMap::new();
        t0.insert("task_key".to_string(), Value::from("a"));
        tasks.push(Value::from(t0));

        let mut job = IndexMap::new();
        job.insert("name".to_string(), Value::from("etl"));
        job.insert("tasks".to_string(), Value::from(tasks));

        let mut jobs = IndexMap::new();
        jobs.insert("j".to_string(), Value::from(job));

        let mut resources = IndexMap::new();
        resources.insert("jobs".to_string(), Value::from(jobs));

        let mut root = IndexMap::new();
        root.insert("resources".to_string(), Value::from(resources));
        Value::from(root)
    }

    #[test]
    fn test_get_hits_and_misses() {
        let v = sample();
        let name = v.get_str_path("resources.jobs.j.name").expect("hit");
        assert_eq!(name.as_str(), Some("etl"));

        assert!(v.get_str_path("resources.pipelines.x").is_none());
        assert_eq!(
            v.get_or_invalid(&Path::parse("resources.jobs.j.nope").expect("parse"))
                .kind(),
            crate::dynvalue::Kind::Invalid
        );
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut v = Value::empty_map();
        let path = Path::parse("bundle.git.branch").expect("parse");
        v.set_at(&path, Value::from("main")).expect("set");
        assert_eq!(
            v.get_str_path("bundle.git.branch").and_then(Value::as_str),
            Some("main")
        );
    }

    #[test]
    fn test_set_appends_to_sequence() {
        let mut v = sample();
        let path = Path::parse("resources.jobs.j.tasks[1]").expect("parse");
        let mut t1 = IndexMap::new();
        t1.insert("task_key".to_string(), Value::from("b"));
        v.set_at(&path, Value::from(t1)).expect("set");

        let tasks = v
            .get_str_path("resources.jobs.j.tasks")
            .and_then(Value::as_sequence)
            .expect("tasks");
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_transform_drop_removes_node() {
        let v = sample();
        let out = v
            .transform(&mut |path, value| {
                if path.to_string() == "resources.jobs.j.name" {
                    Ok(WalkControl::Drop)
                } else {
                    Ok(WalkControl::Keep(value))
                }
            })
            .expect("transform")
            .expect("root kept");
        assert!(out.get_str_path("resources.jobs.j.name").is_none());
        assert!(out.get_str_path("resources.jobs.j.tasks").is_some());
    }

    #[test]
    fn test_transform_skip_leaves_children() {
        let v = sample();
        let mut visited_under_job = false;
        let _ = v
            .clone()
            .transform(&mut |path, value| {
                if path.to_string() == "resources.jobs.j" {
                    return Ok(WalkControl::Skip(value));
                }
                if path.to_string().starts_with("resources.jobs.j.") {
                    visited_under_job = true;
                }
                Ok(WalkControl::Keep(value))
            })
            .expect("transform");
        assert!(!visited_under_job);
    }

    #[test]
    fn test_map_by_pattern_targets_matching_nodes() {
        let pattern = Pattern::parse("resources.jobs.*.name").expect("parse");
        let out = sample()
            .map_by_pattern(&pattern, &mut |_, v| {
                let loc = v.location().clone();
                let renamed = format!("[dev] {}", v.as_str().unwrap_or_default());
                Ok(Value::from(renamed).with_location(loc))
            })
            .expect("map");
        assert_eq!(
            out.get_str_path("resources.jobs.j.name").and_then(Value::as_str),
            Some("[dev] etl")
        );
    }

    #[test]
    fn test_remove_at() {
        let mut v = sample();
        let removed = v.remove_at(&Path::parse("resources.jobs.j.tasks[0]").expect("parse"));
        assert!(removed.is_some());
        let tasks = v
            .get_str_path("resources.jobs.j.tasks")
            .and_then(Value::as_sequence)
            .expect("tasks");
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_locations_survive_transform() {
        let v = sample();
        let loc = Location::new("root.yml", 4, 2);
        let tagged = v
            .transform(&mut |path, value| {
                if path.to_string() == "resources.jobs.j.name" {
                    Ok(WalkControl::Keep(value.with_location(loc.clone())))
                } else {
                    Ok(WalkControl::Keep(value))
                }
            })
            .expect("transform")
            .expect("root");
        let name = tagged.get_str_path("resources.jobs.j.name").expect("name");
        assert_eq!(name.location(), &loc);
    }
}

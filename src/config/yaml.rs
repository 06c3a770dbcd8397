//! YAML reader producing location-annotated dynamic values.
//!
//! The usual serde path drops source positions, so this reader drives the
//! marked event parser directly and records the file, line, and column of
//! every node it builds. Anchors are resolved in-place and the anchored
//! node is flagged, which lets later validation skip anchor-only helper
//! blocks. Only the first document of a multi-document file is read.

use std::collections::HashMap;
use std::path::Path as StdPath;

use indexmap::IndexMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::dynvalue::{parse_timestamp, Location, Value, ValueData};
use crate::error::{ConfigError, LakewardError, Result};

/// Parses YAML source into a dynamic value.
///
/// `file` is recorded as the source file of every location. An empty or
/// comment-only document yields nil.
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] with the offending position when the
/// source is not well-formed YAML.
pub fn load_str(source: &str, file: &StdPath) -> Result<Value> {
    let mut builder = TreeBuilder::new(file);
    let mut parser = Parser::new_from_str(source);
    parser.load(&mut builder, false).map_err(|e| {
        let marker = *e.marker();
        LakewardError::Config(ConfigError::parse(
            Location::new(file, marker.line(), marker.col() + 1),
            e.info(),
        ))
    })?;
    Ok(builder
        .root
        .unwrap_or_else(|| Value::nil().with_location(Location::new(file, 1, 1))))
}

/// Reads and parses a YAML file.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] when the file cannot be read and
/// [`ConfigError::ParseError`] when it cannot be parsed.
pub async fn load_file(file: &StdPath) -> Result<Value> {
    let source = tokio::fs::read_to_string(file).await.map_err(|e| {
        LakewardError::Config(ConfigError::FileNotFound {
            path: file.to_path_buf(),
            reason: e.to_string(),
        })
    })?;
    load_str(&source, file)
}

/// An open container on the builder stack.
enum Node {
    Sequence {
        items: Vec<Value>,
        location: Location,
        aid: usize,
    },
    Mapping {
        entries: IndexMap<String, Value>,
        location: Location,
        aid: usize,
        pending_key: Option<String>,
    },
}

/// Event receiver assembling the value tree.
struct TreeBuilder<'a> {
    file: &'a StdPath,
    stack: Vec<Node>,
    root: Option<Value>,
    anchors: HashMap<usize, Value>,
    in_document: bool,
}

impl<'a> TreeBuilder<'a> {
    fn new(file: &'a StdPath) -> Self {
        Self {
            file,
            stack: Vec::new(),
            root: None,
            anchors: HashMap::new(),
            in_document: false,
        }
    }

    fn location(&self, marker: Marker) -> Location {
        Location::new(self.file, marker.line(), marker.col() + 1)
    }

    fn push_value(&mut self, value: Value) {
        match self.stack.last_mut() {
            None => {
                // First document wins.
                if self.root.is_none() && self.in_document {
                    self.root = Some(value);
                }
            }
            Some(Node::Sequence { items, .. }) => items.push(value),
            Some(Node::Mapping {
                entries,
                pending_key,
                ..
            }) => match pending_key.take() {
                None => *pending_key = Some(value.scalar_string().unwrap_or_default()),
                Some(key) => {
                    entries.insert(key, value);
                }
            },
        }
    }

    fn register_anchor(&mut self, aid: usize, value: Value) -> Value {
        if aid == 0 {
            return value;
        }
        let value = value.with_anchor(true);
        self.anchors.insert(aid, value.clone());
        value
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        match ev {
            Event::DocumentStart => {
                if self.root.is_none() {
                    self.in_document = true;
                }
            }
            Event::DocumentEnd => self.in_document = false,
            Event::Scalar(text, style, aid, tag) => {
                let data = scalar_data(&text, style, tag.as_ref());
                let value = Value::new(data).with_location(self.location(mark));
                let value = self.register_anchor(aid, value);
                self.push_value(value);
            }
            Event::SequenceStart(aid, _) => self.stack.push(Node::Sequence {
                items: Vec::new(),
                location: self.location(mark),
                aid,
            }),
            Event::SequenceEnd => {
                if let Some(Node::Sequence {
                    items,
                    location,
                    aid,
                }) = self.stack.pop()
                {
                    let value = Value::from(items).with_location(location);
                    let value = self.register_anchor(aid, value);
                    self.push_value(value);
                }
            }
            Event::MappingStart(aid, _) => self.stack.push(Node::Mapping {
                entries: IndexMap::new(),
                location: self.location(mark),
                aid,
                pending_key: None,
            }),
            Event::MappingEnd => {
                if let Some(Node::Mapping {
                    entries,
                    location,
                    aid,
                    ..
                }) = self.stack.pop()
                {
                    let value = Value::from(entries).with_location(location);
                    let value = self.register_anchor(aid, value);
                    self.push_value(value);
                }
            }
            Event::Alias(aid) => {
                // An alias before its anchor completes is invalid YAML; the
                // parser rejects it before we get here.
                let value = self
                    .anchors
                    .get(&aid)
                    .cloned()
                    .unwrap_or_else(Value::invalid);
                self.push_value(value);
            }
            Event::Nothing | Event::StreamStart | Event::StreamEnd => {}
        }
    }
}

/// Resolves a scalar according to the core schema. Quoted scalars are always
/// strings; plain scalars resolve to null, bool, int, float, or timestamp
/// before falling back to string. An explicit tag overrides resolution.
fn scalar_data(text: &str, style: TScalarStyle, tag: Option<&Tag>) -> ValueData {
    if let Some(tag) = tag {
        if tag.handle == "tag:yaml.org,2002:" {
            return tagged_data(text, &tag.suffix);
        }
    }
    if style != TScalarStyle::Plain {
        return ValueData::Str(text.to_string());
    }
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return ValueData::Nil,
        "true" | "True" | "TRUE" => return ValueData::Bool(true),
        "false" | "False" | "FALSE" => return ValueData::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return ValueData::Int(i);
    }
    if looks_numeric(text) {
        if let Ok(f) = text.parse::<f64>() {
            return ValueData::Float(f);
        }
    }
    if let Some(t) = parse_timestamp(text) {
        return ValueData::Time(t);
    }
    ValueData::Str(text.to_string())
}

fn tagged_data(text: &str, suffix: &str) -> ValueData {
    match suffix {
        "null" => ValueData::Nil,
        "bool" => ValueData::Bool(matches!(text, "true" | "True" | "TRUE")),
        "int" => text
            .parse::<i64>()
            .map_or_else(|_| ValueData::Str(text.to_string()), ValueData::Int),
        "float" => text
            .parse::<f64>()
            .map_or_else(|_| ValueData::Str(text.to_string()), ValueData::Float),
        _ => ValueData::Str(text.to_string()),
    }
}

/// Guards float parsing so words like `nan`-free plain strings (`inf`,
/// version-ish text) stay strings.
fn looks_numeric(text: &str) -> bool {
    let rest = text.strip_prefix(['+', '-']).unwrap_or(text);
    rest.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && rest.chars().all(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+' || c == '-')
        && rest.contains(|c: char| c.is_ascii_digit())
}

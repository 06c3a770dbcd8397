//! Location-annotated dynamic values.
//!
//! Every value loaded from a bundle file carries the source position it came
//! from, and keeps collecting positions as files are merged. Maps are
//! insertion-ordered so that generated YAML and IaC configuration come out
//! deterministic.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// A source position: file, line, and column.
///
/// Lines and columns are 1-based. A zero line marks a synthetic location
/// (values created by mutators rather than read from a file).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Source file path.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Returns true if this location does not point at a real file position.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.line == 0 || self.file.as_os_str().is_empty()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// The kind of a dynamic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Lookup miss; propagates through walks as "skip without error".
    Invalid,
    /// Explicit null.
    Nil,
    /// Boolean scalar.
    Bool,
    /// Integer scalar.
    Int,
    /// Float scalar.
    Float,
    /// String scalar.
    Str,
    /// Timestamp scalar.
    Time,
    /// Ordered sequence.
    Sequence,
    /// Insertion-ordered map.
    Map,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "invalid",
            Self::Nil => "nil",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Time => "time",
            Self::Sequence => "sequence",
            Self::Map => "map",
        };
        write!(f, "{name}")
    }
}

/// The payload of a dynamic value.
#[derive(Debug, Clone)]
pub enum ValueData {
    /// Lookup miss.
    Invalid,
    /// Explicit null.
    Nil,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// Timestamp scalar.
    Time(DateTime<Utc>),
    /// Ordered sequence of values.
    Sequence(Vec<Value>),
    /// Insertion-ordered map of values.
    Map(IndexMap<String, Value>),
}

/// A dynamic value with source provenance.
///
/// A value is either a leaf scalar or a container whose immediate children
/// are also values. The primary location is where the value was defined; the
/// secondary locations accumulate the positions of values it was merged with.
#[derive(Debug, Clone)]
pub struct Value {
    data: ValueData,
    location: Location,
    extra_locations: Vec<Location>,
    anchor: bool,
}

impl Value {
    /// Creates a value from raw data with a synthetic location.
    #[must_use]
    pub fn new(data: ValueData) -> Self {
        Self {
            data,
            location: Location::default(),
            extra_locations: Vec::new(),
            anchor: false,
        }
    }

    /// The invalid sentinel.
    #[must_use]
    pub fn invalid() -> Self {
        Self::new(ValueData::Invalid)
    }

    /// An explicit null.
    #[must_use]
    pub fn nil() -> Self {
        Self::new(ValueData::Nil)
    }

    /// An empty insertion-ordered map.
    #[must_use]
    pub fn empty_map() -> Self {
        Self::new(ValueData::Map(IndexMap::new()))
    }

    /// Attaches a primary location, returning the value.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Marks the value as a YAML anchor.
    #[must_use]
    pub const fn with_anchor(mut self, anchor: bool) -> Self {
        self.anchor = anchor;
        self
    }

    /// Decomposes the value into payload and provenance. Used by the walker
    /// to rebuild the spine without cloning.
    #[must_use]
    pub fn into_parts(self) -> (ValueData, Location, Vec<Location>, bool) {
        (self.data, self.location, self.extra_locations, self.anchor)
    }

    /// Rebuilds a value from parts produced by [`Value::into_parts`].
    #[must_use]
    pub const fn assemble(
        data: ValueData,
        location: Location,
        extra_locations: Vec<Location>,
        anchor: bool,
    ) -> Self {
        Self {
            data,
            location,
            extra_locations,
            anchor,
        }
    }

    /// The kind of this value.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match &self.data {
            ValueData::Invalid => Kind::Invalid,
            ValueData::Nil => Kind::Nil,
            ValueData::Bool(_) => Kind::Bool,
            ValueData::Int(_) => Kind::Int,
            ValueData::Float(_) => Kind::Float,
            ValueData::Str(_) => Kind::Str,
            ValueData::Time(_) => Kind::Time,
            ValueData::Sequence(_) => Kind::Sequence,
            ValueData::Map(_) => Kind::Map,
        }
    }

    /// Borrows the payload.
    #[must_use]
    pub const fn data(&self) -> &ValueData {
        &self.data
    }

    /// Mutably borrows the payload.
    pub fn data_mut(&mut self) -> &mut ValueData {
        &mut self.data
    }

    /// Consumes the value, returning the payload.
    #[must_use]
    pub fn into_data(self) -> ValueData {
        self.data
    }

    /// The primary source location.
    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Secondary locations recorded by merges.
    #[must_use]
    pub fn extra_locations(&self) -> &[Location] {
        &self.extra_locations
    }

    /// All locations: primary first, then secondaries in recording order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        std::iter::once(&self.location).chain(self.extra_locations.iter())
    }

    /// Records an additional location (merge provenance).
    pub fn record_location(&mut self, location: Location) {
        if location != self.location && !self.extra_locations.contains(&location) {
            self.extra_locations.push(location);
        }
    }

    /// Records all locations carried by another value.
    pub fn record_locations_of(&mut self, other: &Self) {
        for loc in other.locations() {
            self.record_location(loc.clone());
        }
    }

    /// Whether this value was a YAML anchor in its source document.
    #[must_use]
    pub const fn is_anchor(&self) -> bool {
        self.anchor
    }

    /// Whether the value is usable (not the invalid sentinel).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !matches!(self.data, ValueData::Invalid)
    }

    /// Whether the value is an explicit null.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self.data, ValueData::Nil)
    }

    /// The boolean payload, if this is a bool.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self.data {
            ValueData::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The integer payload, if this is an int.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self.data {
            ValueData::Int(i) => Some(i),
            _ => None,
        }
    }

    /// The float payload, if this is a float.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self.data {
            ValueData::Float(f) => Some(f),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ValueData::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The timestamp payload, if this is a time.
    #[must_use]
    pub const fn as_time(&self) -> Option<DateTime<Utc>> {
        match self.data {
            ValueData::Time(t) => Some(t),
            _ => None,
        }
    }

    /// The sequence payload, if this is a sequence.
    #[must_use]
    pub const fn as_sequence(&self) -> Option<&Vec<Self>> {
        match &self.data {
            ValueData::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// The map payload, if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&IndexMap<String, Self>> {
        match &self.data {
            ValueData::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The mutable map payload, if this is a map.
    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, Self>> {
        match &mut self.data {
            ValueData::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The mutable sequence payload, if this is a sequence.
    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Self>> {
        match &mut self.data {
            ValueData::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Renders scalar values to their string form; containers and nil
    /// return `None`.
    #[must_use]
    pub fn scalar_string(&self) -> Option<String> {
        match &self.data {
            ValueData::Bool(b) => Some(b.to_string()),
            ValueData::Int(i) => Some(i.to_string()),
            ValueData::Float(f) => Some(f.to_string()),
            ValueData::Str(s) => Some(s.clone()),
            ValueData::Time(t) => Some(t.to_rfc3339()),
            _ => None,
        }
    }

    /// Whether this value is the zero value for its kind.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match &self.data {
            ValueData::Invalid | ValueData::Nil => true,
            ValueData::Bool(b) => !b,
            ValueData::Int(i) => *i == 0,
            ValueData::Float(f) => *f == 0.0,
            ValueData::Str(s) => s.is_empty(),
            ValueData::Time(_) => false,
            ValueData::Sequence(s) => s.is_empty(),
            ValueData::Map(m) => m.is_empty(),
        }
    }
}

// Equality compares payloads only; provenance never participates.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (ValueData::Invalid, ValueData::Invalid) | (ValueData::Nil, ValueData::Nil) => true,
            (ValueData::Bool(a), ValueData::Bool(b)) => a == b,
            (ValueData::Int(a), ValueData::Int(b)) => a == b,
            (ValueData::Float(a), ValueData::Float(b)) => a == b,
            (ValueData::Str(a), ValueData::Str(b)) => a == b,
            (ValueData::Time(a), ValueData::Time(b)) => a == b,
            (ValueData::Sequence(a), ValueData::Sequence(b)) => a == b,
            (ValueData::Map(a), ValueData::Map(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::new(ValueData::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::new(ValueData::Int(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::new(ValueData::Float(f))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::new(ValueData::Str(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::new(ValueData::Str(s))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::new(ValueData::Time(t))
    }
}

impl From<Vec<Value>> for Value {
    fn from(seq: Vec<Self>) -> Self {
        Self::new(ValueData::Sequence(seq))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Self>) -> Self {
        Self::new(ValueData::Map(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_scalars() {
        assert_eq!(Value::from(true).kind(), Kind::Bool);
        assert_eq!(Value::from(3_i64).kind(), Kind::Int);
        assert_eq!(Value::from(1.5).kind(), Kind::Float);
        assert_eq!(Value::from("x").kind(), Kind::Str);
        assert_eq!(Value::nil().kind(), Kind::Nil);
        assert_eq!(Value::invalid().kind(), Kind::Invalid);
    }

    #[test]
    fn test_equality_ignores_locations() {
        let a = Value::from("x").with_location(Location::new("a.yml", 1, 1));
        let b = Value::from("x").with_location(Location::new("b.yml", 9, 9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_record_location_dedupes() {
        let mut v = Value::from(1_i64).with_location(Location::new("a.yml", 1, 1));
        v.record_location(Location::new("b.yml", 2, 2));
        v.record_location(Location::new("b.yml", 2, 2));
        v.record_location(Location::new("a.yml", 1, 1));
        assert_eq!(v.extra_locations().len(), 1);
        assert_eq!(v.locations().count(), 2);
    }

    #[test]
    fn test_zero_values() {
        assert!(Value::from(false).is_zero());
        assert!(Value::from(0_i64).is_zero());
        assert!(Value::from("").is_zero());
        assert!(Value::empty_map().is_zero());
        assert!(!Value::from(true).is_zero());
        assert!(!Value::from("x").is_zero());
    }

    #[test]
    fn test_location_display() {
        let loc = Location::new("bundle.yml", 12, 3);
        assert_eq!(loc.to_string(), "bundle.yml:12:3");
        assert!(!loc.is_synthetic());
        assert!(Location::default().is_synthetic());
    }
}

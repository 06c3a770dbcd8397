//! Location-annotated dynamic configuration tree.
//!
//! This is the data model everything else operates on: a tagged-union tree
//! loaded from YAML that never loses track of where each value came from.
//! The submodules provide traversal primitives, deep merge with keyed
//! sequences, `${...}` reference interpolation, and typed projection onto
//! the config schema.

mod convert;
mod interp;
mod merge;
mod path;
mod value;
mod walk;

pub use convert::{from_typed, parse_timestamp, to_typed};
pub use interp::{contains_reference, interpolate};
pub use merge::{merge, merge_keyed_elements};
pub use path::{Component, Path, Pattern, PatternComponent};
pub use value::{Kind, Location, Value, ValueData};
pub use walk::WalkControl;

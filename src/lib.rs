// ============================================================================
// Linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![warn(missing_docs)]                // All public items should be documented
#![warn(unused_must_use)]             // Handle Result and Option explicitly

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::redundant_clone)]     // Useless clones warning

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Lakeward Deploy Bundles
//!
//! A declarative deployment engine for workspace bundles.
//!
//! ## Overview
//!
//! Lakeward turns a tree of YAML configuration files into deployed
//! resources:
//!
//! - Configuration is loaded into a location-tracking dynamic tree, merged
//!   across files and targets, and interpolated
//! - A pipeline of mutators normalizes, validates and transforms the tree
//! - Artifacts are built and uploaded, source files synced, and resource
//!   creation handed to an external IaC engine
//!
//! ## Architecture
//!
//! Everything flows through one [`bundle::Bundle`] per invocation. Phases
//! ([`phases`]) are ordered mutator sequences over the bundle; remote and
//! engine access go through the [`workspace::WorkspaceClient`] and
//! [`iac::IacEngine`] capabilities.
//!
//! ## Modules
//!
//! - [`dynvalue`]: the dynamic configuration tree (locations, merge,
//!   interpolation)
//! - [`config`]: loading, typed projection and schema
//! - [`mutator`] / [`transform`] / [`phases`]: the transformation pipeline
//! - [`artifact`]: build and upload of declared artifacts
//! - [`sync`]: incremental file synchronization
//! - [`deploystate`] / [`iac`]: deployment records and engine handoff
//! - [`workspace`]: the remote workspace capability
//! - [`cli`]: command-line interface

// ============================================================================
// Modules
// ============================================================================

pub mod artifact;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod deploystate;
pub mod dynvalue;
pub mod error;
pub mod iac;
pub mod mutator;
pub mod phases;
pub mod sync;
pub mod transform;
pub mod workspace;

// ============================================================================
// Re-exports
// ============================================================================

pub use bundle::Bundle;
pub use config::BundleConfig;
pub use error::{LakewardError, Result};
pub use mutator::{Diagnostic, Diagnostics, Mutator, Severity};

//! ngmake: a declarative build tool driven by a term-rewriting macro language.
//!
//! Pipeline: [`syntax`] parses source files, [`loader`] assembles them into a
//! [`loader::Program`], [`build::BuildGraph`] expands every rule and
//! [`build::Scheduler`] runs the requested targets.

pub use crate::errors::{NgmakeError, NgmakeResult, SourceContext};
pub use crate::loader::{Loader, Program};
pub use crate::value::Value;

pub mod ast;
pub mod build;
pub mod cli;
pub mod config;
pub mod errors;
pub mod loader;
pub mod macros;
pub mod makefile;
pub mod runtime;
pub mod syntax;
pub mod value;

//! Syntax module for ngmake source files.
//!
//! The grammar lives in `syntax/grammar.pest`; [`parser`] turns its parse tree into the
//! declaration types of [`crate::ast`].

pub mod parser;

pub use parser::{parse, parse_str};

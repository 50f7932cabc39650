//! Runtime module for ngmake.
//!
//! Houses the term-rewriting evaluator and the binding environments it threads through
//! macro invocations. Evaluation is pure and synchronous: it reads the macro table and
//! the global constants and never mutates either.

pub mod context;
pub mod eval;

pub use context::{Bindings, DEFAULT_MAX_DEPTH};
pub use eval::{bind_parameters, Evaluator};

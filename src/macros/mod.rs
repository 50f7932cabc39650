//! # ngmake macro system
//!
//! Macros are named, ordered overload sets of clauses. A call is dispatched on its
//! *flattened* argument count to the first clause whose parameter pattern accepts it;
//! the evaluator in [`crate::runtime`] then binds the parameters in a fresh environment
//! and reduces the clause body.
//!
//! ## Variadic forwarding
//!
//! A clause may end with a variadic parameter (`...rest`) which captures the remaining
//! arguments as a sequence. Writing `...rest` in argument position splices that sequence
//! back into the argument list, so macros can forward their tail to a recursive call:
//!
//! ```text
//! macro reverse ( only ) -> gather( only )
//!     ; reverse ( first, ...rest ) -> gather( ...reverse( ...rest ), first ) .
//! ```

pub mod builtins;
pub mod registry;
pub mod types;

pub use builtins::register_builtins;
pub use registry::MacroTable;
pub use types::{Clause, ClauseBody, MacroDef, MacroProvenance, NativeFn};

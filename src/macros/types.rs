//! Core types of the macro system: clauses, clause bodies and macro definitions.

use crate::ast::{Body, ParamPattern};
use crate::errors::NgmakeResult;
use crate::value::Value;

/// A builtin clause implemented in Rust. Receives the fully evaluated, flat argument list.
pub type NativeFn = fn(name: &str, args: &[Value]) -> NgmakeResult<Value>;

/// What a clause does once selected.
#[derive(Debug, Clone)]
pub enum ClauseBody {
    /// Expression body evaluated in a fresh binding environment.
    Template(Body),
    /// Builtin implemented natively.
    Native(NativeFn),
}

/// One pattern + body alternative of a macro.
#[derive(Debug, Clone)]
pub struct Clause {
    pub pattern: ParamPattern,
    pub body: ClauseBody,
}

impl Clause {
    pub fn template(pattern: ParamPattern, body: Body) -> Self {
        Self {
            pattern,
            body: ClauseBody::Template(body),
        }
    }

    pub fn native(pattern: ParamPattern, func: NativeFn) -> Self {
        Self {
            pattern,
            body: ClauseBody::Native(func),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, ClauseBody::Native(_))
    }
}

/// Where a macro definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroProvenance {
    Builtin,
    Module,
    User,
}

/// An ordered, non-empty overload set sharing one name.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub clauses: Vec<Clause>,
    pub provenance: MacroProvenance,
}

impl MacroDef {
    /// Short signature listing every clause, e.g. `reverse(only) ; reverse(first, ...rest)`.
    pub fn signature(&self) -> String {
        self.clauses
            .iter()
            .map(|clause| format!("{}{}", self.name, clause.pattern))
            .collect::<Vec<_>>()
            .join(" ; ")
    }
}

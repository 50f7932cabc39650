//! Runtime values produced by macro expansion.
//!
//! There are exactly two shapes: an [`Value::Atom`] (a string token) and a
//! [`Value::Seq`] (an ordered list of values). Everything the evaluator produces,
//! every macro argument and every target name or command token is one of these.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical truthy atom returned by predicates.
pub const TRUE: &str = "true";
/// Canonical falsy atom. The empty string is the only false atom.
pub const FALSE: &str = "";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Atom(String),
    Seq(Vec<Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Seq(Vec::new())
    }
}

impl Value {
    pub fn atom(text: impl Into<String>) -> Self {
        Value::Atom(text.into())
    }

    pub fn seq(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Seq(items.into_iter().collect())
    }

    /// Builds a sequence of atoms from plain strings.
    pub fn atoms<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Seq(items.into_iter().map(|s| Value::Atom(s.into())).collect())
    }

    pub fn empty() -> Self {
        Value::Seq(Vec::new())
    }

    pub fn boolean(flag: bool) -> Self {
        Value::atom(if flag { TRUE } else { FALSE })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Atom(_) => "atom",
            Value::Seq(_) => "sequence",
        }
    }

    /// The empty atom and the empty sequence are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Atom(text) => !text.is_empty(),
            Value::Seq(items) => !items.is_empty(),
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Value::Atom(text) => Some(text),
            Value::Seq(_) => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            Value::Atom(_) => None,
        }
    }

    /// Elements to splice into a surrounding list. Removes exactly one level of nesting;
    /// an atom splices as itself.
    pub fn splice(self) -> Vec<Value> {
        match self {
            Value::Seq(items) => items,
            atom @ Value::Atom(_) => vec![atom],
        }
    }

    /// All atoms in depth-first order.
    pub fn flatten_atoms(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut pending = vec![self];
        while let Some(value) = pending.pop() {
            match value {
                Value::Atom(text) => out.push(text.clone()),
                Value::Seq(items) => pending.extend(items.iter().rev()),
            }
        }
        out
    }

    /// Interprets the value as a list of commands.
    ///
    /// A sequence with at least one atom at its top level is one command (its tokens are
    /// the deep flattening of its elements); a sequence made only of sequences is a list
    /// of commands; the empty sequence is no command at all.
    pub fn into_commands(self) -> Vec<Vec<String>> {
        let mut commands = Vec::new();
        let mut pending = vec![self];
        while let Some(value) = pending.pop() {
            match value {
                Value::Atom(text) => commands.push(vec![text]),
                Value::Seq(items) if items.is_empty() => {}
                Value::Seq(items) if items.iter().any(|item| item.as_atom().is_some()) => {
                    commands.push(Value::Seq(items).flatten_atoms());
                }
                Value::Seq(items) => pending.extend(items.into_iter().rev()),
            }
        }
        commands
    }

    fn fmt_seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
        write!(f, "[")?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match item {
                Value::Atom(text) => write!(f, "'{}'", text)?,
                seq => write!(f, "{}", seq)?,
            }
        }
        write!(f, "]")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Atom(text) => write!(f, "{}", text),
            Value::Seq(items) => Value::fmt_seq(f, items),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::atom(text)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Atom(text)
    }
}

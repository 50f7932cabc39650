//! Macro table and clause dispatcher.
//!
//! # Features
//! - `define` stores an ordered overload set under a name, replacing any previous entry
//!   wholesale. Clauses from separate declarations are never merged.
//! - `resolve` picks the first clause, in declaration order, whose parameter pattern
//!   accepts the argument count. Base-case/recursive-case pairs rely on this order.
//!
//! # Thread Safety
//! The table is only mutated while a program is loading. During a build it is shared
//! by reference between worker threads and never written.

use std::collections::HashMap;

use tracing::debug;

use crate::errors::{NgmakeError, NgmakeResult};
use crate::macros::types::{Clause, MacroDef, MacroProvenance};

#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `clauses` under `name`.
    ///
    /// # Returns
    /// The definition that was replaced, if any.
    ///
    /// # Errors
    /// An empty clause list is rejected.
    pub fn define(
        &mut self,
        name: &str,
        clauses: Vec<Clause>,
        provenance: MacroProvenance,
    ) -> NgmakeResult<Option<MacroDef>> {
        if clauses.is_empty() {
            return Err(NgmakeError::invalid_declaration(format!(
                "macro '{name}' must have at least one clause"
            )));
        }
        let def = MacroDef {
            name: name.to_string(),
            clauses,
            provenance,
        };
        let previous = self.macros.insert(name.to_string(), def);
        if let Some(old) = &previous {
            debug!(macro_name = name, previous = ?old.provenance, "macro redefined");
        }
        Ok(previous)
    }

    /// Returns the first clause of `name` that accepts `arg_count` arguments.
    pub fn resolve(&self, name: &str, arg_count: usize) -> NgmakeResult<&Clause> {
        let def = self
            .macros
            .get(name)
            .ok_or_else(|| NgmakeError::UnknownMacro {
                name: name.to_string(),
                arg_count,
            })?;
        def.clauses
            .iter()
            .find(|clause| clause.pattern.matches(arg_count))
            .ok_or_else(|| NgmakeError::NoMatchingClause {
                name: name.to_string(),
                arg_count,
            })
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Definitions sorted by name.
    pub fn definitions(&self) -> Vec<&MacroDef> {
        let mut defs: Vec<&MacroDef> = self.macros.values().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Body, Expr, ParamPattern, Phrase};
    use crate::macros::types::ClauseBody;

    fn clause(pattern: ParamPattern, marker: &str) -> Clause {
        Clause::template(pattern, Body(vec![Phrase::single(Expr::literal(marker))]))
    }

    fn marker(clause: &Clause) -> String {
        match &clause.body {
            ClauseBody::Template(body) => body.pretty(),
            ClauseBody::Native(_) => "native".to_string(),
        }
    }

    #[test]
    fn earliest_matching_clause_wins() {
        let mut table = MacroTable::new();
        table
            .define(
                "pick",
                vec![
                    clause(ParamPattern::fixed(["a"]), "one"),
                    clause(ParamPattern::fixed(["a"]).with_variadic("rest"), "many"),
                    clause(ParamPattern::fixed(["a", "b"]), "two"),
                ],
                MacroProvenance::User,
            )
            .unwrap();

        assert_eq!(marker(table.resolve("pick", 1).unwrap()), "'one'");
        assert_eq!(marker(table.resolve("pick", 2).unwrap()), "'many'");
        assert_eq!(marker(table.resolve("pick", 5).unwrap()), "'many'");
    }

    #[test]
    fn missing_arity_is_reported_with_count() {
        let mut table = MacroTable::new();
        table
            .define(
                "head",
                vec![clause(ParamPattern::fixed(["first"]).with_variadic("rest"), "h")],
                MacroProvenance::User,
            )
            .unwrap();
        match table.resolve("head", 0) {
            Err(NgmakeError::NoMatchingClause { name, arg_count }) => {
                assert_eq!(name, "head");
                assert_eq!(arg_count, 0);
            }
            other => panic!("expected NoMatchingClause, got {other:?}"),
        }
        assert!(matches!(
            table.resolve("nope", 2),
            Err(NgmakeError::UnknownMacro { arg_count: 2, .. })
        ));
    }

    #[test]
    fn redefinition_replaces_whole_overload_set() {
        let mut table = MacroTable::new();
        table
            .define(
                "f",
                vec![
                    clause(ParamPattern::fixed(["a"]), "old-one"),
                    clause(ParamPattern::fixed(["a", "b"]), "old-two"),
                ],
                MacroProvenance::User,
            )
            .unwrap();
        let previous = table
            .define(
                "f",
                vec![clause(ParamPattern::fixed(["a"]), "new-one")],
                MacroProvenance::User,
            )
            .unwrap();

        assert!(previous.is_some());
        assert_eq!(marker(table.resolve("f", 1).unwrap()), "'new-one'");
        assert!(matches!(
            table.resolve("f", 2),
            Err(NgmakeError::NoMatchingClause { .. })
        ));
    }

    #[test]
    fn empty_clause_list_is_rejected() {
        let mut table = MacroTable::new();
        assert!(table.define("f", vec![], MacroProvenance::User).is_err());
    }
}

//! Build rule registry.
//!
//! Rules are stored unevaluated. Their name and dependency expressions are only reduced
//! when a dependency graph is built, so a rule always sees the final macro table.

use tracing::debug;

use crate::ast::{ActionSpec, Expr, Phrase, Span};

/// Reserved target whose dependencies are phony targets.
pub const PHONY_TARGET: &str = ".PHONY";

/// One `do (...)` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: Phrase,
    pub deps: Option<Phrase>,
    pub action: ActionSpec,
    /// File the rule was declared in.
    pub origin: String,
    pub span: Span,
}

impl Rule {
    pub fn new(name: Phrase, deps: Option<Phrase>, action: ActionSpec) -> Self {
        Self {
            name,
            deps,
            action,
            origin: String::new(),
            span: Span::default(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>, span: Span) -> Self {
        self.origin = origin.into();
        self.span = span;
        self
    }

    /// Whether the name is literally the reserved phony target.
    pub fn is_phony_list(&self) -> bool {
        matches!(self.name.terms(), [Expr::Literal(name)] if name == PHONY_TARGET)
    }

    /// Source form of the name expression, for diagnostics.
    pub fn describe(&self) -> String {
        self.name.pretty()
    }
}

/// Rules in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `rule`. A rule whose name expression is structurally equal to an existing
    /// one replaces it in place and the old rule is returned. Phony lists accumulate.
    pub fn register(&mut self, rule: Rule) -> Option<Rule> {
        if !rule.is_phony_list() {
            if let Some(slot) = self.rules.iter_mut().find(|r| r.name == rule.name) {
                debug!(target_name = %rule.describe(), "replacing rule");
                return Some(std::mem::replace(slot, rule));
            }
        }
        self.rules.push(rule);
        None
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, body: &str) -> Rule {
        Rule::new(
            Phrase::single(Expr::literal(name)),
            None,
            ActionSpec::Delegate(body.to_string()),
        )
    }

    #[test]
    fn identical_name_expression_replaces() {
        let mut registry = RuleRegistry::new();
        assert!(registry.register(named("a", "first")).is_none());
        assert!(registry.register(named("b", "other")).is_none());
        let replaced = registry.register(named("a", "second")).unwrap();

        assert_eq!(replaced.action, ActionSpec::Delegate("first".into()));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.rules()[0].action, ActionSpec::Delegate("second".into()));
    }

    #[test]
    fn phony_lists_accumulate() {
        let mut registry = RuleRegistry::new();
        registry.register(named(PHONY_TARGET, "x"));
        registry.register(named(PHONY_TARGET, "y"));
        assert_eq!(registry.len(), 2);
        assert!(registry.rules().iter().all(Rule::is_phony_list));
    }

    #[test]
    fn different_expressions_do_not_collide() {
        let mut registry = RuleRegistry::new();
        registry.register(named("a", "x"));
        registry.register(Rule::new(
            Phrase::single(Expr::ident("a")),
            None,
            ActionSpec::None,
        ));
        assert_eq!(registry.len(), 2);
    }
}

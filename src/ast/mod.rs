//! Expression trees and top-level declarations.
//!
//! The parser produces these types and everything downstream (macro table, evaluator,
//! rule registry) consumes them. Expressions are deliberately span-free so that rules
//! and macro bodies compare structurally; declarations keep their span for diagnostics.

use serde::{Deserialize, Serialize};

// ============================================================================
// SPANS
// ============================================================================

/// Byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

/// A single term of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Quoted string literal.
    Literal(String),
    /// Reference to a macro parameter or a global `let` constant.
    Ident(String),
    /// `name(arg, ..., ...rest)`.
    Call { name: String, args: Vec<Phrase> },
    /// `if cond -> then else otherwise`; only one branch is ever evaluated.
    If {
        condition: Box<Phrase>,
        then_branch: Box<Phrase>,
        else_branch: Box<Phrase>,
    },
    /// `[]`, the empty sequence.
    Empty,
    /// `[a, b, ...c]` or `(a, b,)`.
    List(Vec<Phrase>),
    /// `...expr`: splice the value of `expr` into the surrounding list.
    Spread(Box<Expr>),
}

impl Expr {
    pub fn literal(text: impl Into<String>) -> Self {
        Expr::Literal(text.into())
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Phrase>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn spread(inner: Expr) -> Self {
        Expr::Spread(Box::new(inner))
    }

    pub fn is_spread(&self) -> bool {
        matches!(self, Expr::Spread(_))
    }

    /// Renders the expression back into surface syntax.
    pub fn pretty(&self) -> String {
        match self {
            Expr::Literal(text) => format!("'{}'", text.replace('\'', "\\'")),
            Expr::Ident(name) => name.clone(),
            Expr::Call { name, args } => format!("{}({})", name, pretty_list(args)),
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => format!(
                "if {} -> {} else {}",
                condition.pretty(),
                then_branch.pretty(),
                else_branch.pretty()
            ),
            Expr::Empty => "[]".to_string(),
            Expr::List(items) => format!("[{}]", pretty_list(items)),
            Expr::Spread(inner) => format!("...{}", inner.pretty()),
        }
    }
}

/// Terms written side by side, e.g. `cxx '-o' target ...deps`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Phrase(pub Vec<Expr>);

impl Phrase {
    pub fn new(terms: Vec<Expr>) -> Self {
        Phrase(terms)
    }

    pub fn single(term: Expr) -> Self {
        Phrase(vec![term])
    }

    pub fn terms(&self) -> &[Expr] {
        &self.0
    }

    /// Returns the inner expression when the phrase is exactly one spread term.
    pub fn as_lone_spread(&self) -> Option<&Expr> {
        match self.0.as_slice() {
            [Expr::Spread(inner)] => Some(inner),
            _ => None,
        }
    }

    pub fn pretty(&self) -> String {
        self.0
            .iter()
            .map(Expr::pretty)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Comma-separated phrases forming a macro or action body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Body(pub Vec<Phrase>);

impl Body {
    pub fn phrases(&self) -> &[Phrase] {
        &self.0
    }

    pub fn pretty(&self) -> String {
        pretty_list(&self.0)
    }
}

fn pretty_list(items: &[Phrase]) -> String {
    items
        .iter()
        .map(Phrase::pretty)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// PARAMETER PATTERNS
// ============================================================================

/// Fixed parameter names optionally followed by one variadic parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ParamPattern {
    pub fixed: Vec<String>,
    pub variadic: Option<String>,
}

impl ParamPattern {
    pub fn fixed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fixed: names.into_iter().map(Into::into).collect(),
            variadic: None,
        }
    }

    pub fn with_variadic(mut self, name: impl Into<String>) -> Self {
        self.variadic = Some(name.into());
        self
    }

    /// Whether a call with `arg_count` arguments is accepted by this pattern.
    pub fn matches(&self, arg_count: usize) -> bool {
        match self.variadic {
            Some(_) => arg_count >= self.fixed.len(),
            None => arg_count == self.fixed.len(),
        }
    }

    /// Human-readable arity, e.g. `2` or `1+`.
    pub fn arity(&self) -> String {
        match self.variadic {
            Some(_) => format!("{}+", self.fixed.len()),
            None => self.fixed.len().to_string(),
        }
    }
}

impl std::fmt::Display for ParamPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = self.fixed.clone();
        if let Some(rest) = &self.variadic {
            parts.push(format!("...{rest}"));
        }
        write!(f, "({})", parts.join(", "))
    }
}

// ============================================================================
// DECLARATIONS
// ============================================================================

/// How a rule produces its commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSpec {
    /// `-> (name, deps) -> body`; one or two parameter names.
    Inline { params: Vec<String>, body: Body },
    /// `-> handler`; the macro is called with `(name, deps)`.
    Delegate(String),
    /// No action at all, e.g. the phony list.
    None,
}

/// One parsed clause of a `macro` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseDecl {
    pub pattern: ParamPattern,
    pub body: Body,
}

/// A top-level statement of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Declaration {
    Import {
        module: String,
        span: Span,
    },
    Let {
        name: String,
        value: Phrase,
        span: Span,
    },
    Macro {
        name: String,
        clauses: Vec<ClauseDecl>,
        span: Span,
    },
    Rule {
        name: Phrase,
        deps: Option<Phrase>,
        action: ActionSpec,
        span: Span,
    },
}

impl Declaration {
    pub fn span(&self) -> Span {
        match self {
            Declaration::Import { span, .. }
            | Declaration::Let { span, .. }
            | Declaration::Macro { span, .. }
            | Declaration::Rule { span, .. } => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_without_variadic_requires_exact_count() {
        let pattern = ParamPattern::fixed(["target", "source"]);
        assert!(pattern.matches(2));
        assert!(!pattern.matches(1));
        assert!(!pattern.matches(3));
        assert_eq!(pattern.arity(), "2");
    }

    #[test]
    fn variadic_pattern_accepts_surplus_arguments() {
        let pattern = ParamPattern::fixed(["first"]).with_variadic("rest");
        assert!(!pattern.matches(0));
        assert!(pattern.matches(1));
        assert!(pattern.matches(7));
        assert_eq!(pattern.to_string(), "(first, ...rest)");
    }

    #[test]
    fn pretty_prints_nested_calls() {
        let expr = Expr::call(
            "gather",
            vec![
                Phrase::single(Expr::spread(Expr::call(
                    "reverse",
                    vec![Phrase::single(Expr::spread(Expr::ident("rest")))],
                ))),
                Phrase::single(Expr::ident("first")),
            ],
        );
        assert_eq!(expr.pretty(), "gather(...reverse(...rest), first)");
    }
}

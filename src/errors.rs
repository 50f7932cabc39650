//! ngmake error handling.
//!
//! Every failure the engine can report is a variant of [`NgmakeError`]. Variants are
//! structured: they carry the offending names (macro, identifier, target, command) and,
//! where applicable, the full call chain or cycle path. Each variant maps to a stable
//! diagnostic code of the form `ngmake::<phase>::<kind>` so callers and tests can classify
//! errors without matching on message text.

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::ast::Span;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Source text attached to syntax errors so `miette` can render the offending line.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: Arc<str>,
}

impl SourceContext {
    /// Create a source context from real file content.
    pub fn from_file(name: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Convert to `NamedSource` for use with miette error reporting.
    pub fn to_named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name.clone(), self.content.to_string())
    }
}

/// Result alias used across the crate.
pub type NgmakeResult<T> = Result<T, NgmakeError>;

// ============================================================================
// ERROR TYPE
// ============================================================================

/// All error kinds produced by loading, expanding, planning and running a build.
#[derive(Debug, Error, Diagnostic)]
pub enum NgmakeError {
    // ------------------------------------------------------------------------
    // Load phase
    // ------------------------------------------------------------------------
    #[error("syntax error: {message}")]
    #[diagnostic(code(ngmake::parse::syntax))]
    Parse {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("invalid declaration: {message}")]
    #[diagnostic(code(ngmake::load::invalid_declaration))]
    InvalidDeclaration { message: String },

    #[error("module '{module}' could not be found")]
    #[diagnostic(
        code(ngmake::load::module_not_found),
        help("standard modules are 'std::list' and 'std::bool'; other modules resolve to '<a>/<b>.ngm' next to the importing file or in a search path")
    )]
    ModuleNotFound { module: String },

    // ------------------------------------------------------------------------
    // Expansion phase
    // ------------------------------------------------------------------------
    #[error("unbound identifier '{name}'")]
    #[diagnostic(
        code(ngmake::expand::unbound_identifier),
        help("identifiers must be macro parameters or names bound with 'let'")
    )]
    UnboundIdentifier { name: String },

    #[error("unknown macro '{name}' (called with {arg_count} argument(s))")]
    #[diagnostic(code(ngmake::expand::unknown_macro))]
    UnknownMacro { name: String, arg_count: usize },

    #[error("no clause of macro '{name}' accepts {arg_count} argument(s)")]
    #[diagnostic(
        code(ngmake::expand::no_matching_clause),
        help("clauses are tried in declaration order; add a clause for this arity or a variadic '...rest' parameter")
    )]
    NoMatchingClause { name: String, arg_count: usize },

    #[error("expansion of macro '{name}' exceeded the depth limit of {limit}")]
    #[diagnostic(
        code(ngmake::expand::too_deep),
        help("a recursive clause probably does not shrink its arguments; guard the recursive call with 'if'")
    )]
    ExpansionTooDeep {
        name: String,
        limit: usize,
        chain: Vec<String>,
    },

    #[error("invalid value: {message}")]
    #[diagnostic(code(ngmake::expand::invalid_value))]
    InvalidValue { message: String },

    #[error("builtin macro '{name}' failed: {message}")]
    #[diagnostic(code(ngmake::expand::builtin))]
    Builtin { name: String, message: String },

    // ------------------------------------------------------------------------
    // Graph phase
    // ------------------------------------------------------------------------
    #[error("target '{target}' is defined by more than one rule")]
    #[diagnostic(
        code(ngmake::graph::duplicate_target),
        help("two different rules expanded to the same target name; redeclare with an identical name expression to replace a rule")
    )]
    DuplicateTarget { target: String },

    #[error("dependency cycle: {}", display_cycle(.cycle))]
    #[diagnostic(code(ngmake::graph::cycle))]
    DependencyCycle { cycle: Vec<String> },

    #[error("no rule to make target '{target}'")]
    #[diagnostic(code(ngmake::graph::unknown_target))]
    UnknownTarget { target: String },

    // ------------------------------------------------------------------------
    // Execution phase
    // ------------------------------------------------------------------------
    #[error("target '{target}' failed: command `{command}` {}", display_code(.code))]
    #[diagnostic(code(ngmake::build::failed))]
    BuildFailed {
        target: String,
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("target '{target}' failed: command `{command}` timed out after {timeout:?}")]
    #[diagnostic(code(ngmake::build::timeout))]
    CommandTimeout {
        target: String,
        command: String,
        timeout: Duration,
    },

    #[error("target '{target}' was not built because dependency '{dependency}' failed")]
    #[diagnostic(code(ngmake::build::blocked))]
    DependencyFailed { target: String, dependency: String },

    #[error("target '{target}' failed: internal error: {message}")]
    #[diagnostic(code(ngmake::build::panicked))]
    TargetPanicked { target: String, message: String },

    // ------------------------------------------------------------------------
    // Environment
    // ------------------------------------------------------------------------
    #[error("configuration error: {message}")]
    #[diagnostic(code(ngmake::config))]
    Config { message: String },

    #[error("I/O error on '{path}': {source}")]
    #[diagnostic(code(ngmake::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl NgmakeError {
    /// Builds a parse error pointing at `span` inside `source`.
    pub fn parse(message: impl Into<String>, source: &SourceContext, span: Span) -> Self {
        NgmakeError::Parse {
            message: message.into(),
            src: source.to_named_source(),
            span: to_source_span(span),
        }
    }

    pub fn invalid_declaration(message: impl Into<String>) -> Self {
        NgmakeError::InvalidDeclaration {
            message: message.into(),
        }
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        NgmakeError::InvalidValue {
            message: message.into(),
        }
    }

    pub fn builtin(name: &str, message: impl Into<String>) -> Self {
        NgmakeError::Builtin {
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        NgmakeError::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Coarse classification used by reports and tests.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse { .. } | Self::InvalidDeclaration { .. } | Self::ModuleNotFound { .. } => {
                ErrorCategory::Load
            }
            Self::UnboundIdentifier { .. }
            | Self::UnknownMacro { .. }
            | Self::NoMatchingClause { .. }
            | Self::ExpansionTooDeep { .. }
            | Self::InvalidValue { .. }
            | Self::Builtin { .. } => ErrorCategory::Expansion,
            Self::DuplicateTarget { .. }
            | Self::DependencyCycle { .. }
            | Self::UnknownTarget { .. } => ErrorCategory::Graph,
            Self::BuildFailed { .. }
            | Self::CommandTimeout { .. }
            | Self::DependencyFailed { .. }
            | Self::TargetPanicked { .. } => ErrorCategory::Execution,
            Self::Config { .. } | Self::Io { .. } => ErrorCategory::Environment,
        }
    }

    /// Short machine-friendly name of the variant.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "syntax",
            Self::InvalidDeclaration { .. } => "invalid_declaration",
            Self::ModuleNotFound { .. } => "module_not_found",
            Self::UnboundIdentifier { .. } => "unbound_identifier",
            Self::UnknownMacro { .. } => "unknown_macro",
            Self::NoMatchingClause { .. } => "no_matching_clause",
            Self::ExpansionTooDeep { .. } => "too_deep",
            Self::InvalidValue { .. } => "invalid_value",
            Self::Builtin { .. } => "builtin",
            Self::DuplicateTarget { .. } => "duplicate_target",
            Self::DependencyCycle { .. } => "cycle",
            Self::UnknownTarget { .. } => "unknown_target",
            Self::BuildFailed { .. } => "failed",
            Self::CommandTimeout { .. } => "timeout",
            Self::DependencyFailed { .. } => "blocked",
            Self::TargetPanicked { .. } => "panicked",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Load,
    Expansion,
    Graph,
    Execution,
    Environment,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Converts an AST span to a miette span.
pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

fn display_cycle(cycle: &[String]) -> String {
    let mut path = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "ended without an exit status".to_string(),
    }
}

/// Prints an error with full miette diagnostics.
pub fn print_error(error: NgmakeError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}

//! ngmake parser.
//!
//! Converts source text into [`Declaration`]s. Purely syntactic: identifiers are not
//! resolved and macro names are not checked here.

use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{ActionSpec, Body, ClauseDecl, Declaration, Expr, ParamPattern, Phrase, Span};
use crate::errors::{NgmakeError, NgmakeResult, SourceContext};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct NgmakeParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses a whole source file.
pub fn parse(source: &SourceContext) -> NgmakeResult<Vec<Declaration>> {
    let text: &str = &source.content;
    if text.trim().is_empty() {
        return Ok(vec![]);
    }

    let mut pairs = NgmakeParser::parse(Rule::program, text)
        .map_err(|e| convert_parse_error(e, source))?;
    let Some(program) = pairs.next() else {
        return Ok(vec![]);
    };

    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(|p| build_declaration(p, source))
        .collect()
}

/// Convenience wrapper for in-memory sources.
pub fn parse_str(name: &str, text: &str) -> NgmakeResult<Vec<Declaration>> {
    parse(&SourceContext::from_file(name, text))
}

// ============================================================================
// DECLARATION BUILDERS
// ============================================================================

fn build_declaration(pair: Pair<Rule>, source: &SourceContext) -> NgmakeResult<Declaration> {
    let span = get_span(&pair);
    let rule = pair.as_rule();
    let mut inner = significant(pair);

    match rule {
        Rule::import_decl => {
            let module = build_string(next_pair(&mut inner, "module name", span, source)?);
            Ok(Declaration::Import { module, span })
        }

        Rule::let_decl => {
            let name = next_pair(&mut inner, "constant name", span, source)?
                .as_str()
                .to_string();
            let value_pair = next_pair(&mut inner, "constant value", span, source)?;
            let value = build_phrase(value_pair, source)?;
            Ok(Declaration::Let { name, value, span })
        }

        Rule::macro_decl => build_macro(inner, span, source),

        Rule::rule_decl => build_rule(inner, span, source),

        other => Err(NgmakeError::parse(
            format!("unexpected {:?} at top level", other),
            source,
            span,
        )),
    }
}

fn build_macro<'i>(
    clauses: impl Iterator<Item = Pair<'i, Rule>>,
    span: Span,
    source: &SourceContext,
) -> NgmakeResult<Declaration> {
    let mut name: Option<String> = None;
    let mut built = Vec::new();

    for clause in clauses {
        let clause_span = get_span(&clause);
        let mut parts = significant(clause);
        let clause_name = next_pair(&mut parts, "macro name", clause_span, source)?.as_str();
        match &name {
            None => name = Some(clause_name.to_string()),
            Some(expected) if expected != clause_name => {
                return Err(NgmakeError::parse(
                    format!(
                        "clause '{clause_name}' does not belong to macro '{expected}'; separate macros with '.'"
                    ),
                    source,
                    clause_span,
                ));
            }
            Some(_) => {}
        }
        let params = next_pair(&mut parts, "parameter list", clause_span, source)?;
        let pattern = build_params(params, source)?;
        let body = build_body(next_pair(&mut parts, "macro body", clause_span, source)?, source)?;
        built.push(ClauseDecl { pattern, body });
    }

    let name = name.ok_or_else(|| NgmakeError::parse("macro without clauses", source, span))?;
    Ok(Declaration::Macro {
        name,
        clauses: built,
        span,
    })
}

fn build_rule<'i>(
    mut parts: impl Iterator<Item = Pair<'i, Rule>>,
    span: Span,
    source: &SourceContext,
) -> NgmakeResult<Declaration> {
    let name = build_phrase(next_pair(&mut parts, "target name", span, source)?, source)?;
    let mut deps = None;
    let mut action = ActionSpec::None;

    for part in parts {
        match part.as_rule() {
            Rule::phrase => deps = Some(build_phrase(part, source)?),
            Rule::delegate => action = ActionSpec::Delegate(part.as_str().trim().to_string()),
            Rule::inline_action => action = build_inline_action(part, source)?,
            other => {
                return Err(NgmakeError::parse(
                    format!("unexpected {:?} in target declaration", other),
                    source,
                    get_span(&part),
                ))
            }
        }
    }

    Ok(Declaration::Rule {
        name,
        deps,
        action,
        span,
    })
}

fn build_inline_action(pair: Pair<Rule>, source: &SourceContext) -> NgmakeResult<ActionSpec> {
    let mut params = Vec::new();
    let mut body = Body::default();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::ident => params.push(part.as_str().to_string()),
            Rule::body => body = build_body(part, source)?,
            _ => {}
        }
    }
    if params.len() == 2 && params[0] == params[1] {
        return Err(NgmakeError::invalid_declaration(format!(
            "target parameters must have distinct names, got '{}' twice",
            params[0]
        )));
    }
    Ok(ActionSpec::Inline { params, body })
}

fn build_params(pair: Pair<Rule>, source: &SourceContext) -> NgmakeResult<ParamPattern> {
    let mut pattern = ParamPattern::default();
    for item in pair.into_inner() {
        let span = get_span(&item);
        let (name, variadic) = match item.as_rule() {
            Rule::ident => (item.as_str().to_string(), false),
            Rule::variadic_param => {
                let name = item
                    .into_inner()
                    .next()
                    .map(|p| p.as_str().to_string())
                    .ok_or_else(|| NgmakeError::parse("missing name after '...'", source, span))?;
                (name, true)
            }
            other => {
                return Err(NgmakeError::parse(
                    format!("unexpected {:?} in parameter list", other),
                    source,
                    span,
                ))
            }
        };
        if pattern.variadic.is_some() {
            return Err(NgmakeError::parse(
                "the variadic parameter must be the last one",
                source,
                span,
            ));
        }
        if pattern.fixed.contains(&name) {
            return Err(NgmakeError::parse(
                format!("duplicate parameter '{name}'"),
                source,
                span,
            ));
        }
        if variadic {
            pattern.variadic = Some(name);
        } else {
            pattern.fixed.push(name);
        }
    }
    Ok(pattern)
}

// ============================================================================
// EXPRESSION BUILDERS
// ============================================================================

fn build_body(pair: Pair<Rule>, source: &SourceContext) -> NgmakeResult<Body> {
    pair.into_inner()
        .map(|p| build_phrase(p, source))
        .collect::<NgmakeResult<Vec<_>>>()
        .map(Body)
}

fn build_phrase(pair: Pair<Rule>, source: &SourceContext) -> NgmakeResult<Phrase> {
    pair.into_inner()
        .map(|p| build_term(p, source))
        .collect::<NgmakeResult<Vec<_>>>()
        .map(Phrase)
}

fn build_args(pair: Pair<Rule>, source: &SourceContext) -> NgmakeResult<Vec<Phrase>> {
    pair.into_inner().map(|p| build_phrase(p, source)).collect()
}

fn build_term(pair: Pair<Rule>, source: &SourceContext) -> NgmakeResult<Expr> {
    let span = get_span(&pair);
    match pair.as_rule() {
        Rule::string => Ok(Expr::Literal(build_string(pair))),

        Rule::ident => Ok(Expr::Ident(pair.as_str().to_string())),

        Rule::spread => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| NgmakeError::parse("missing expression after '...'", source, span))?;
            Ok(Expr::spread(build_term(inner, source)?))
        }

        Rule::call => {
            let mut parts = pair.into_inner();
            let name = next_pair(&mut parts, "macro name", span, source)?
                .as_str()
                .to_string();
            let args = build_args(next_pair(&mut parts, "argument list", span, source)?, source)?;
            Ok(Expr::Call { name, args })
        }

        Rule::list | Rule::tuple => {
            let args = match pair.into_inner().next() {
                Some(args) => build_args(args, source)?,
                None => vec![],
            };
            if args.is_empty() {
                Ok(Expr::Empty)
            } else {
                Ok(Expr::List(args))
            }
        }

        Rule::if_expr => {
            let mut parts = significant(pair);
            let mut branch = |what: &str| -> NgmakeResult<Phrase> {
                build_phrase(next_pair(&mut parts, what, span, source)?, source)
            };
            let condition = branch("condition")?;
            let then_branch = branch("'then' branch")?;
            let else_branch = branch("'else' branch")?;
            Ok(Expr::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            })
        }

        other => Err(NgmakeError::parse(
            format!("unexpected {:?} in expression", other),
            source,
            span,
        )),
    }
}

fn build_string(pair: Pair<Rule>) -> String {
    let Some(inner) = pair.into_inner().next() else {
        return String::new();
    };
    let quote = match inner.as_rule() {
        Rule::double_inner => '"',
        _ => '\'',
    };
    unescape_string(inner.as_str(), quote)
}

// ============================================================================
// UTILITIES
// ============================================================================

/// Inner pairs without keyword tokens.
fn significant(pair: Pair<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pair.into_inner().filter(|p| {
        !matches!(
            p.as_rule(),
            Rule::kw_import
                | Rule::kw_let
                | Rule::kw_macro
                | Rule::kw_do
                | Rule::kw_if
                | Rule::kw_else
        )
    })
}

fn next_pair<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    element: &str,
    span: Span,
    source: &SourceContext,
) -> NgmakeResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| NgmakeError::parse(format!("missing {element}"), source, span))
}

fn get_span(pair: &Pair<Rule>) -> Span {
    Span {
        start: pair.as_span().start(),
        end: pair.as_span().end(),
    }
}

/// Resolves escaped quotes, `\\`, `\n` and `\t`; any other escape is kept verbatim so
/// regular expressions like `'.*\.h$'` survive unchanged.
fn unescape_string(inner: &str, quote: char) -> String {
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some(c) if c == quote => result.push(c),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }

    result
}

fn convert_parse_error(error: pest::error::Error<Rule>, source: &SourceContext) -> NgmakeError {
    let span = match error.location {
        InputLocation::Pos(pos) => Span::new(pos, pos),
        InputLocation::Span((start, end)) => Span::new(start, end),
    };
    NgmakeError::parse(error.variant.message().into_owned(), source, span)
}

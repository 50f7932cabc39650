//! Builtin macros implemented in Rust.
//!
//! These cover what cannot be expressed by rewriting alone (string comparison, regular
//! expressions, concatenation). They live in the same table as user macros, are registered
//! before any module is loaded, and can be shadowed like any other macro.
//!
//! | Macro                             | Result                                       |
//! |-----------------------------------|----------------------------------------------|
//! | `match(value, pattern)`           | `'true'` if the regex matches, else `''`     |
//! | `eq(a, b)`                        | `'true'` if both values are equal, else `''` |
//! | `concat(...parts)`                | all atoms glued together                     |
//! | `join(separator, ...items)`       | atoms joined with `separator`                |
//! | `replace(value, pattern, with)`   | regex replacement on an atom                 |

use regex::Regex;

use crate::ast::ParamPattern;
use crate::errors::{NgmakeError, NgmakeResult};
use crate::macros::registry::MacroTable;
use crate::macros::types::{Clause, MacroProvenance};
use crate::value::Value;

/// Registers every builtin into `table`.
pub fn register_builtins(table: &mut MacroTable) -> NgmakeResult<()> {
    let builtins: [(&str, ParamPattern, crate::macros::types::NativeFn); 5] = [
        ("match", ParamPattern::fixed(["value", "pattern"]), builtin_match),
        ("eq", ParamPattern::fixed(["left", "right"]), builtin_eq),
        ("concat", ParamPattern::default().with_variadic("parts"), builtin_concat),
        (
            "join",
            ParamPattern::fixed(["separator"]).with_variadic("items"),
            builtin_join,
        ),
        (
            "replace",
            ParamPattern::fixed(["value", "pattern", "replacement"]),
            builtin_replace,
        ),
    ];
    for (name, pattern, func) in builtins {
        table.define(name, vec![Clause::native(pattern, func)], MacroProvenance::Builtin)?;
    }
    Ok(())
}

// ============================================================================
// IMPLEMENTATIONS
// ============================================================================

fn builtin_match(name: &str, args: &[Value]) -> NgmakeResult<Value> {
    let value = expect_atom(name, &args[0], "value")?;
    let regex = compile(name, &args[1])?;
    Ok(Value::boolean(regex.is_match(value)))
}

fn builtin_eq(_name: &str, args: &[Value]) -> NgmakeResult<Value> {
    Ok(Value::boolean(args[0] == args[1]))
}

fn builtin_concat(_name: &str, args: &[Value]) -> NgmakeResult<Value> {
    let joined: String = args.iter().flat_map(Value::flatten_atoms).collect();
    Ok(Value::Atom(joined))
}

fn builtin_join(name: &str, args: &[Value]) -> NgmakeResult<Value> {
    let separator = expect_atom(name, &args[0], "separator")?;
    let items: Vec<String> = args[1..].iter().flat_map(Value::flatten_atoms).collect();
    Ok(Value::Atom(items.join(separator)))
}

fn builtin_replace(name: &str, args: &[Value]) -> NgmakeResult<Value> {
    let value = expect_atom(name, &args[0], "value")?;
    let regex = compile(name, &args[1])?;
    let replacement = expect_atom(name, &args[2], "replacement")?;
    Ok(Value::Atom(regex.replace_all(value, replacement).into_owned()))
}

// ============================================================================
// HELPERS
// ============================================================================

fn expect_atom<'a>(name: &str, value: &'a Value, what: &str) -> NgmakeResult<&'a str> {
    value.as_atom().ok_or_else(|| {
        NgmakeError::builtin(
            name,
            format!("{what} must be an atom, got sequence {value}"),
        )
    })
}

fn compile(name: &str, pattern: &Value) -> NgmakeResult<Regex> {
    let pattern = expect_atom(name, pattern, "pattern")?;
    Regex::new(pattern)
        .map_err(|e| NgmakeError::builtin(name, format!("invalid pattern '{pattern}': {e}")))
}

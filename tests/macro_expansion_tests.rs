//! Macro expansion behaviour observed through loaded programs.

mod common;

use common::{atoms, eval};
use ngmake::runtime::DEFAULT_MAX_DEPTH;
use ngmake::{Loader, NgmakeError, Value};

const LISTS: &str = "
macro gather ( ...all ) -> all .
macro reverse ( only ) -> gather( only )
; reverse ( first, ...rest ) -> gather( ...reverse( ...rest ), first ) .
macro head ( first, ...rest ) -> first .
macro tail ( first, ...rest ) -> rest .
";

#[test]
fn first_matching_clause_wins() {
    let src = "
        macro pick ( a ) -> 'fixed' ; pick ( a, ...rest ) -> 'variadic' .
        macro greedy ( a, ...rest ) -> 'variadic' ; greedy ( a ) -> 'fixed' .
    ";
    assert_eq!(eval(src, "pick( 'x' )").unwrap(), Value::atom("fixed"));
    assert_eq!(eval(src, "pick( 'x', 'y' )").unwrap(), Value::atom("variadic"));
    assert_eq!(eval(src, "greedy( 'x' )").unwrap(), Value::atom("variadic"));
}

#[test]
fn no_matching_clause_reports_arity() {
    let err = eval("macro one ( a ) -> a .", "one( 'a', 'b' )").unwrap_err();
    match err {
        NgmakeError::NoMatchingClause { name, arg_count } => {
            assert_eq!(name, "one");
            assert_eq!(arg_count, 2);
        }
        other => panic!("expected NoMatchingClause, got {other:?}"),
    }
}

#[test]
fn unknown_macro_is_reported() {
    let err = eval("", "nothing( 'a' )").unwrap_err();
    assert!(matches!(err, NgmakeError::UnknownMacro { name, arg_count: 1 } if name == "nothing"));
}

#[test]
fn reverse_with_single_base_clause() {
    assert_eq!(
        eval(LISTS, "reverse( 'a', 'b', 'c' )").unwrap(),
        atoms(&["c", "b", "a"])
    );
    assert_eq!(eval(LISTS, "reverse( 'a' )").unwrap(), atoms(&["a"]));
}

#[test]
fn reverse_with_empty_base_clause() {
    let src = "
        macro gather ( ...all ) -> all .
        macro rev ( ) -> [] ; rev ( first, ...rest ) -> gather( ...rev( ...rest ), first ) .
    ";
    assert_eq!(eval(src, "rev( 'a', 'b', 'c' )").unwrap(), atoms(&["c", "b", "a"]));
    assert_eq!(eval(src, "rev( )").unwrap(), Value::empty());
}

#[test]
fn head_and_tail() {
    assert_eq!(eval(LISTS, "head( 'x', 'y', 'z' )").unwrap(), Value::atom("x"));
    assert_eq!(eval(LISTS, "tail( 'x', 'y', 'z' )").unwrap(), atoms(&["y", "z"]));
    assert_eq!(eval(LISTS, "tail( 'x' )").unwrap(), Value::empty());
}

#[test]
fn spread_fills_a_three_parameter_clause() {
    let src = "
        macro three ( a, b, c ) -> c b a .
        let pair = ( '1', '2' ) .
    ";
    assert_eq!(eval(src, "three( ...pair, '3' )").unwrap(), atoms(&["3", "2", "1"]));
}

#[test]
fn spread_inside_a_phrase_splices_one_level() {
    let src = "let nested = [ 'a', [ 'b', 'c' ] ] .";
    assert_eq!(
        eval(src, "'x' ...nested").unwrap(),
        Value::seq([Value::atom("x"), Value::atom("a"), atoms(&["b", "c"])])
    );
}

#[test]
fn untaken_branch_is_never_evaluated() {
    let src = "
        macro boom ( x ) -> boom( x ) .
        macro guarded ( c ) -> if c -> 'safe' else boom( c ) .
        macro inverted ( c ) -> if c -> boom( c ) else 'safe' .
        let a = guarded( 'yes' ) .
        let b = inverted( '' ) .
    ";
    let program = Loader::new().with_max_depth(32).load_str("Ngmakefile", src).unwrap();
    assert_eq!(program.constants.get("a"), Some(&Value::atom("safe")));
    assert_eq!(program.constants.get("b"), Some(&Value::atom("safe")));

    let err = Loader::new()
        .with_max_depth(32)
        .load_str("Ngmakefile", &format!("{src}\nlet c = guarded( '' ) ."))
        .unwrap_err();
    match err {
        NgmakeError::ExpansionTooDeep { name, limit, chain } => {
            assert_eq!(name, "boom");
            assert_eq!(limit, 32);
            assert_eq!(chain.first().map(String::as_str), Some("guarded"));
            assert!(chain[1..].iter().all(|n| n == "boom"));
        }
        other => panic!("expected ExpansionTooDeep, got {other:?}"),
    }
}

#[test]
fn empty_sequence_is_false() {
    let src = "macro truthy ( v ) -> if v -> 'yes' else 'no' .";
    assert_eq!(eval(src, "truthy( [] )").unwrap(), Value::atom("no"));
    assert_eq!(eval(src, "truthy( [ '' ] )").unwrap(), Value::atom("yes"));
    assert_eq!(eval(src, "truthy( '' )").unwrap(), Value::atom("no"));
}

#[test]
fn parameters_do_not_leak_into_callees() {
    let src = "
        macro inner ( y ) -> x .
        macro outer ( x ) -> inner( 'b' ) .
    ";
    let err = eval(src, "outer( 'a' )").unwrap_err();
    assert!(matches!(err, NgmakeError::UnboundIdentifier { name } if name == "x"));
}

#[test]
fn parameters_shadow_constants() {
    let src = "
        let cc = 'gcc' .
        macro with_cc ( cc ) -> cc .
        macro global_cc ( ) -> cc .
    ";
    assert_eq!(eval(src, "with_cc( 'clang' )").unwrap(), Value::atom("clang"));
    assert_eq!(eval(src, "global_cc( )").unwrap(), Value::atom("gcc"));
}

#[test]
fn later_macro_replaces_earlier_one_entirely() {
    let src = "
        macro greet ( ) -> 'old' ; greet ( who ) -> 'old' who .
        macro caller ( ) -> greet( ) .
        macro greet ( ) -> 'new' .
    ";
    assert_eq!(eval(src, "caller( )").unwrap(), Value::atom("new"));
    assert!(matches!(
        eval(src, "greet( 'x' )").unwrap_err(),
        NgmakeError::NoMatchingClause { .. }
    ));
}

#[test]
fn std_list_and_bool_work_together() {
    let src = "import 'std::list' . import 'std::bool' .";
    assert_eq!(
        eval(src, "filter( 'bool', 'full', '', 'of', '', 'stuff' )").unwrap(),
        atoms(&["full", "of", "stuff"])
    );
    assert_eq!(eval(src, "all( 'bool', 'a', 'b' )").unwrap(), Value::atom("true"));
    assert_eq!(eval(src, "all( 'bool', 'a', '' )").unwrap(), Value::atom(""));
    assert_eq!(eval(src, "all( 'bool' )").unwrap(), Value::atom("true"));
    assert_eq!(eval(src, "any( 'bool', '', 'b' )").unwrap(), Value::atom("true"));
    assert_eq!(eval(src, "not( true )").unwrap(), Value::atom(""));
    assert_eq!(eval(src, "not( false )").unwrap(), Value::atom("true"));
    assert_eq!(eval(src, "map( 'not', 'a', '' )").unwrap(), atoms(&["", "true"]));
    assert_eq!(eval(src, "last( 'a', 'b', 'c' )").unwrap(), Value::atom("c"));
    assert_eq!(eval(src, "is_empty( )").unwrap(), Value::atom("true"));
}

#[test]
fn indirect_call_through_a_quoted_name() {
    let src = "
        import 'std::list' .
        macro header ( path ) -> match( path, '.*\\.h$' ) .
    ";
    assert_eq!(
        eval(src, "filter( 'header', 'a.h', 'a.cpp', 'b.h' )").unwrap(),
        atoms(&["a.h", "b.h"])
    );
}

#[test]
fn builtins_are_available_without_imports() {
    assert_eq!(eval("", "concat( 'lib', 'foo', '.so' )").unwrap(), Value::atom("libfoo.so"));
    assert_eq!(eval("", "join( ',', 'a', 'b' )").unwrap(), Value::atom("a,b"));
    assert_eq!(
        eval("", "replace( 'src/a.cpp', '^src/(.*)\\.cpp$', 'build/$1.o' )").unwrap(),
        Value::atom("build/a.o")
    );
    assert_eq!(eval("", "eq( 'a', 'a' )").unwrap(), Value::atom("true"));
}

#[test]
fn runaway_recursion_is_an_error_at_the_default_depth() {
    let src = "
        macro spin ( x ) -> gather( spin( x ) ) .
        macro gather ( ...a ) -> a .
    ";
    match eval(src, "spin( 'a' )").unwrap_err() {
        NgmakeError::ExpansionTooDeep { name, limit, chain } => {
            assert_eq!(name, "spin");
            assert_eq!(limit, DEFAULT_MAX_DEPTH);
            assert_eq!(chain.len(), DEFAULT_MAX_DEPTH + 1);
        }
        other => panic!("expected ExpansionTooDeep, got {other:?}"),
    }
}

#[test]
fn very_large_depth_limits_still_end_in_an_error() {
    let src = "
        macro spin ( x ) -> gather( spin( x ) ) .
        macro gather ( ...a ) -> a .
        let result = spin( 'a' ) .
    ";
    let err = Loader::new()
        .with_max_depth(100_000)
        .load_str("Ngmakefile", src)
        .unwrap_err();
    assert!(matches!(err, NgmakeError::ExpansionTooDeep { limit: 100_000, .. }));
}

#[test]
fn bare_macro_name_is_unbound() {
    let err = eval("macro echo ( ...all ) -> 'echo' ...all .", "echo").unwrap_err();
    assert!(matches!(err, NgmakeError::UnboundIdentifier { name } if name == "echo"));
}

#[test]
fn parameter_named_like_a_macro_does_not_capture_calls() {
    let src = "
        macro gather ( ...all ) -> all .
        macro head ( first, ...rest ) -> first .
        macro pick ( head, a, b ) -> gather( head, head( a, b ) ) .
    ";
    assert_eq!(eval(src, "pick( 'H', 'a', 'b' )").unwrap(), atoms(&["H", "a"]));
}

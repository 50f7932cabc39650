//! Build pipeline: rule registry, dependency graph, scheduling and execution.
//!
//! The scheduler only talks to the outside world through two traits:
//! [`FreshnessOracle`] decides whether a target needs rebuilding and [`CommandRunner`]
//! executes one command.

pub mod graph;
pub mod oracle;
pub mod report;
pub mod rules;
pub mod runner;
pub mod scheduler;

pub use graph::{BuildGraph, BuildNode, UnresolvedRule};
pub use oracle::{AlwaysStale, FreshnessOracle, FsOracle};
pub use report::{BuildReport, TargetOutcome, TargetStatus};
pub use rules::{Rule, RuleRegistry, PHONY_TARGET};
pub use runner::{CommandOutput, CommandRunner, CommandStatus, DryRunRunner, ProcessRunner};
pub use scheduler::{BuildOptions, Scheduler};

use crate::ast::ActionSpec;
use crate::errors::NgmakeResult;
use crate::loader::Program;
use crate::runtime::Bindings;
use crate::value::Value;

/// Expands the action of `node` into commands, each an ordered list of tokens.
///
/// Inline actions bind `(name[, deps])`; every comma-separated phrase of the body is
/// normalised on its own. Delegate actions call the handler macro with `(name, deps)`.
pub fn expand_action(
    program: &Program,
    node: &BuildNode,
    rule: &Rule,
    max_depth: usize,
) -> NgmakeResult<Vec<Vec<String>>> {
    let name = Value::atom(node.name.clone());
    let deps = Value::atoms(node.deps.iter().cloned());
    let mut evaluator = program.evaluator(max_depth);

    match &rule.action {
        ActionSpec::None => Ok(vec![]),

        ActionSpec::Delegate(handler) => {
            Ok(evaluator.call(handler, vec![name, deps])?.into_commands())
        }

        ActionSpec::Inline { params, body } => {
            let mut env = Bindings::new();
            let mut values = [name, deps].into_iter();
            for param in params {
                if let Some(value) = values.next() {
                    env.bind(param.clone(), value);
                }
            }

            let mut commands = Vec::new();
            for phrase in body.phrases() {
                commands.extend(evaluator.eval_phrase(phrase, &env)?.into_commands());
            }
            Ok(commands)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::runtime::DEFAULT_MAX_DEPTH;

    fn commands(text: &str, target: &str) -> Vec<Vec<String>> {
        let program = Loader::new().load_str("Ngmakefile", text).unwrap();
        let graph = BuildGraph::build(&program, DEFAULT_MAX_DEPTH).unwrap();
        let node = graph.node(target).unwrap();
        let rule = graph.rule_for(&program, node).unwrap();
        expand_action(&program, node, rule, DEFAULT_MAX_DEPTH).unwrap()
    }

    #[test]
    fn inline_action_phrases_are_separate_commands() {
        let cmds = commands(
            "let cxx = 'g++' .
             do ('app', ['a.o', 'b.o']) -> (name, deps) ->
                 cxx '-o' name ...deps,
                 'strip' name .",
            "app",
        );
        assert_eq!(
            cmds,
            vec![
                vec!["g++", "-o", "app", "a.o", "b.o"],
                vec!["strip", "app"],
            ]
        );
    }

    #[test]
    fn delegate_receives_name_and_deps() {
        let cmds = commands(
            "macro link ( name, deps ) -> 'ld' '-o' name ...deps .
             do ('lib.so', ['x.o']) -> link .",
            "lib.so",
        );
        assert_eq!(cmds, vec![vec!["ld", "-o", "lib.so", "x.o"]]);
    }

    #[test]
    fn delegate_may_return_several_commands() {
        let cmds = commands(
            "macro twice ( name, deps ) -> gather( 'touch' name ), gather( 'ls' name ) .
             macro gather ( ...all ) -> all .
             do ('t') -> twice .",
            "t",
        );
        assert_eq!(cmds, vec![vec!["touch", "t"], vec!["ls", "t"]]);
    }

    #[test]
    fn single_parameter_action_sees_only_the_name() {
        let cmds = commands("do ('hello') -> (name) -> 'echo' name .", "hello");
        assert_eq!(cmds, vec![vec!["echo", "hello"]]);
    }
}

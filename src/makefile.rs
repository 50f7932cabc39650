//! GNU Make emission.
//!
//! Renders an expanded [`BuildGraph`] as a Makefile so a build description can be
//! handed to `make`. Targets whose rule cannot be expanded are emitted as comments.

use std::fmt::Write;

use tracing::warn;

use crate::build::{expand_action, BuildGraph};
use crate::loader::Program;

/// Renders every target that has a rule, in declaration order.
pub fn render(program: &Program, graph: &BuildGraph, max_depth: usize) -> String {
    let mut out = String::new();

    if !graph.phony_targets().is_empty() {
        let _ = writeln!(out, ".PHONY: {}", escape_all(graph.phony_targets()));
        out.push('\n');
    }

    for node in graph.nodes() {
        let Some(rule) = graph.rule_for(program, node) else {
            continue;
        };
        if let Some(error) = &node.broken {
            warn!(target_name = %node.name, %error, "not emitted");
            let _ = writeln!(out, "# {}: {}\n", node.name, error);
            continue;
        }
        let commands = match expand_action(program, node, rule, max_depth) {
            Ok(commands) => commands,
            Err(error) => {
                warn!(target_name = %node.name, %error, "not emitted");
                let _ = writeln!(out, "# {}: {}\n", node.name, error);
                continue;
            }
        };

        let _ = write!(out, "{}:", escape(&node.name));
        for dep in &node.deps {
            let _ = write!(out, " {}", escape(dep));
        }
        out.push('\n');
        for command in &commands {
            let _ = writeln!(out, "\t{}", escape_all(command));
        }
        out.push('\n');
    }

    out
}

fn escape(token: &str) -> String {
    token.replace('$', "$$")
}

fn escape_all(tokens: &[String]) -> String {
    tokens.iter().map(|t| escape(t)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::runtime::DEFAULT_MAX_DEPTH;

    fn makefile(text: &str) -> String {
        let program = Loader::new().load_str("Ngmakefile", text).unwrap();
        let graph = BuildGraph::build(&program, DEFAULT_MAX_DEPTH).unwrap();
        render(&program, &graph, DEFAULT_MAX_DEPTH)
    }

    #[test]
    fn renders_targets_and_recipes() {
        let text = makefile(
            "do ('.PHONY', ['all']) .
             do ('all', ['hello']) .
             do ('hello', ['hello.c']) -> (name, deps) -> 'cc' '-o' name ...deps .",
        );
        assert_eq!(
            text,
            ".PHONY: all\n\nall: hello\n\nhello: hello.c\n\tcc -o hello hello.c\n\n"
        );
    }

    #[test]
    fn dollars_are_escaped() {
        let text = makefile("do ('env') -> (name) -> 'echo' '$HOME' .");
        assert!(text.contains("\techo $$HOME\n"));
    }

    #[test]
    fn broken_targets_become_comments() {
        let text = makefile("do ('bad', [ nowhere ]) .");
        assert!(text.starts_with("# bad: unbound identifier 'nowhere'"));
    }
}

//! Term-rewriting evaluator.
//!
//! Reduces expression trees to [`Value`]s:
//!
//! - literals evaluate to themselves;
//! - identifiers are looked up in the current binding environment, then in the globals;
//! - calls evaluate their arguments (splicing `...x` arguments), dispatch on the flat
//!   argument count and evaluate the chosen clause body in a fresh environment;
//! - `if` evaluates its condition and then exactly one branch. The untaken branch is
//!   never touched, which is what lets recursive macros terminate.
//!
//! Reduction runs on an explicit task stack with a separate value stack, so nesting
//! depth costs heap rather than native stack. Every template invocation pushes the
//! macro name onto a call chain; when the chain reaches the configured depth the
//! evaluator fails with `ExpansionTooDeep`.

use tracing::trace;

use crate::ast::{Body, Expr, ParamPattern, Phrase};
use crate::errors::{NgmakeError, NgmakeResult};
use crate::macros::{ClauseBody, MacroTable};
use crate::runtime::context::{Bindings, DEFAULT_MAX_DEPTH};
use crate::value::Value;

// ============================================================================
// TASKS
// ============================================================================

/// One step of pending work. Evaluation tasks push exactly one value when they
/// complete; assembly tasks pop the values of the tasks scheduled before them.
enum Task<'p> {
    Body(&'p Body, Bindings),
    Phrase(&'p Phrase, Bindings),
    Term(&'p Expr, Bindings),
    /// Argument or list-element phrases, producing one sequence.
    Items(&'p [Phrase], Bindings),
    /// Pops one value per term; spread terms are spliced.
    Juxtapose(&'p [Expr]),
    /// Pops one value per phrase; lone `...x` phrases are spliced.
    Gather(&'p [Phrase]),
    /// Pops `n` values into a sequence.
    Collect(usize),
    Splice,
    Branch {
        then_branch: &'p Phrase,
        else_branch: &'p Phrase,
        env: Bindings,
    },
    /// Pops the argument sequence and dispatches.
    Invoke(String),
    /// Leaves the innermost template invocation.
    Return,
}

// ============================================================================
// EVALUATOR
// ============================================================================

/// Expansion state for one reduction. Cheap to create; one per rule or per action.
pub struct Evaluator<'a> {
    macros: &'a MacroTable,
    globals: &'a Bindings,
    max_depth: usize,
    chain: Vec<String>,
}

impl<'a> Evaluator<'a> {
    pub fn new(macros: &'a MacroTable, globals: &'a Bindings) -> Self {
        Self {
            macros,
            globals,
            max_depth: DEFAULT_MAX_DEPTH,
            chain: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Number of template invocations currently active.
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// Evaluates a comma-separated body.
    ///
    /// Zero phrases give the empty sequence, one phrase gives its own value, several
    /// phrases give the sequence of their values.
    pub fn eval_body(&mut self, body: &Body, env: &Bindings) -> NgmakeResult<Value> {
        self.run(Task::Body(body, env.clone()), Vec::new())
    }

    /// Evaluates juxtaposed terms.
    ///
    /// A single non-spread term yields its own value. Anything else yields a sequence in
    /// which spread terms contribute their elements and other terms contribute one item.
    pub fn eval_phrase(&mut self, phrase: &Phrase, env: &Bindings) -> NgmakeResult<Value> {
        self.run(Task::Phrase(phrase, env.clone()), Vec::new())
    }

    pub fn eval_term(&mut self, expr: &Expr, env: &Bindings) -> NgmakeResult<Value> {
        self.run(Task::Term(expr, env.clone()), Vec::new())
    }

    /// Invokes macro `name` with already evaluated arguments.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> NgmakeResult<Value> {
        self.run(Task::Invoke(name.to_string()), vec![Value::Seq(args)])
    }

    // ------------------------------------------------------------------------
    // Reduction loop
    // ------------------------------------------------------------------------

    fn run<'p>(&mut self, start: Task<'p>, mut values: Vec<Value>) -> NgmakeResult<Value>
    where
        'a: 'p,
    {
        let base = self.chain.len();
        let mut tasks = vec![start];
        let result = self.drive(&mut tasks, &mut values);
        self.chain.truncate(base);
        result.map(|()| pop(&mut values))
    }

    fn drive<'p>(
        &mut self,
        tasks: &mut Vec<Task<'p>>,
        values: &mut Vec<Value>,
    ) -> NgmakeResult<()>
    where
        'a: 'p,
    {
        while let Some(task) = tasks.pop() {
            match task {
                Task::Body(body, env) => match body.phrases() {
                    [] => values.push(Value::empty()),
                    [only] => tasks.push(Task::Phrase(only, env)),
                    phrases => {
                        tasks.push(Task::Collect(phrases.len()));
                        for phrase in phrases.iter().rev() {
                            tasks.push(Task::Phrase(phrase, env.clone()));
                        }
                    }
                },

                Task::Phrase(phrase, env) => match phrase.terms() {
                    [term] if !term.is_spread() => tasks.push(Task::Term(term, env)),
                    terms => {
                        tasks.push(Task::Juxtapose(terms));
                        for term in terms.iter().rev() {
                            let inner = match term {
                                Expr::Spread(inner) => &**inner,
                                other => other,
                            };
                            tasks.push(Task::Term(inner, env.clone()));
                        }
                    }
                },

                Task::Term(expr, env) => match expr {
                    Expr::Literal(text) => values.push(Value::Atom(text.clone())),
                    Expr::Ident(name) => values.push(self.lookup(name, &env)?),
                    Expr::Call { name, args } => {
                        let callee = self.callee(name, &env);
                        tasks.push(Task::Invoke(callee));
                        tasks.push(Task::Items(args, env));
                    }
                    Expr::If {
                        condition,
                        then_branch,
                        else_branch,
                    } => {
                        tasks.push(Task::Branch {
                            then_branch: &**then_branch,
                            else_branch: &**else_branch,
                            env: env.clone(),
                        });
                        tasks.push(Task::Phrase(&**condition, env));
                    }
                    Expr::Empty => values.push(Value::empty()),
                    Expr::List(items) => tasks.push(Task::Items(items, env)),
                    Expr::Spread(inner) => {
                        tasks.push(Task::Splice);
                        tasks.push(Task::Term(&**inner, env));
                    }
                },

                Task::Items(phrases, env) => {
                    tasks.push(Task::Gather(phrases));
                    for phrase in phrases.iter().rev() {
                        match phrase.as_lone_spread() {
                            Some(inner) => tasks.push(Task::Term(inner, env.clone())),
                            None => tasks.push(Task::Phrase(phrase, env.clone())),
                        }
                    }
                }

                Task::Juxtapose(terms) => {
                    let parts = pop_n(values, terms.len());
                    let mut items = Vec::with_capacity(parts.len());
                    for (term, value) in terms.iter().zip(parts) {
                        if term.is_spread() {
                            items.extend(value.splice());
                        } else {
                            items.push(value);
                        }
                    }
                    values.push(Value::Seq(items));
                }

                Task::Gather(phrases) => {
                    let parts = pop_n(values, phrases.len());
                    let mut items = Vec::with_capacity(parts.len());
                    for (phrase, value) in phrases.iter().zip(parts) {
                        if phrase.as_lone_spread().is_some() {
                            items.extend(value.splice());
                        } else {
                            items.push(value);
                        }
                    }
                    values.push(Value::Seq(items));
                }

                Task::Collect(n) => {
                    let items = pop_n(values, n);
                    values.push(Value::Seq(items));
                }

                Task::Splice => {
                    let value = pop(values);
                    values.push(Value::Seq(value.splice()));
                }

                Task::Branch {
                    then_branch,
                    else_branch,
                    env,
                } => {
                    let chosen = if pop(values).is_truthy() {
                        then_branch
                    } else {
                        else_branch
                    };
                    tasks.push(Task::Phrase(chosen, env));
                }

                Task::Invoke(name) => {
                    let args = pop(values).splice();
                    self.invoke(name, args, tasks, values)?;
                }

                Task::Return => {
                    self.chain.pop();
                }
            }
        }
        Ok(())
    }

    /// Dispatches `name`. Native clauses complete at once; template clauses schedule
    /// their body between a chain push and a [`Task::Return`].
    fn invoke<'p>(
        &mut self,
        name: String,
        args: Vec<Value>,
        tasks: &mut Vec<Task<'p>>,
        values: &mut Vec<Value>,
    ) -> NgmakeResult<()>
    where
        'a: 'p,
    {
        let macros: &'a MacroTable = self.macros;
        let clause = macros.resolve(&name, args.len())?;
        match &clause.body {
            ClauseBody::Native(func) => values.push(func(&name, &args)?),
            ClauseBody::Template(body) => {
                if self.chain.len() >= self.max_depth {
                    let mut chain = self.chain.clone();
                    chain.push(name.clone());
                    return Err(NgmakeError::ExpansionTooDeep {
                        name,
                        limit: self.max_depth,
                        chain,
                    });
                }
                trace!(
                    macro_name = %name,
                    arity = args.len(),
                    depth = self.chain.len(),
                    "expanding"
                );
                let env = bind_parameters(&clause.pattern, args);
                self.chain.push(name);
                tasks.push(Task::Return);
                tasks.push(Task::Body(body, env));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// A local atom names the macro to call, unless the written name is itself a macro.
    /// Parameters therefore never capture calls to the macros a body uses.
    fn callee(&self, name: &str, env: &Bindings) -> String {
        if !self.macros.contains(name) {
            if let Some(Value::Atom(target)) = env.get(name) {
                if !target.is_empty() {
                    return target.clone();
                }
            }
        }
        name.to_string()
    }

    /// Locals, then globals.
    fn lookup(&self, name: &str, env: &Bindings) -> NgmakeResult<Value> {
        env.get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
            .ok_or_else(|| NgmakeError::UnboundIdentifier {
                name: name.to_string(),
            })
    }
}

fn pop(values: &mut Vec<Value>) -> Value {
    values.pop().unwrap_or_else(Value::empty)
}

fn pop_n(values: &mut Vec<Value>, n: usize) -> Vec<Value> {
    let at = values.len().saturating_sub(n);
    values.split_off(at)
}

/// Binds fixed parameters positionally and the variadic one to the remainder.
///
/// Callers guarantee `pattern.matches(args.len())`.
pub fn bind_parameters(pattern: &ParamPattern, args: Vec<Value>) -> Bindings {
    let mut env = Bindings::new();
    let mut args = args.into_iter();
    for name in &pattern.fixed {
        if let Some(value) = args.next() {
            env.bind(name.clone(), value);
        }
    }
    if let Some(rest) = &pattern.variadic {
        env.bind(rest.clone(), Value::Seq(args.collect()));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::{Clause, MacroProvenance};

    fn table_with(name: &str, clauses: Vec<Clause>) -> MacroTable {
        let mut table = MacroTable::new();
        table.define(name, clauses, MacroProvenance::User).unwrap();
        table
    }

    #[test]
    fn variadic_binds_the_remainder() {
        let env = bind_parameters(
            &ParamPattern::fixed(["first"]).with_variadic("rest"),
            vec!["a".into(), "b".into(), "c".into()],
        );
        assert_eq!(env.get("first"), Some(&Value::atom("a")));
        assert_eq!(env.get("rest"), Some(&Value::atoms(["b", "c"])));
    }

    #[test]
    fn empty_variadic_is_an_empty_sequence() {
        let env = bind_parameters(&ParamPattern::default().with_variadic("all"), vec![]);
        assert_eq!(env.get("all"), Some(&Value::empty()));
    }

    #[test]
    fn locals_shadow_globals() {
        let table = MacroTable::new();
        let globals: Bindings = [("cxx", Value::atom("g++"))].into_iter().collect();
        let mut eval = Evaluator::new(&table, &globals);
        let local: Bindings = [("cxx", Value::atom("clang++"))].into_iter().collect();

        assert_eq!(
            eval.eval_term(&Expr::ident("cxx"), &local).unwrap(),
            Value::atom("clang++")
        );
        assert_eq!(
            eval.eval_term(&Expr::ident("cxx"), &Bindings::new()).unwrap(),
            Value::atom("g++")
        );
    }

    #[test]
    fn depth_guard_stops_runaway_recursion() {
        let body = Body(vec![Phrase::single(Expr::call(
            "spin",
            vec![Phrase::single(Expr::ident("x"))],
        ))]);
        let table = table_with("spin", vec![Clause::template(ParamPattern::fixed(["x"]), body)]);
        let globals = Bindings::new();
        let mut eval = Evaluator::new(&table, &globals).with_max_depth(8);

        match eval.call("spin", vec!["a".into()]) {
            Err(NgmakeError::ExpansionTooDeep { name, limit, chain }) => {
                assert_eq!(name, "spin");
                assert_eq!(limit, 8);
                assert_eq!(chain.len(), 9);
            }
            other => panic!("expected ExpansionTooDeep, got {other:?}"),
        }
        assert_eq!(eval.depth(), 0);
    }

    #[test]
    fn deep_limits_do_not_consume_native_stack() {
        let body = Body(vec![Phrase::single(Expr::call(
            "spin",
            vec![Phrase::single(Expr::ident("x"))],
        ))]);
        let table = table_with("spin", vec![Clause::template(ParamPattern::fixed(["x"]), body)]);
        let globals = Bindings::new();
        let mut eval = Evaluator::new(&table, &globals).with_max_depth(100_000);

        match eval.call("spin", vec!["a".into()]) {
            Err(NgmakeError::ExpansionTooDeep { chain, .. }) => assert_eq!(chain.len(), 100_001),
            other => panic!("expected ExpansionTooDeep, got {other:?}"),
        }
        assert_eq!(eval.depth(), 0);
    }

    #[test]
    fn macro_names_are_not_identifiers() {
        let table = table_with(
            "echo",
            vec![Clause::template(ParamPattern::default(), Body(vec![]))],
        );
        let globals = Bindings::new();
        let mut eval = Evaluator::new(&table, &globals);

        assert!(matches!(
            eval.eval_term(&Expr::ident("echo"), &Bindings::new()),
            Err(NgmakeError::UnboundIdentifier { name }) if name == "echo"
        ));
    }
}

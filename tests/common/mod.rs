//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use ngmake::build::{BuildGraph, CommandOutput, CommandRunner, CommandStatus, FreshnessOracle};
use ngmake::runtime::DEFAULT_MAX_DEPTH;
use ngmake::{Loader, NgmakeResult, Program, Value};

pub fn load(text: &str) -> Program {
    try_load(text).expect("program should load")
}

pub fn try_load(text: &str) -> NgmakeResult<Program> {
    Loader::new().load_str("Ngmakefile", text)
}

pub fn graph(program: &Program) -> BuildGraph {
    BuildGraph::build(program, DEFAULT_MAX_DEPTH).expect("graph should build")
}

/// Loads `source` followed by `let result = <expr> .` and returns the constant.
pub fn eval(source: &str, expr: &str) -> NgmakeResult<Value> {
    let program = try_load(&format!("{source}\nlet result = {expr} ."))?;
    Ok(program
        .constants
        .get("result")
        .cloned()
        .expect("result constant"))
}

pub fn atoms(items: &[&str]) -> Value {
    Value::atoms(items.iter().copied())
}

pub fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Records every command; fails any command containing one of the poison tokens.
#[derive(Default)]
pub struct RecordingRunner {
    log: Mutex<Vec<Vec<String>>>,
    poison: Vec<String>,
    timeout_on: Vec<String>,
    panic_on: Vec<String>,
    delay: Option<Duration>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, token: &str) -> Self {
        self.poison.push(token.to_string());
        self
    }

    pub fn timing_out_on(mut self, token: &str) -> Self {
        self.timeout_on.push(token.to_string());
        self
    }

    pub fn panicking_on(mut self, token: &str) -> Self {
        self.panic_on.push(token.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.log.lock().unwrap().clone()
    }

    pub fn joined(&self) -> Vec<String> {
        self.commands().iter().map(|c| c.join(" ")).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, tokens: &[String], _timeout: Option<Duration>) -> CommandOutput {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.log.lock().unwrap().push(tokens.to_vec());
        if tokens.iter().any(|t| self.panic_on.contains(t)) {
            panic!("runner crashed on {}", tokens.join(" "));
        }
        if tokens.iter().any(|t| self.timeout_on.contains(t)) {
            return CommandOutput {
                status: CommandStatus::TimedOut,
                output: String::new(),
            };
        }
        if tokens.iter().any(|t| self.poison.contains(t)) {
            return CommandOutput::failed(Some(1), "boom");
        }
        CommandOutput::success("")
    }
}

/// Reports a fixed set of targets as up to date.
pub struct FixedOracle(pub HashSet<String>);

impl FixedOracle {
    pub fn fresh(names: &[&str]) -> Self {
        Self(names.iter().map(|s| s.to_string()).collect())
    }

    pub fn none() -> Self {
        Self(HashSet::new())
    }
}

impl FreshnessOracle for FixedOracle {
    fn is_up_to_date(&self, target: &str, _deps: &[String]) -> bool {
        self.0.contains(target)
    }
}

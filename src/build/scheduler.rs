//! Parallel build scheduler.
//!
//! Executes the part of a [`BuildGraph`] reachable from the requested targets. Workers
//! share one mutex-guarded state holding a ready queue and, for each planned node, the
//! number of dependencies still outstanding. A node becomes ready when that number hits
//! zero. When a node fails, everything that depends on it, directly or transitively, is
//! marked blocked and never queued; unrelated parts of the graph keep building.

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::build::expand_action;
use crate::build::graph::BuildGraph;
use crate::build::oracle::FreshnessOracle;
use crate::build::report::{BuildReport, TargetOutcome, TargetStatus};
use crate::build::runner::{CommandRunner, CommandStatus};
use crate::errors::NgmakeError;
use crate::loader::Program;
use crate::runtime::DEFAULT_MAX_DEPTH;

/// Knobs for one build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Maximum number of targets executing at once.
    pub jobs: usize,
    pub max_depth: usize,
    /// Per-command limit; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            max_depth: DEFAULT_MAX_DEPTH,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Waiting,
    Running,
    Done,
    Blocked,
}

struct Shared {
    ready: BinaryHeap<Reverse<usize>>,
    pending: HashMap<usize, usize>,
    state: HashMap<usize, NodeState>,
    remaining: usize,
    outcomes: Vec<TargetOutcome>,
}

/// Runs build plans against a loaded program.
pub struct Scheduler<'a> {
    program: &'a Program,
    graph: &'a BuildGraph,
    runner: &'a dyn CommandRunner,
    oracle: &'a dyn FreshnessOracle,
    options: BuildOptions,
    dependents: HashMap<usize, Vec<usize>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        program: &'a Program,
        graph: &'a BuildGraph,
        runner: &'a dyn CommandRunner,
        oracle: &'a dyn FreshnessOracle,
    ) -> Self {
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, node) in graph.nodes().iter().enumerate() {
            for &dep in node.edges() {
                dependents.entry(dep).or_default().push(i);
            }
        }
        Self {
            program,
            graph,
            runner,
            oracle,
            options: BuildOptions::default(),
            dependents,
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds `requested` and everything it depends on.
    ///
    /// Never fails as a whole: unknown targets and failing commands are recorded in the
    /// returned report.
    pub fn run(&self, requested: &[String]) -> BuildReport {
        let mut report = BuildReport {
            unresolved: self
                .graph
                .unresolved()
                .iter()
                .map(|u| format!("{} ({}): {}", u.rule, u.origin, u.error))
                .collect(),
            ..BuildReport::default()
        };

        let mut known = Vec::new();
        for name in requested {
            if self.graph.index_of(name).is_some() {
                known.push(name.clone());
            } else {
                let error = NgmakeError::UnknownTarget {
                    target: name.clone(),
                };
                report.outcomes.push(TargetOutcome::failed(name.clone(), Arc::new(error)));
            }
        }

        let plan = match self.graph.plan(&known) {
            Ok(plan) => plan,
            Err(error) => {
                report.outcomes.push(TargetOutcome::failed("", Arc::new(error)));
                return report;
            }
        };
        if plan.is_empty() {
            return report;
        }
        debug!(targets = plan.len(), jobs = self.options.jobs, "build plan");

        let shared = self.initial_state(&plan);
        let signal = Condvar::new();

        thread::scope(|scope| {
            let workers = self.options.jobs.clamp(1, plan.len());
            let mut spawned = 0;
            for id in 0..workers {
                let result = thread::Builder::new()
                    .name(format!("ngmake-worker-{id}"))
                    .spawn_scoped(scope, || self.work(&shared, &signal));
                match result {
                    Ok(_) => spawned += 1,
                    Err(e) => warn!(error = %e, "could not start worker thread"),
                }
            }
            if spawned == 0 {
                self.work(&shared, &signal);
            }
        });

        let shared = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        report.outcomes.extend(shared.outcomes);
        report
    }

    fn initial_state(&self, plan: &[usize]) -> Mutex<Shared> {
        let mut shared = Shared {
            ready: BinaryHeap::new(),
            pending: HashMap::new(),
            state: HashMap::new(),
            remaining: plan.len(),
            outcomes: Vec::with_capacity(plan.len()),
        };
        for &n in plan {
            let outstanding = self.graph.nodes()[n].edges().len();
            shared.pending.insert(n, outstanding);
            shared.state.insert(n, NodeState::Waiting);
            if outstanding == 0 {
                shared.ready.push(Reverse(n));
            }
        }
        Mutex::new(shared)
    }

    // ------------------------------------------------------------------------
    // Worker loop
    // ------------------------------------------------------------------------

    fn work(&self, shared: &Mutex<Shared>, signal: &Condvar) {
        loop {
            let node = {
                let mut guard = lock(shared);
                loop {
                    if let Some(Reverse(n)) = guard.ready.pop() {
                        guard.state.insert(n, NodeState::Running);
                        break n;
                    }
                    if guard.remaining == 0 {
                        return;
                    }
                    guard = signal.wait(guard).unwrap_or_else(PoisonError::into_inner);
                }
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(node)))
                .unwrap_or_else(|payload| self.panicked(node, payload.as_ref()));

            let mut guard = lock(shared);
            self.finish(&mut guard, node, outcome);
            signal.notify_all();
        }
    }

    fn finish(&self, shared: &mut Shared, node: usize, outcome: TargetOutcome) {
        let failed = outcome.status.is_failure();
        shared.state.insert(node, NodeState::Done);
        shared.remaining -= 1;
        shared.outcomes.push(outcome);

        if failed {
            self.block_dependents(shared, node);
            return;
        }

        for &dependent in self.dependents_of(node) {
            if shared.state.get(&dependent) != Some(&NodeState::Waiting) {
                continue;
            }
            if let Some(count) = shared.pending.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    shared.ready.push(Reverse(dependent));
                }
            }
        }
    }

    fn block_dependents(&self, shared: &mut Shared, failed: usize) {
        let mut queue = VecDeque::from([failed]);
        while let Some(cause) = queue.pop_front() {
            let cause_name = &self.graph.nodes()[cause].name;
            for &dependent in self.dependents_of(cause) {
                if shared.state.get(&dependent) != Some(&NodeState::Waiting) {
                    continue;
                }
                let name = &self.graph.nodes()[dependent].name;
                info!(target_name = %name, dependency = %cause_name, "blocked");
                shared.state.insert(dependent, NodeState::Blocked);
                shared.remaining -= 1;
                shared.outcomes.push(TargetOutcome::blocked(name.clone(), cause_name));
                queue.push_back(dependent);
            }
        }
    }

    fn dependents_of(&self, node: usize) -> &[usize] {
        self.dependents.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A panic while executing a node fails that node; the run itself carries on.
    fn panicked(&self, index: usize, payload: &(dyn Any + Send)) -> TargetOutcome {
        let target = self.graph.nodes()[index].name.clone();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(target_name = %target, %message, "target panicked");
        let error = NgmakeError::TargetPanicked {
            target: target.clone(),
            message,
        };
        TargetOutcome::failed(target, Arc::new(error))
    }

    // ------------------------------------------------------------------------
    // Executing one node
    // ------------------------------------------------------------------------

    fn execute(&self, index: usize) -> TargetOutcome {
        let node = &self.graph.nodes()[index];
        let Some(rule) = self.graph.rule_for(self.program, node) else {
            return TargetOutcome::ok(node.name.clone(), TargetStatus::Source);
        };
        if let Some(error) = &node.broken {
            return TargetOutcome::failed(node.name.clone(), Arc::clone(error));
        }
        if !node.phony && self.oracle.is_up_to_date(&node.name, &node.deps) {
            debug!(target_name = %node.name, "up to date");
            return TargetOutcome::ok(node.name.clone(), TargetStatus::UpToDate);
        }

        let commands = match expand_action(self.program, node, rule, self.options.max_depth) {
            Ok(commands) => commands,
            Err(error) => return TargetOutcome::failed(node.name.clone(), Arc::new(error)),
        };

        for tokens in &commands {
            let command = tokens.join(" ");
            info!(target_name = %node.name, %command, "running");
            let result = self.runner.run(tokens, self.options.timeout);
            let error = match result.status {
                CommandStatus::Success => continue,
                CommandStatus::Failed(code) => NgmakeError::BuildFailed {
                    target: node.name.clone(),
                    command,
                    code,
                    output: result.output,
                },
                CommandStatus::TimedOut => NgmakeError::CommandTimeout {
                    target: node.name.clone(),
                    command,
                    timeout: self.options.timeout.unwrap_or_default(),
                },
            };
            warn!(target_name = %node.name, %error, "target failed");
            return TargetOutcome::failed(node.name.clone(), Arc::new(error));
        }

        info!(target_name = %node.name, commands = commands.len(), "built");
        TargetOutcome::ok(node.name.clone(), TargetStatus::Built)
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

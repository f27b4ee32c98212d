//! Batch Executors
//!
//! Runs a batch of problems and collects one outcome per problem. The
//! isolated executor goes through a supervised worker process; the local
//! executor runs everything in-process, where a hung method is abandoned on
//! its thread rather than killed.

use crate::config::SupervisorConfig;
use crate::plan::build_plan;
use crate::report::ProblemOutcome;
use crate::supervisor::{Supervisor, SupervisorError, WorkerCommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use timebox_core::{ProblemRegistry, ProblemRunInfo, RunError, RunResult, Runner, TimeoutLimits};
use tracing::warn;

fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Executor that runs problems in a disposable worker process
///
/// A method that overruns its timeout takes its worker down with it; the
/// supervisor process itself never blocks on a runaway computation.
pub struct IsolatedExecutor {
    config: SupervisorConfig,
    command: WorkerCommand,
    quiet: bool,
}

impl IsolatedExecutor {
    pub fn new(config: SupervisorConfig, command: WorkerCommand) -> Self {
        Self {
            config,
            command,
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn execute(
        &self,
        registry: Arc<ProblemRegistry>,
        infos: &[ProblemRunInfo],
    ) -> Result<Vec<ProblemOutcome>, SupervisorError> {
        let plan = build_plan(&registry, infos);
        let pb = progress_bar(plan.entries.len(), self.quiet);
        pb.set_message("Starting isolated worker...");

        let mut supervisor = Supervisor::new(self.config.clone(), self.command.clone(), registry);
        let outcomes = supervisor.run_plan(&plan, |outcome| {
            pb.set_message(format!("problem {}", outcome.problem_id));
            pb.inc(1);
        })?;

        supervisor.shutdown();
        pb.finish_with_message("Complete (isolated)");
        Ok(outcomes)
    }
}

/// Executor that runs problems on threads of the current process
pub struct LocalExecutor {
    limits: TimeoutLimits,
    total_timeout: Option<Duration>,
    quiet: bool,
}

impl LocalExecutor {
    pub fn new(limits: TimeoutLimits, total_timeout: Option<Duration>) -> Self {
        Self {
            limits,
            total_timeout,
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Run the batch under the shared total deadline.
    ///
    /// Problems are run one at a time; the first error stops the batch and
    /// is reported on the outcome it happened in.
    pub fn execute(&self, registry: Arc<ProblemRegistry>, infos: &[ProblemRunInfo]) -> Vec<ProblemOutcome> {
        let plan = build_plan(&registry, infos);
        let pb = progress_bar(plan.entries.len(), self.quiet);
        let runner = Runner::new(Arc::clone(&registry)).with_limits(self.limits);
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(plan.entries.len() + plan.unknown.len());

        for entry in &plan.entries {
            let Some(problem) = registry.get(entry.problem_id) else {
                continue;
            };
            pb.set_message(format!("problem {}", entry.problem_id));

            // One method at a time so a failure keeps what already finished
            let mut result = RunResult::new();
            let mut stop = false;
            for method in &entry.methods {
                let info = ProblemRunInfo::new(entry.problem_id, method.clone());
                let remaining = self.total_timeout.map(|total| total.saturating_sub(start.elapsed()));
                match runner.run_many(std::slice::from_ref(&info), remaining) {
                    Ok(results) => results.into_iter().for_each(|r| result.append(r)),
                    Err(e) => {
                        warn!(problem = entry.problem_id, method = %method, error = %e, "local run stopped");
                        result.append(error_result(e));
                        stop = true;
                        break;
                    }
                }
            }

            outcomes.push(ProblemOutcome::new(problem, result));
            pb.inc(1);
            if stop {
                break;
            }
        }
        for &id in &plan.unknown {
            outcomes.push(ProblemOutcome::missing(id, RunError::NoSuchProblem(id).to_string()));
        }

        pb.finish_with_message("Complete (local)");
        outcomes
    }
}

fn error_result(err: RunError) -> RunResult {
    let message = err.to_string();
    let mut result = match err {
        RunError::Timeout { partial, .. } => partial,
        _ => RunResult::new(),
    };
    result.message = message;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use timebox_core::Problem;

    fn registry() -> Arc<ProblemRegistry> {
        Arc::new(
            ProblemRegistry::import(vec![
                Problem::new(1, "one").answer(1).method("a", || 1).method("b", || 1),
                Problem::new(2, "hang").method("spin", || {
                    thread::sleep(Duration::from_secs(3));
                    2
                }),
                Problem::new(3, "three").answer(3).method("a", || 3),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_local_runs_all_problems() {
        let executor = LocalExecutor::new(TimeoutLimits::default(), None).quiet(true);
        let outcomes = executor.execute(registry(), &ProblemRunInfo::parse_list(&["1", "3"]).unwrap());
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].result.len(), 2);
        assert!(outcomes[0].is_correct());
        assert!(outcomes[1].is_correct());
    }

    #[test]
    fn test_local_timeout_stops_batch() {
        let limits = TimeoutLimits::new(None, Some(Duration::from_millis(50)));
        let executor = LocalExecutor::new(limits, None).quiet(true);
        let outcomes = executor.execute(registry(), &[]);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[1].has_timeout());
        assert!(outcomes[1].result.message.contains("timed out"));
    }

    #[test]
    fn test_local_keeps_finished_methods_on_timeout() {
        let registry = Arc::new(
            ProblemRegistry::import(vec![Problem::new(5, "five")
                .answer(5)
                .method("a_fast", || 5)
                .method("b_hang", || {
                    thread::sleep(Duration::from_secs(2));
                    5
                })])
            .unwrap(),
        );
        let limits = TimeoutLimits::new(None, Some(Duration::from_millis(50)));
        let outcomes = LocalExecutor::new(limits, None).quiet(true).execute(registry, &[]);

        let items: Vec<(&str, bool)> = outcomes[0]
            .result
            .items
            .iter()
            .map(|i| (i.method.as_str(), i.is_timeout))
            .collect();
        assert_eq!(items, vec![("a_fast", false), ("b_hang", true)]);
        assert_eq!(outcomes[0].result.items[0].result, 5);
        assert!(outcomes[0].result.message.contains("timed out"));
    }

    #[test]
    fn test_local_reports_unknown_ids() {
        let executor = LocalExecutor::new(TimeoutLimits::default(), None).quiet(true);
        let outcomes = executor.execute(registry(), &ProblemRunInfo::parse_list(&["3", "77"]).unwrap());
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].problem_id, 77);
        assert!(outcomes[1].result.message.contains("no such problem"));
    }
}

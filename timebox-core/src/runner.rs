//! Timeout Runner
//!
//! Runs problem methods either inline or on a background thread raced against
//! a deadline. A background computation that misses its deadline is abandoned,
//! not stopped: its thread keeps running until it returns on its own and the
//! value is discarded. Only killing the process reclaims it.

use crate::problem::Solution;
use crate::registry::ProblemRegistry;
use crate::result::{ResultItem, RunResult};
use crate::run_info::ProblemRunInfo;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no such problem: {0}")]
    NoSuchProblem(u32),

    #[error("no such solution '{method}' for problem {problem}")]
    NoSuchSolution { problem: u32, method: String },

    #[error("problem {problem} timed out after {elapsed:?}")]
    Timeout {
        problem: u32,
        /// Items finished before the deadline plus a timeout item per unfinished method
        partial: RunResult,
        elapsed: Duration,
    },

    #[error("method '{method}' of problem {problem} panicked: {message}")]
    MethodPanicked {
        problem: u32,
        method: String,
        message: String,
    },

    #[error("failed to start runner thread: {0}")]
    Spawn(#[source] io::Error),
}

impl RunError {
    /// Failures of the runner itself rather than of the request; a worker
    /// reports these and then stops
    pub fn is_internal(&self) -> bool {
        matches!(self, RunError::MethodPanicked { .. } | RunError::Spawn(_))
    }
}

/// Deadlines for a single request; `None` waits indefinitely
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutLimits {
    /// Budget for running every method of a problem
    pub problem: Option<Duration>,
    /// Budget for one named method
    pub method: Option<Duration>,
}

impl TimeoutLimits {
    pub fn new(problem: Option<Duration>, method: Option<Duration>) -> Self {
        Self { problem, method }
    }

    /// Clamp both limits to at most `budget`
    pub fn capped(self, budget: Duration) -> Self {
        let cap = |limit: Option<Duration>| Some(limit.map_or(budget, |l| l.min(budget)));
        Self {
            problem: cap(self.problem),
            method: cap(self.method),
        }
    }

    fn for_info(&self, info: &ProblemRunInfo) -> Option<Duration> {
        if info.is_all_methods() {
            self.problem
        } else {
            self.method
        }
    }
}

/// Resolved methods of one request, in run order
struct Plan {
    problem_id: u32,
    methods: Vec<(String, Solution)>,
}

impl Plan {
    fn timed_out(&self, mut partial: RunResult, finished: usize, elapsed: Duration) -> RunError {
        for (name, _) in &self.methods[finished..] {
            partial.push_timeout(self.problem_id, name.as_str(), elapsed);
        }
        RunError::Timeout {
            problem: self.problem_id,
            partial,
            elapsed,
        }
    }
}

pub struct Runner {
    registry: Arc<ProblemRegistry>,
    limits: TimeoutLimits,
}

impl Runner {
    pub fn new(registry: Arc<ProblemRegistry>) -> Self {
        Self {
            registry,
            limits: TimeoutLimits::default(),
        }
    }

    /// Per-request limits used by `run_many` and `run_all`
    pub fn with_limits(mut self, limits: TimeoutLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn registry(&self) -> &Arc<ProblemRegistry> {
        &self.registry
    }

    fn resolve(&self, info: &ProblemRunInfo) -> Result<Plan, RunError> {
        let problem = self
            .registry
            .get(info.problem_id)
            .ok_or(RunError::NoSuchProblem(info.problem_id))?;

        let methods = if info.is_all_methods() {
            problem
                .method_names()
                .into_iter()
                .filter_map(|name| problem.solution(name).map(|s| (name.to_string(), Arc::clone(s))))
                .collect()
        } else {
            let solution = problem
                .solution(&info.method)
                .ok_or_else(|| RunError::NoSuchSolution {
                    problem: info.problem_id,
                    method: info.method.clone(),
                })?;
            vec![(info.method.clone(), Arc::clone(solution))]
        };

        Ok(Plan {
            problem_id: problem.id(),
            methods,
        })
    }

    /// Run inline on the calling thread, without any deadline
    pub fn run_problem(&self, info: &ProblemRunInfo) -> Result<RunResult, RunError> {
        let plan = self.resolve(info)?;
        let mut result = RunResult::new();
        for (name, solution) in &plan.methods {
            result.push(run_method(plan.problem_id, name, solution)?);
        }
        Ok(result)
    }

    /// Run on a background thread and race it against the applicable limit.
    ///
    /// Lookup errors are returned before any thread is started.
    pub fn run_problem_with_timeout(
        &self,
        info: &ProblemRunInfo,
        limits: TimeoutLimits,
    ) -> Result<RunResult, RunError> {
        let plan = self.resolve(info)?;
        let timeout = limits.for_info(info);
        let start = Instant::now();

        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(plan.timed_out(RunResult::new(), 0, Duration::ZERO));
        }

        let (tx, rx) = mpsc::channel();
        let problem_id = plan.problem_id;
        let methods = plan.methods.clone();
        thread::Builder::new()
            .name(format!("timebox-run-{}", problem_id))
            .spawn(move || {
                for (name, solution) in &methods {
                    let outcome = run_method(problem_id, name, solution);
                    let stop = outcome.is_err();
                    // Receiver gone means the caller stopped waiting
                    if tx.send(outcome).is_err() || stop {
                        break;
                    }
                }
            })
            .map_err(RunError::Spawn)?;

        let deadline = timeout.map(|t| start + t);
        let mut result = RunResult::new();

        while result.len() < plan.methods.len() {
            let received = match deadline {
                Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Ok(item)) => result.push(item),
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {
                    let elapsed = start.elapsed();
                    debug!(problem = problem_id, ?elapsed, finished = result.len(), "deadline reached");
                    let finished = result.len();
                    return Err(plan.timed_out(result, finished, elapsed));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let method = plan.methods[result.len()].0.clone();
                    warn!(problem = problem_id, %method, "runner thread exited without a result");
                    return Err(RunError::MethodPanicked {
                        problem: problem_id,
                        method,
                        message: "runner thread exited without a result".to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Run each selector in order under a shared total deadline.
    ///
    /// Each request gets the smaller of its own limit and the remaining total
    /// budget. Stops at the first error.
    pub fn run_many(
        &self,
        infos: &[ProblemRunInfo],
        total_timeout: Option<Duration>,
    ) -> Result<Vec<RunResult>, RunError> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(infos.len());

        for info in infos {
            let limits = match total_timeout {
                Some(total) => self.limits.capped(total.saturating_sub(start.elapsed())),
                None => self.limits,
            };
            results.push(self.run_problem_with_timeout(info, limits)?);
        }

        Ok(results)
    }

    /// Every registered problem, all methods, in registration order
    pub fn run_all(&self, total_timeout: Option<Duration>) -> Result<Vec<RunResult>, RunError> {
        let infos: Vec<ProblemRunInfo> = self
            .registry
            .iter()
            .map(|problem| ProblemRunInfo::all_methods(problem.id()))
            .collect();
        self.run_many(&infos, total_timeout)
    }
}

fn run_method(problem_id: u32, method: &str, solution: &Solution) -> Result<ResultItem, RunError> {
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| solution()));
    let duration = start.elapsed();

    match outcome {
        Ok(value) => Ok(ResultItem::finished(problem_id, method, value, duration)),
        Err(payload) => Err(RunError::MethodPanicked {
            problem: problem_id,
            method: method.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Problem;

    fn sleeper(ms: u64, value: i64) -> impl Fn() -> i64 + Send + Sync + 'static {
        move || {
            thread::sleep(Duration::from_millis(ms));
            value
        }
    }

    fn runner() -> Runner {
        let problems = vec![
            Problem::new(1, "quick").answer(3).method("a", || 3).method("b", || 3),
            Problem::new(2, "slow").method("sleep", sleeper(500, 2)),
            Problem::new(3, "mixed")
                .method("a_fast", || 30)
                .method("b_slow", sleeper(500, 31))
                .method("c_never", || 32),
            Problem::new(4, "broken").method("boom", || panic!("exploded")),
        ];
        Runner::new(Arc::new(ProblemRegistry::import(problems).unwrap()))
    }

    fn ms(n: u64) -> Option<Duration> {
        Some(Duration::from_millis(n))
    }

    #[test]
    fn test_run_all_methods() {
        let result = runner().run_problem(&ProblemRunInfo::all_methods(1)).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.items.iter().all(|i| i.is_finished && i.result == 3));
        assert_eq!(result.items[0].method, "a");
    }

    #[test]
    fn test_internal_errors() {
        assert!(!RunError::NoSuchProblem(9).is_internal());
        let panicked = runner().run_problem(&ProblemRunInfo::new(4, "boom")).unwrap_err();
        assert!(panicked.is_internal());
    }

    #[test]
    fn test_run_named_method() {
        let result = runner().run_problem(&ProblemRunInfo::new(1, "b")).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.items[0].method, "b");
    }

    #[test]
    fn test_lookup_errors() {
        let runner = runner();
        assert!(matches!(
            runner.run_problem(&ProblemRunInfo::all_methods(99)),
            Err(RunError::NoSuchProblem(99))
        ));
        assert!(matches!(
            runner.run_problem_with_timeout(&ProblemRunInfo::new(1, "zzz"), TimeoutLimits::default()),
            Err(RunError::NoSuchSolution { problem: 1, .. })
        ));
    }

    #[test]
    fn test_timeout_returns_promptly() {
        let runner = runner();
        let start = Instant::now();
        let err = runner
            .run_problem_with_timeout(&ProblemRunInfo::new(2, "sleep"), TimeoutLimits::new(None, ms(50)))
            .unwrap_err();
        let waited = start.elapsed();

        assert!(waited >= Duration::from_millis(50), "{waited:?}");
        assert!(waited < Duration::from_millis(250), "{waited:?}");
        match err {
            RunError::Timeout { partial, .. } => {
                assert_eq!(partial.len(), 1);
                assert!(partial.items[0].is_timeout);
                assert_eq!(partial.items[0].method, "sleep");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_finishes_within_limit() {
        let result = runner()
            .run_problem_with_timeout(&ProblemRunInfo::new(1, "a"), TimeoutLimits::new(None, ms(1000)))
            .unwrap();
        assert_eq!(result.items[0].result, 3);
    }

    #[test]
    fn test_all_methods_keeps_partial_results() {
        let err = runner()
            .run_problem_with_timeout(&ProblemRunInfo::all_methods(3), TimeoutLimits::new(ms(100), ms(5000)))
            .unwrap_err();

        let RunError::Timeout { partial, .. } = err else {
            panic!("expected timeout");
        };
        let summary: Vec<(&str, bool)> =
            partial.items.iter().map(|i| (i.method.as_str(), i.is_timeout)).collect();
        assert_eq!(
            summary,
            vec![("a_fast", false), ("b_slow", true), ("c_never", true)]
        );
        assert_eq!(partial.items[0].result, 30);
    }

    #[test]
    fn test_panic_is_reported() {
        let runner = runner();
        let info = ProblemRunInfo::new(4, "boom");
        for outcome in [
            runner.run_problem(&info),
            runner.run_problem_with_timeout(&info, TimeoutLimits::new(None, ms(1000))),
        ] {
            match outcome {
                Err(RunError::MethodPanicked { method, message, .. }) => {
                    assert_eq!(method, "boom");
                    assert_eq!(message, "exploded");
                }
                other => panic!("expected panic report, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_run_many_shares_total_budget() {
        let runner = runner();
        let infos = vec![ProblemRunInfo::all_methods(1), ProblemRunInfo::new(2, "sleep")];

        let start = Instant::now();
        let err = runner.run_many(&infos, ms(100)).unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(400));
        assert!(matches!(err, RunError::Timeout { problem: 2, .. }));

        let results = runner.run_many(&infos[..1], None).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_run_all_stops_at_first_error() {
        let registry = ProblemRegistry::import(vec![
            Problem::new(5, "five").method("x", || 5),
            Problem::new(6, "six").method("y", || 6),
        ])
        .unwrap();
        let results = Runner::new(Arc::new(registry)).run_all(None).unwrap();
        let values: Vec<i64> = results.iter().map(|r| r.items[0].result).collect();
        assert_eq!(values, vec![5, 6]);

        assert!(runner().run_all(ms(1000)).is_err());
    }

    #[test]
    fn test_limits_capped() {
        let limits = TimeoutLimits::new(None, ms(500)).capped(Duration::from_millis(200));
        assert_eq!(limits, TimeoutLimits::new(ms(200), ms(200)));
    }
}

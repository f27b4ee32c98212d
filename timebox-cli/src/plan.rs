//! Execution Planner
//!
//! Turns the selectors given on the command line into per-problem method
//! lists, in registration order.

use std::collections::HashMap;
use timebox_core::{ProblemRegistry, ProblemRunInfo};

/// Methods to run for one registered problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub problem_id: u32,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub entries: Vec<PlanEntry>,
    /// Requested ids with no registered problem, in request order
    pub unknown: Vec<u32>,
}

impl ExecutionPlan {
    pub fn method_count(&self) -> usize {
        self.entries.iter().map(|e| e.methods.len()).sum()
    }
}

/// Build the execution plan; no selectors means every registered problem
pub fn build_plan(registry: &ProblemRegistry, infos: &[ProblemRunInfo]) -> ExecutionPlan {
    let mut requested: HashMap<u32, Vec<&str>> = HashMap::new();
    let mut unknown = Vec::new();

    for info in infos {
        if !registry.contains(info.problem_id) {
            if !unknown.contains(&info.problem_id) {
                unknown.push(info.problem_id);
            }
            continue;
        }
        requested
            .entry(info.problem_id)
            .or_default()
            .push(info.method.as_str());
    }

    let entries = registry
        .iter()
        .filter_map(|problem| {
            let methods = if infos.is_empty() {
                all_methods(problem.method_names())
            } else {
                let selected = requested.get(&problem.id())?;
                if selected.iter().any(|m| m.is_empty()) {
                    all_methods(problem.method_names())
                } else {
                    dedup(selected)
                }
            };
            Some(PlanEntry {
                problem_id: problem.id(),
                methods,
            })
        })
        .collect();

    ExecutionPlan { entries, unknown }
}

fn all_methods(names: Vec<&str>) -> Vec<String> {
    names.into_iter().map(str::to_string).collect()
}

fn dedup(selected: &[&str]) -> Vec<String> {
    let mut methods: Vec<String> = Vec::with_capacity(selected.len());
    for method in selected {
        if !methods.iter().any(|m| m == method) {
            methods.push(method.to_string());
        }
    }
    methods
}

//! Problem Registry
//!
//! Immutable id → problem mapping that also remembers registration order.
//! Built once at startup; every problem is validated on import.

use crate::problem::Problem;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("problem '{title}' has invalid id 0")]
    InvalidProblemId { title: String },

    #[error("problem {0} registered twice")]
    DuplicateProblem(u32),

    #[error("empty method name in problem {problem}")]
    EmptyMethodName { problem: u32 },

    #[error("method name must not contain whitespace, found in problem {problem}, method '{method}'")]
    InvalidMethodName { problem: u32, method: String },

    #[error("method '{method}' registered twice in problem {problem}")]
    DuplicateMethod { problem: u32, method: String },
}

#[derive(Debug, Default)]
pub struct ProblemRegistry {
    problems: Vec<Problem>,
    index: HashMap<u32, usize>,
}

impl ProblemRegistry {
    /// Validate and index `problems`, keeping their order
    pub fn import(problems: Vec<Problem>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(problems.len());

        for (position, problem) in problems.iter().enumerate() {
            validate(problem)?;
            if index.insert(problem.id(), position).is_some() {
                return Err(RegistryError::DuplicateProblem(problem.id()));
            }
        }

        Ok(Self { problems, index })
    }

    pub fn get(&self, id: u32) -> Option<&Problem> {
        self.index.get(&id).map(|&position| &self.problems[position])
    }

    pub fn contains(&self, id: u32) -> bool {
        self.index.contains_key(&id)
    }

    /// Problems in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

fn validate(problem: &Problem) -> Result<(), RegistryError> {
    if problem.id() == 0 {
        return Err(RegistryError::InvalidProblemId {
            title: problem.title().to_string(),
        });
    }

    let mut seen = HashSet::new();
    for (name, _) in problem.method_entries() {
        if name.is_empty() {
            return Err(RegistryError::EmptyMethodName {
                problem: problem.id(),
            });
        }
        if name.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidMethodName {
                problem: problem.id(),
                method: name.to_string(),
            });
        }
        if !seen.insert(name) {
            return Err(RegistryError::DuplicateMethod {
                problem: problem.id(),
                method: name.to_string(),
            });
        }
    }
    Ok(())
}

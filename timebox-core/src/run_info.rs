//! Run Selectors
//!
//! `id[.method]` selectors as typed on the command line. Everything after the
//! first `.` is the method name, so `23.with.dots` selects method `with.dots`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRunInfoError {
    #[error("invalid problem id: '{0}'")]
    InvalidId(String),
}

/// Which problem, and which of its methods, to run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProblemRunInfo {
    pub problem_id: u32,
    /// Empty selects every method
    pub method: String,
}

impl ProblemRunInfo {
    pub fn new(problem_id: u32, method: impl Into<String>) -> Self {
        Self {
            problem_id,
            method: method.into(),
        }
    }

    pub fn all_methods(problem_id: u32) -> Self {
        Self::new(problem_id, "")
    }

    pub fn is_all_methods(&self) -> bool {
        self.method.is_empty()
    }

    pub fn parse(selector: &str) -> Result<Self, ParseRunInfoError> {
        let (id, method) = selector.split_once('.').unwrap_or((selector, ""));
        match id.trim().parse::<u32>() {
            Ok(problem_id) if problem_id > 0 => Ok(Self::new(problem_id, method)),
            _ => Err(ParseRunInfoError::InvalidId(selector.to_string())),
        }
    }

    /// Parse every selector, failing on the first invalid one
    pub fn parse_list<S: AsRef<str>>(selectors: &[S]) -> Result<Vec<Self>, ParseRunInfoError> {
        selectors.iter().map(|s| Self::parse(s.as_ref())).collect()
    }
}

impl FromStr for ProblemRunInfo {
    type Err = ParseRunInfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProblemRunInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all_methods() {
            write!(f, "{}", self.problem_id)
        } else {
            write!(f, "{}.{}", self.problem_id, self.method)
        }
    }
}

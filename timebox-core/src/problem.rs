//! Problem Definitions
//!
//! A problem is a numbered puzzle with a title, a few lines of description,
//! an optional known answer and one or more named solution methods.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Zero-argument computation producing a signed 64-bit answer
pub type Solution = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Expected answer of a problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    Known(i64),
    Unknown,
}

impl Answer {
    pub fn known(self) -> Option<i64> {
        match self {
            Answer::Known(value) => Some(value),
            Answer::Unknown => None,
        }
    }

    /// True only when the answer is known and equals `value`
    pub fn matches(self, value: i64) -> bool {
        self.known() == Some(value)
    }
}

#[derive(Clone)]
pub struct Problem {
    id: u32,
    title: String,
    description: Vec<String>,
    answer: Answer,
    methods: Vec<(String, Solution)>,
}

impl Problem {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: Vec::new(),
            answer: Answer::Unknown,
            methods: Vec::new(),
        }
    }

    /// Append one description line
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.description.push(line.into());
        self
    }

    pub fn answer(mut self, answer: i64) -> Self {
        self.answer = Answer::Known(answer);
        self
    }

    /// Register a solution method under `name`
    pub fn method<F>(mut self, name: impl Into<String>, solution: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.methods.push((name.into(), Arc::new(solution)));
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn expected(&self) -> Answer {
        self.answer
    }

    pub fn description(&self) -> String {
        self.description.join("\n")
    }

    /// Method names in sorted order
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.iter().map(|(name, _)| name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn solution(&self, method: &str) -> Option<&Solution> {
        self.methods
            .iter()
            .find(|(name, _)| name == method)
            .map(|(_, solution)| solution)
    }

    pub(crate) fn method_entries(&self) -> impl Iterator<Item = (&str, &Solution)> {
        self.methods.iter().map(|(name, solution)| (name.as_str(), solution))
    }
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("answer", &self.answer)
            .field("methods", &self.method_names())
            .finish()
    }
}

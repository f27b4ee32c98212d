//! Run Results
//!
//! In-memory counterpart of the wire `ResultMessage`: an ordered list of
//! per-method outcomes plus a diagnostic message.

use crate::problem::Answer;
use serde::{Serialize, Serializer};
use std::time::Duration;
use timebox_ipc::{duration_nanos, ResultFlags, ResultMessage};

/// Outcome of one method run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultItem {
    pub problem_id: u32,
    pub method: String,
    pub result: i64,
    #[serde(rename = "duration_ns", serialize_with = "serialize_nanos")]
    pub duration: Duration,
    pub is_timeout: bool,
    pub is_finished: bool,
    pub has_error: bool,
}

impl ResultItem {
    pub fn finished(problem_id: u32, method: impl Into<String>, result: i64, duration: Duration) -> Self {
        Self {
            problem_id,
            method: method.into(),
            result,
            duration,
            is_timeout: false,
            is_finished: true,
            has_error: false,
        }
    }

    pub fn timeout(problem_id: u32, method: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            problem_id,
            method: method.into(),
            result: 0,
            duration: elapsed,
            is_timeout: true,
            is_finished: false,
            has_error: false,
        }
    }

    pub fn error(problem_id: u32, method: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            problem_id,
            method: method.into(),
            result: 0,
            duration: elapsed,
            is_timeout: false,
            is_finished: false,
            has_error: true,
        }
    }

    pub fn flags(&self) -> ResultFlags {
        let mut flags = ResultFlags::empty();
        flags.set(ResultFlags::FINISHED, self.is_finished);
        flags.set(ResultFlags::TIMEOUT, self.is_timeout);
        flags.set(ResultFlags::ERROR, self.has_error);
        flags
    }

    /// Finished cleanly with a usable value
    pub fn is_usable(&self) -> bool {
        !self.is_timeout && !self.has_error
    }
}

impl From<&ResultItem> for timebox_ipc::ResultItem {
    fn from(item: &ResultItem) -> Self {
        timebox_ipc::ResultItem {
            flags: item.flags(),
            problem_id: item.problem_id,
            method: item.method.clone(),
            result: item.result,
            duration_ns: duration_nanos(item.duration),
        }
    }
}

impl From<timebox_ipc::ResultItem> for ResultItem {
    fn from(item: timebox_ipc::ResultItem) -> Self {
        Self {
            problem_id: item.problem_id,
            duration: item.duration(),
            result: item.result,
            is_timeout: item.flags.contains(ResultFlags::TIMEOUT),
            is_finished: item.flags.contains(ResultFlags::FINISHED),
            has_error: item.flags.contains(ResultFlags::ERROR),
            method: item.method,
        }
    }
}

/// Ordered method outcomes for one or more problems
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub items: Vec<ResultItem>,
    pub message: String,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: ResultItem) {
        self.items.push(item);
    }

    pub fn push_timeout(&mut self, problem_id: u32, method: impl Into<String>, elapsed: Duration) {
        self.push(ResultItem::timeout(problem_id, method, elapsed));
    }

    /// Move every item of `other` to the end, keeping order
    pub fn append(&mut self, other: RunResult) {
        self.items.extend(other.items);
        if self.message.is_empty() {
            self.message = other.message;
        } else if !other.message.is_empty() {
            self.message.push_str("; ");
            self.message.push_str(&other.message);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_timeout(&self) -> bool {
        self.items.iter().any(|item| item.is_timeout)
    }

    pub fn has_error(&self) -> bool {
        self.items.iter().any(|item| item.has_error)
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(|item| item.duration).sum()
    }

    /// Index of the fastest usable item; with a known answer it must also match
    pub fn find_best(&self, answer: Answer) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_usable())
            .filter(|(_, item)| answer.known().map_or(true, |expected| item.result == expected))
            .min_by_key(|(_, item)| item.duration)
            .map(|(index, _)| index)
    }

    /// At least one item finished, and every non-timeout item matches a
    /// known answer
    pub fn is_correct(&self, answer: Answer) -> bool {
        let Some(expected) = answer.known() else {
            return false;
        };
        let mut finished = false;
        for item in self.items.iter().filter(|item| !item.is_timeout) {
            if item.has_error || item.result != expected {
                return false;
            }
            finished = true;
        }
        finished
    }

    pub fn to_message(&self) -> ResultMessage {
        ResultMessage {
            items: self.items.iter().map(Into::into).collect(),
            message: self.message.clone(),
        }
    }
}

impl From<ResultMessage> for RunResult {
    fn from(message: ResultMessage) -> Self {
        Self {
            items: message.items.into_iter().map(Into::into).collect(),
            message: message.message,
        }
    }
}

fn serialize_nanos<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(duration_nanos(*duration))
}

//! Outcome Reporting
//!
//! Plain-text and JSON rendering of per-problem outcomes.

use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use timebox_core::{Answer, Problem, ResultItem, RunResult};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "human" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Everything learned about one problem during a batch
#[derive(Debug, Clone, Serialize)]
pub struct ProblemOutcome {
    pub problem_id: u32,
    pub title: String,
    pub answer: Answer,
    pub result: RunResult,
}

impl ProblemOutcome {
    pub fn new(problem: &Problem, result: RunResult) -> Self {
        Self {
            problem_id: problem.id(),
            title: problem.title().to_string(),
            answer: problem.expected(),
            result,
        }
    }

    /// Outcome for a requested id that has no registered problem
    pub fn missing(problem_id: u32, message: String) -> Self {
        Self {
            problem_id,
            title: String::new(),
            answer: Answer::Unknown,
            result: RunResult {
                items: Vec::new(),
                message,
            },
        }
    }

    pub fn has_timeout(&self) -> bool {
        self.result.has_timeout()
    }

    pub fn is_correct(&self) -> bool {
        self.result.is_correct(self.answer)
    }

    /// Human-readable lines: a single line for one method, otherwise a
    /// header with total time followed by one line per method
    pub fn summary_lines(&self) -> Vec<String> {
        let title = pad_dots(&self.title, 40);

        if self.result.is_empty() {
            return vec![format!("{:<5} {} {}", self.problem_id, title, self.result.message)];
        }

        if self.result.len() == 1 {
            let item = &self.result.items[0];
            return vec![format!("{:<5} {} {}", self.problem_id, title, self.item_columns(item, false))];
        }

        let mut lines = vec![format!(
            "{:<5} {} {:>15} {} {}",
            self.problem_id,
            title,
            "",
            self.verdict(),
            format_ms(self.result.total_duration())
        )];
        let best = self.result.find_best(self.answer);
        for (index, item) in self.result.items.iter().enumerate() {
            lines.push(format!(
                "      + {} {}",
                pad_dots(&item.method, 38),
                self.item_columns(item, best == Some(index))
            ));
        }
        lines
    }

    fn verdict(&self) -> &'static str {
        let finished = self.result.items.iter().any(|item| !item.is_timeout);
        match self.answer {
            _ if !finished && self.has_timeout() => "timeout",
            Answer::Unknown => "unknown",
            _ if self.is_correct() => "correct",
            _ => "wrong",
        }
    }

    fn item_columns(&self, item: &ResultItem, best: bool) -> String {
        let value = if item.is_timeout {
            format!("{:<15}", "NO RESULT")
        } else if item.has_error {
            format!("{:<15}", "ERROR")
        } else {
            format!("{:<15}", item.result)
        };

        let check = if item.is_timeout {
            "timeout"
        } else if item.has_error {
            "error"
        } else {
            match self.answer {
                Answer::Unknown => "unknown",
                answer if answer.matches(item.result) => "correct",
                _ => "wrong",
            }
        };

        let mut columns = format!("{} {:<10} {}", value, check, format_ms(item.duration));
        if best {
            columns.push_str(" *BEST");
        }
        columns
    }
}

fn pad_dots(text: &str, width: usize) -> String {
    format!("{:.<width$}", text, width = width)
}

fn format_ms(duration: Duration) -> String {
    format!("{:10.3}ms", duration.as_secs_f64() * 1000.0)
}

pub fn format_text(outcomes: &[ProblemOutcome]) -> String {
    let mut output = String::new();
    for outcome in outcomes {
        for line in outcome.summary_lines() {
            output.push_str(&line);
            output.push('\n');
        }
    }
    output
}

pub fn generate_json_report(outcomes: &[ProblemOutcome]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(outcomes)
}

//! Per-operand results and their aggregation over a line.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The operand that failed, when the reason does not already name it.
    pub operand: Option<String>,
    pub reason: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(operand) => write!(f, "{operand}: {}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Succeeded,
    Partial,
    Failed,
}

/// What one subcommand did to each of its operands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub succeeded: Vec<String>,
    pub failures: Vec<Failure>,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subcommand that failed as a whole.
    pub fn aborted(reason: impl fmt::Display) -> Self {
        let mut outcome = Self::new();
        outcome.error(reason);
        outcome
    }

    pub fn success(&mut self, operand: impl Into<String>) {
        self.succeeded.push(operand.into());
    }

    pub fn fail(&mut self, operand: impl Into<String>, reason: impl fmt::Display) {
        self.failures.push(Failure {
            operand: Some(operand.into()),
            reason: reason.to_string(),
        });
    }

    /// Record an error whose message already names what failed.
    pub fn error(&mut self, reason: impl fmt::Display) {
        self.failures.push(Failure {
            operand: None,
            reason: reason.to_string(),
        });
    }

    pub fn status(&self) -> Status {
        if self.failures.is_empty() {
            Status::Succeeded
        } else if self.succeeded.is_empty() {
            Status::Failed
        } else {
            Status::Partial
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub command: String,
    pub outcome: Outcome,
}

/// Outcomes of every subcommand on one line, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineReport {
    pub commands: Vec<CommandReport>,
}

impl LineReport {
    pub fn push(&mut self, command: impl Into<String>, outcome: Outcome) {
        self.commands.push(CommandReport {
            command: command.into(),
            outcome,
        });
    }

    pub fn status(&self) -> Status {
        let failed = self
            .commands
            .iter()
            .filter(|c| c.outcome.status() != Status::Succeeded)
            .count();
        let all_failed = self
            .commands
            .iter()
            .all(|c| c.outcome.status() == Status::Failed);
        if failed == 0 {
            Status::Succeeded
        } else if all_failed {
            Status::Failed
        } else {
            Status::Partial
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.status() == Status::Succeeded
    }

    /// One `command: reason` line per failure.
    pub fn failure_lines(&self) -> Vec<String> {
        self.commands
            .iter()
            .flat_map(|c| {
                c.outcome
                    .failures
                    .iter()
                    .map(move |f| format!("{}: {f}", c.command))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status() {
        let mut outcome = Outcome::new();
        assert_eq!(outcome.status(), Status::Succeeded);
        outcome.success("/a");
        outcome.fail("/b", "No such file or directory");
        assert_eq!(outcome.status(), Status::Partial);
        assert_eq!(Outcome::aborted("bad flag").status(), Status::Failed);
    }

    #[test]
    fn test_line_report() {
        let mut report = LineReport::default();
        report.push("ls", Outcome::new());
        report.push("rm", Outcome::aborted("/x: Directory not empty"));
        assert_eq!(report.status(), Status::Partial);
        assert_eq!(report.failure_lines(), vec!["rm: /x: Directory not empty"]);

        let mut failed = LineReport::default();
        failed.push("cd", Outcome::aborted("nope"));
        assert_eq!(failed.status(), Status::Failed);
        assert!(LineReport::default().all_succeeded());
    }
}

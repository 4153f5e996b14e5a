//! Operator-facing problem reporting.
//!
//! The engine never shows errors to chat users. Problems that an operator
//! should see (member lookup failures, editability checks that keep failing,
//! activation messages that could not be blanked) go through a
//! [`ProblemReporter`]. The default implementation logs them.

/// Sink for operator-visible problem descriptions.
pub trait ProblemReporter: Send + Sync {
    /// Report a problem. Must not block for long or panic.
    fn report(&self, problem: &str);
}

/// Reports problems as `warn`-level tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProblemReporter for TracingReporter {
    fn report(&self, problem: &str) {
        tracing::warn!(problem, "problem reported");
    }
}

/// Collects reported problems in memory.
///
/// Useful for embedding applications that poll for problems, and in tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    problems: parking_lot::Mutex<Vec<String>>,
}

impl CollectingReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears the collected problems, oldest first.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.problems.lock())
    }

    /// Number of problems collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.problems.lock().len()
    }

    /// Returns `true` if nothing has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.problems.lock().is_empty()
    }
}

impl ProblemReporter for CollectingReporter {
    fn report(&self, problem: &str) {
        self.problems.lock().push(problem.to_string());
    }
}

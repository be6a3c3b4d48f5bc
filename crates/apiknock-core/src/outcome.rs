//! Outcomes, the append-only result set, and the final verdict

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How one (operation, identity) knock ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// The response satisfied the expected check
    Success,
    /// The response violated the expected check: an authorization finding
    Failed,
    /// The knock could not be evaluated (missing matrix entry, credential or
    /// usable check)
    Error,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One classified result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Outcome {
    pub classification: Classification,
    /// Path template, e.g. "/items/{id}"
    pub path: String,
    /// Lowercase HTTP verb
    pub method: String,
    /// Identity name; absent for errors that concern the whole operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub message: String,
}

impl Outcome {
    #[must_use]
    pub fn success(path: &str, method: &str, identity: &str, message: impl Into<String>) -> Self {
        Self::new(Classification::Success, path, method, Some(identity), message)
    }

    #[must_use]
    pub fn failed(path: &str, method: &str, identity: &str, message: impl Into<String>) -> Self {
        Self::new(Classification::Failed, path, method, Some(identity), message)
    }

    #[must_use]
    pub fn error(
        path: &str,
        method: &str,
        identity: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Classification::Error, path, method, identity, message)
    }

    fn new(
        classification: Classification,
        path: &str,
        method: &str,
        identity: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            classification,
            path: path.to_string(),
            method: method.to_string(),
            identity: identity.map(str::to_string),
            message: message.into(),
        }
    }

    /// Operation label, e.g. "GET /items/{id}"
    #[must_use]
    pub fn operation(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.path)
    }
}

/// Ordered outcome log plus the dispatch counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResultSet {
    /// Requests actually sent
    pub total_requests: u64,
    /// Outcomes in dispatch order
    pub outcomes: Vec<Outcome>,
}

/// Counters derived from a [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub total_requests: u64,
    pub success: usize,
    pub failed: usize,
    pub error: usize,
}

/// Result export: summary counters followed by every outcome.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KnockReport {
    pub summary: Summary,
    pub outcomes: Vec<Outcome>,
}

impl ResultSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn count_dispatch(&mut self) {
        self.total_requests += 1;
    }

    fn with(&self, classification: Classification) -> impl Iterator<Item = &Outcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.classification == classification)
    }

    pub fn successes(&self) -> impl Iterator<Item = &Outcome> {
        self.with(Classification::Success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.with(Classification::Failed)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Outcome> {
        self.with(Classification::Error)
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary {
            total_requests: self.total_requests,
            success: self.successes().count(),
            failed: self.failures().count(),
            error: self.errors().count(),
        }
    }

    #[must_use]
    pub fn report(&self) -> KnockReport {
        KnockReport {
            summary: self.summary(),
            outcomes: self.outcomes.clone(),
        }
    }

    /// PASS requires at least one outcome and every outcome a Success.
    ///
    /// Exit codes: 0 pass, 1 any authorization failure, 2 only
    /// configuration/structural errors.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        let summary = self.summary();

        if self.outcomes.is_empty() {
            return Verdict {
                status: VerdictStatus::Fail,
                exit_code: 2,
                reason: "No operations were tested".to_string(),
            };
        }

        if summary.failed == 0 && summary.error == 0 {
            return Verdict {
                status: VerdictStatus::Pass,
                exit_code: 0,
                reason: format!("All {} checks passed", summary.success),
            };
        }

        let mut parts = Vec::new();
        if summary.failed > 0 {
            parts.push(format!("{} authorization failures", summary.failed));
        }
        if summary.error > 0 {
            parts.push(format!("{} errors (configuration/structural)", summary.error));
        }

        Verdict {
            status: VerdictStatus::Fail,
            exit_code: if summary.failed > 0 { 1 } else { 2 },
            reason: parts.join("; "),
        }
    }
}

/// Final verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub exit_code: i32,
    pub reason: String,
}

/// Pass or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// JSON Schema of the result export.
///
/// # Errors
///
/// Returns error if the schema cannot be serialized.
pub fn generate_schema() -> serde_json::Result<String> {
    let schema = schemars::schema_for!(KnockReport);
    serde_json::to_string_pretty(&schema)
}

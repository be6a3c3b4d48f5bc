//! Response checks: `http_code` and `http_body`
//!
//! No I/O. A check either produces a pass/fail result with a message, or a
//! [`CheckError`] when its expected value is unusable. The latter is a
//! configuration problem, never a test failure.

use std::fmt;
use std::str::FromStr;

use regex::RegexBuilder;
use serde_json::Value;

use crate::matrix::CheckSpec;

/// Recognized check kinds. Adding one means adding a match arm in [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    /// `http_code`: response status equals the expected code
    StatusCode,
    /// `http_body`: expected regex matches somewhere in the body
    BodyPattern,
}

impl CheckKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusCode => "http_code",
            Self::BodyPattern => "http_body",
        }
    }
}

impl FromStr for CheckKind {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_code" => Ok(Self::StatusCode),
            "http_body" => Ok(Self::BodyPattern),
            other => Err(CheckError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A check with a recognized kind. The expected value is validated lazily,
/// at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub kind: CheckKind,
    pub expected: Value,
}

impl TryFrom<&CheckSpec> for Check {
    type Error = CheckError;

    fn try_from(spec: &CheckSpec) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: spec.0.parse()?,
            expected: spec.1.clone(),
        })
    }
}

/// The part of an HTTP response checks look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
}

/// Evaluate `check` against `response`.
///
/// # Errors
///
/// Returns [`CheckError`] if the expected value is not a status code in
/// `100..=599` (for `http_code`) or not a valid regular expression (for
/// `http_body`).
pub fn evaluate(check: &Check, response: &Response) -> Result<CheckResult, CheckError> {
    match check.kind {
        CheckKind::StatusCode => check_status_code(response, &check.expected),
        CheckKind::BodyPattern => check_body_pattern(response, &check.expected),
    }
}

fn check_status_code(response: &Response, expected: &Value) -> Result<CheckResult, CheckError> {
    let code = status_code(expected)?;
    tracing::debug!(expected = code, observed = response.status, "http_code check");
    Ok(CheckResult {
        passed: response.status == code,
        message: format!("EXPECTED {code} / IS {}", response.status),
    })
}

fn check_body_pattern(response: &Response, expected: &Value) -> Result<CheckResult, CheckError> {
    let Value::String(pattern) = expected else {
        return Err(CheckError::InvalidPattern {
            pattern: expected.to_string(),
            reason: "expected a string".to_string(),
        });
    };
    let regex = RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|e| CheckError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
    tracing::debug!(%pattern, "http_body check");
    Ok(CheckResult {
        passed: regex.is_match(&response.body),
        message: format!("Regular Expression: {pattern}"),
    })
}

/// Coerce a configured value to a status code. Integers, integral floats and
/// numeric strings are accepted.
fn status_code(expected: &Value) -> Result<u16, CheckError> {
    let invalid = || CheckError::InvalidStatusCode(expected.to_string());
    let raw: i64 = match expected {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i,
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e6 => f as i64,
            _ => return Err(invalid()),
        },
        Value::String(s) => s.trim().parse().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if (100..=599).contains(&raw) {
        u16::try_from(raw).map_err(|_| invalid())
    } else {
        Err(invalid())
    }
}

/// A check cannot be evaluated because of its configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("unknown check method \"{0}\" (expected \"http_code\" or \"http_body\")")]
    UnknownKind(String),
    #[error("{0} is not a valid HTTP status code (>= 100 and <= 599)")]
    InvalidStatusCode(String),
    #[error("could not parse {pattern} as a regular expression: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

//! Dry run plan and pre-flight validation
//!
//! Describes what a knock run *would* send without sending anything.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::RequestDescriptor;
use crate::check::Check;
use crate::identity::Identities;
use crate::matrix::{CheckSpec, KnockConfig, MatrixEntry, MatrixLookup, check_field};

// ── Plan types ──

/// Complete dry run plan: operations, dispatch counts, and validations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// Per-operation plan, in catalog order
    pub operations: Vec<OperationPlan>,
    /// Total requests that would be sent
    pub total_requests: u64,
    /// Config/credential validation results
    pub validations: Vec<Validation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationPlan {
    /// Operation label, e.g. "GET /items/{id}"
    pub operation: String,
    pub method: String,
    pub path: String,
    /// Declared parameter names as `location.name`
    pub parameters: Vec<String>,
    /// One entry per identity that would be dispatched
    pub dispatches: Vec<PlannedDispatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedDispatch {
    pub identity: String,
    /// Whether the identity is expected to be allowed
    pub allowed: bool,
    /// Check that would be applied, e.g. "http_code 403"
    pub check: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Validation {
    pub check: String,
    pub status: ValidationStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Patterns that suggest a placeholder value rather than a real credential.
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-token",
    "your_token",
    "YOUR_TOKEN",
    "your-api-key",
    "YOUR_API_KEY",
    "TODO",
    "CHANGEME",
    "changeme",
    "placeholder",
    "xxx",
    "XXX",
    "replace-me",
    "REPLACE_ME",
];

impl Validation {
    fn new(check: &str, status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status,
            message: message.into(),
        }
    }
}

impl Plan {
    /// Plan a knock run of `catalog` against `config` with `identities`.
    #[must_use]
    pub fn build(
        catalog: &[RequestDescriptor],
        config: &KnockConfig,
        identities: &Identities,
    ) -> Self {
        let mut validations = Vec::new();
        let mut operations = Vec::with_capacity(catalog.len());
        let mut total_requests = 0u64;

        if let Err(e) = config.validate() {
            validations.push(Validation::new("config", ValidationStatus::Error, e.to_string()));
        }

        for descriptor in catalog {
            let label = descriptor.label();
            let mut dispatches = Vec::new();

            match config.auth_matrix.lookup(&descriptor.path, &descriptor.method) {
                MatrixLookup::Found(entry) => {
                    if let Some(issue) = entry_issue(entry) {
                        validations.push(Validation::new(
                            "matrix",
                            ValidationStatus::Error,
                            format!("{label}: {issue}"),
                        ));
                    } else {
                        for (identity, allowed) in entry.permissions().unwrap_or_default() {
                            if identities.get(identity).is_none() {
                                validations.push(Validation::new(
                                    "credentials",
                                    ValidationStatus::Error,
                                    format!("{label}: no credential for {identity}"),
                                ));
                                continue;
                            }
                            dispatches.push(PlannedDispatch {
                                identity: identity.to_string(),
                                allowed,
                                check: entry
                                    .check_spec(allowed)
                                    .map(|spec| describe(&spec))
                                    .unwrap_or_default(),
                            });
                        }
                    }
                }
                MatrixLookup::MissingPath | MatrixLookup::MissingMethod => {
                    validations.push(Validation::new(
                        "matrix",
                        ValidationStatus::Error,
                        format!("{label}: no authorization matrix entry"),
                    ));
                }
            }

            total_requests += dispatches.len() as u64;
            operations.push(OperationPlan {
                operation: label,
                method: descriptor.method.clone(),
                path: descriptor.path.clone(),
                parameters: parameter_names(descriptor),
                dispatches,
            });
        }

        for (path, method) in config.auth_matrix.operations() {
            let known = catalog
                .iter()
                .any(|d| d.path == path && d.method.eq_ignore_ascii_case(method));
            if !known {
                validations.push(Validation::new(
                    "matrix",
                    ValidationStatus::Warning,
                    format!("{} {path}: not an operation of the API description", method.to_uppercase()),
                ));
            }
        }

        validations.extend(validate_credentials(identities));

        Self {
            operations,
            total_requests,
            validations,
        }
    }

    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Dry run: {} operations, {} requests planned\n",
            self.operations.len(),
            self.total_requests,
        ));

        for op in &self.operations {
            lines.push(format!("{} ({} requests):", op.operation, op.dispatches.len()));
            if !op.parameters.is_empty() {
                lines.push(format!("  Parameters: {}", op.parameters.join(", ")));
            }
            for d in &op.dispatches {
                let expect = if d.allowed { "allow" } else { "deny" };
                lines.push(format!("  {} [{expect}] {}", d.identity, d.check));
            }
            lines.push(String::new());
        }

        lines.push("Validation:".into());
        for v in &self.validations {
            lines.push(format!("  [{}] {}", v.status, v.message));
        }

        lines.join("\n")
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Error)
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Warning)
    }
}

/// Why an entry cannot be evaluated, if it cannot.
fn entry_issue(entry: &MatrixEntry) -> Option<String> {
    if let Err(e) = entry.permissions() {
        return Some(e.to_string());
    }
    for allowed in [true, false] {
        let checked = entry
            .check_spec(allowed)
            .map_err(|e| e.to_string())
            .and_then(|spec| {
                Check::try_from(&spec)
                    .map_err(|e| format!("\"{}\": {e}", check_field(allowed)))
            });
        if let Err(issue) = checked {
            return Some(issue);
        }
    }
    None
}

fn describe(spec: &CheckSpec) -> String {
    format!("{} {}", spec.0, spec.1)
}

fn parameter_names(descriptor: &RequestDescriptor) -> Vec<String> {
    let p = &descriptor.parameters;
    [("path", &p.path), ("query", &p.query), ("header", &p.header), ("cookie", &p.cookie)]
        .into_iter()
        .flat_map(|(loc, group)| group.keys().map(move |name| format!("{loc}.{name}")))
        .collect()
}

fn validate_credentials(identities: &Identities) -> Vec<Validation> {
    if identities.is_empty() {
        return vec![Validation::new(
            "credentials",
            ValidationStatus::Error,
            "credentials: none supplied",
        )];
    }

    let mut checks = Vec::new();
    for name in identities.names() {
        let Some(credential) = identities.get(name) else {
            continue;
        };
        let secret = credential.expose();
        if secret.contains('<') && secret.contains('>') {
            checks.push(Validation::new(
                "credentials",
                ValidationStatus::Warning,
                format!("{name}: contains '<...>' placeholder"),
            ));
        } else if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| secret.contains(*p)) {
            checks.push(Validation::new(
                "credentials",
                ValidationStatus::Warning,
                format!("{name}: contains '{pattern}', may be a placeholder"),
            ));
        }
    }

    if checks.is_empty() {
        checks.push(Validation::new(
            "credentials",
            ValidationStatus::Ok,
            format!("credentials: {} supplied", identities.len()),
        ));
    }
    checks
}

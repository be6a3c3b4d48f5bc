//! Authorization matrix test engine
//!
//! Catalog order × identity order is the total order of dispatches and of the
//! outcome log. Only a transport failure stops a run.

use apiknock_core::catalog::param_string;
use apiknock_core::check::{self, Check};
use apiknock_core::matrix::check_field;
use apiknock_core::{
    AuthMatrix, Credential, EntryError, Identities, KnockConfig, MatrixEntry, MatrixLookup,
    Outcome, RequestDescriptor, ResultSet,
};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::requester::{AuthMode, OutboundRequest, Requester, TransportError};

/// Everything a run needs, passed explicitly.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub matrix: AuthMatrix,
    pub identities: Identities,
    pub auth: AuthMode,
    /// scheme + host + base path, no trailing slash needed
    pub base_url: String,
    /// Fixed values for parameters of the same name
    pub parameter_override: IndexMap<String, Value>,
}

impl RunConfig {
    #[must_use]
    pub fn from_config(
        config: &KnockConfig,
        identities: Identities,
        auth: AuthMode,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            matrix: config.auth_matrix.clone(),
            identities,
            auth,
            base_url: base_url.into(),
            parameter_override: config.parameter_override.clone(),
        }
    }
}

pub struct TestEngine {
    config: RunConfig,
}

impl TestEngine {
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Knock on every descriptor with every identity its matrix entry names.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] as soon as the target cannot be reached;
    /// every other problem becomes an Error outcome.
    pub fn run<R: Requester + ?Sized>(
        &self,
        catalog: &[RequestDescriptor],
        requester: &mut R,
    ) -> Result<ResultSet, TransportError> {
        tracing::info!(
            operations = catalog.len(),
            identities = self.config.identities.len(),
            auth = %self.config.auth,
            "knocking"
        );
        let mut results = ResultSet::new();

        for descriptor in catalog {
            let path = descriptor.path.as_str();
            let method = descriptor.method.as_str();

            let entry = match self.config.matrix.lookup(path, method) {
                MatrixLookup::Found(entry) => entry,
                MatrixLookup::MissingPath => {
                    structural(&mut results, descriptor, "path not found in authorization matrix");
                    continue;
                }
                MatrixLookup::MissingMethod => {
                    structural(&mut results, descriptor, "method not found in authorization matrix");
                    continue;
                }
            };

            let (permissions, success, blocked) = match entry_checks(entry) {
                Ok(checks) => checks,
                Err(reason) => {
                    structural(&mut results, descriptor, &reason);
                    continue;
                }
            };

            for (identity, allowed) in permissions {
                let Some(credential) = self.config.identities.get(identity) else {
                    let message = format!("no credential for {identity}");
                    tracing::warn!(operation = %descriptor.label(), %identity, "{message}");
                    results.record(Outcome::error(path, method, Some(identity), message));
                    continue;
                };

                let request = self.prepare(descriptor, credential);
                tracing::debug!(method = %request.method, url = %request.url, %identity, "dispatch");
                let response = requester.dispatch(&request).inspect_err(|e| {
                    tracing::error!(operation = %descriptor.label(), %identity, error = %e, "transport failure");
                })?;
                results.count_dispatch();

                let check = if allowed { &success } else { &blocked };
                let outcome = match check::evaluate(check, &response) {
                    Ok(result) if result.passed => {
                        Outcome::success(path, method, identity, result.message)
                    }
                    Ok(result) => Outcome::failed(path, method, identity, result.message),
                    Err(e) => Outcome::error(path, method, Some(identity), e.to_string()),
                };
                tracing::info!(
                    operation = %descriptor.label(),
                    %identity,
                    status = response.status,
                    outcome = %outcome.classification,
                    "{}",
                    outcome.message
                );
                results.record(outcome);
            }
        }

        Ok(results)
    }

    fn prepare(&self, descriptor: &RequestDescriptor, credential: &Credential) -> OutboundRequest {
        let mut request =
            build_request(&self.config.base_url, descriptor, &self.config.parameter_override);
        self.config.auth.apply(&mut request, credential);
        request
    }
}

/// Identities and both checks of an entry, or the reason the entry cannot be
/// evaluated.
fn entry_checks(entry: &MatrixEntry) -> Result<(Vec<(&str, bool)>, Check, Check), String> {
    let in_matrix = |e: EntryError| format!("{e} in authorization matrix");
    let permissions = entry.permissions().map_err(in_matrix)?;
    let parse = |allowed: bool| -> Result<Check, String> {
        let spec = entry.check_spec(allowed).map_err(in_matrix)?;
        Check::try_from(&spec).map_err(|e| format!("\"{}\": {e}", check_field(allowed)))
    };
    Ok((permissions, parse(true)?, parse(false)?))
}

fn structural(results: &mut ResultSet, descriptor: &RequestDescriptor, reason: &str) {
    tracing::warn!(operation = %descriptor.label(), "{reason}");
    results.record(Outcome::error(&descriptor.path, &descriptor.method, None, reason));
}

/// Turn a descriptor into an outbound request against `base_url`, with
/// `overrides` applied to a copy of its parameters.
#[must_use]
pub fn build_request(
    base_url: &str,
    descriptor: &RequestDescriptor,
    overrides: &IndexMap<String, Value>,
) -> OutboundRequest {
    let mut parameters = descriptor.parameters.clone();
    parameters.apply_overrides(overrides);

    let pairs = |group: &IndexMap<String, Value>| {
        group
            .iter()
            .map(|(k, v)| (k.clone(), param_string(v)))
            .collect::<Vec<_>>()
    };

    OutboundRequest {
        method: descriptor.method.to_ascii_uppercase(),
        url: join_url(base_url, &descriptor.expand_path(&parameters.path)),
        query: pairs(&parameters.query),
        headers: pairs(&parameters.header),
        cookies: pairs(&parameters.cookie),
        body: descriptor.body.clone(),
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Result of [`fire`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FireReport {
    pub total_requests: u64,
    pub responses: Vec<FiredRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FiredRequest {
    /// Operation label, e.g. "GET /items/{id}"
    pub operation: String,
    pub status: u16,
}

/// Send every descriptor once without judging the responses, optionally
/// authenticated with `credential`.
///
/// # Errors
///
/// Returns [`TransportError`] on the first transport failure.
pub fn fire<R: Requester + ?Sized>(
    catalog: &[RequestDescriptor],
    base_url: &str,
    overrides: &IndexMap<String, Value>,
    credential: Option<(&AuthMode, &Credential)>,
    requester: &mut R,
) -> Result<FireReport, TransportError> {
    let mut report = FireReport::default();
    for descriptor in catalog {
        let mut request = build_request(base_url, descriptor, overrides);
        if let Some((auth, credential)) = credential {
            auth.apply(&mut request, credential);
        }
        tracing::debug!(method = %request.method, url = %request.url, "fire");
        let response = requester.dispatch(&request).inspect_err(|e| {
            tracing::error!(operation = %descriptor.label(), error = %e, "transport failure");
        })?;
        report.total_requests += 1;
        report.responses.push(FiredRequest {
            operation: descriptor.label(),
            status: response.status,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiknock_core::ParameterSet;
    use serde_json::json;

    fn descriptor() -> RequestDescriptor {
        let mut parameters = ParameterSet::default();
        parameters.path.insert("id".into(), json!(5));
        parameters.query.insert("page".into(), json!(1));
        parameters.header.insert("X-Trace".into(), json!("apiknock"));
        parameters.cookie.insert("lang".into(), json!("en"));
        RequestDescriptor {
            path: "/items/{id}".into(),
            method: "patch".into(),
            parameters,
            body: Some(json!({"name": "apiknock"})),
        }
    }

    #[test]
    fn build_request_expands_everything() {
        let r = build_request("https://api.test/v1/", &descriptor(), &IndexMap::new());
        assert_eq!(r.method, "PATCH");
        assert_eq!(r.url, "https://api.test/v1/items/5");
        assert_eq!(r.query_param("page"), Some("1"));
        assert_eq!(r.header("x-trace"), Some("apiknock"));
        assert_eq!(r.cookie("lang"), Some("en"));
        assert_eq!(r.body, Some(json!({"name": "apiknock"})));
    }

    #[test]
    fn build_request_applies_overrides_to_copy() {
        let d = descriptor();
        let mut overrides = IndexMap::new();
        overrides.insert("id".to_string(), json!("abc"));
        let r = build_request("http://h", &d, &overrides);
        assert_eq!(r.url, "http://h/items/abc");
        assert_eq!(d.parameters.path.get("id"), Some(&json!(5)));
    }

    #[test]
    fn join_url_slashes() {
        assert_eq!(join_url("http://h/", "/a"), "http://h/a");
        assert_eq!(join_url("http://h", "a"), "http://h/a");
        assert_eq!(join_url("http://h/base", "/a"), "http://h/base/a");
    }

    #[test]
    fn entry_checks_reports_missing_and_unknown() {
        let entry = MatrixEntry {
            matrix: IndexMap::new(),
            success: Some(json!(["http_code", 200])),
            blocked: None,
        };
        assert_eq!(
            entry_checks(&entry).unwrap_err(),
            "missing \"blocked\" check in authorization matrix"
        );

        let entry = MatrixEntry {
            blocked: Some(json!(["http_header", "x"])),
            ..entry
        };
        assert!(entry_checks(&entry).unwrap_err().starts_with("\"blocked\": unknown check method"));
    }
}

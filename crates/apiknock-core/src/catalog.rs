//! Request catalog: one synthesized request per operation, in document order

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::schema::{SchemaError, SchemaNode};
use crate::spec::{OperationDecl, ResolvedSpec};
use crate::synth;

/// Where a parameter travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Path,
    Header,
    Cookie,
}

impl ParamLocation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Path => "path",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

impl FromStr for ParamLocation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(Self::Query),
            "path" => Ok(Self::Path),
            "header" => Ok(Self::Header),
            "cookie" => Ok(Self::Cookie),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthesized parameter values, grouped by location.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSet {
    pub query: IndexMap<String, Value>,
    pub path: IndexMap<String, Value>,
    pub header: IndexMap<String, Value>,
    pub cookie: IndexMap<String, Value>,
}

impl ParameterSet {
    #[must_use]
    pub fn group(&self, location: ParamLocation) -> &IndexMap<String, Value> {
        match location {
            ParamLocation::Query => &self.query,
            ParamLocation::Path => &self.path,
            ParamLocation::Header => &self.header,
            ParamLocation::Cookie => &self.cookie,
        }
    }

    pub fn group_mut(&mut self, location: ParamLocation) -> &mut IndexMap<String, Value> {
        match location {
            ParamLocation::Query => &mut self.query,
            ParamLocation::Path => &mut self.path,
            ParamLocation::Header => &mut self.header,
            ParamLocation::Cookie => &mut self.cookie,
        }
    }

    /// Replace the value of every parameter named in `overrides`, whichever
    /// group it lives in. Names not declared by the operation are ignored.
    pub fn apply_overrides(&mut self, overrides: &IndexMap<String, Value>) {
        for location in [
            ParamLocation::Query,
            ParamLocation::Path,
            ParamLocation::Header,
            ParamLocation::Cookie,
        ] {
            for (name, value) in self.group_mut(location).iter_mut() {
                if let Some(replacement) = overrides.get(name) {
                    *value = replacement.clone();
                }
            }
        }
    }
}

/// A ready-to-send representation of one API operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDescriptor {
    /// Path template with `{param}` placeholders
    pub path: String,
    /// Lowercase HTTP verb
    pub method: String,
    pub parameters: ParameterSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// Operation label, e.g. `"GET /items/{id}"`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.path)
    }

    /// Path template with every `{name}` replaced by its value in `path_params`.
    #[must_use]
    pub fn expand_path(&self, path_params: &IndexMap<String, Value>) -> String {
        let mut expanded = self.path.clone();
        for (name, value) in path_params {
            expanded = expanded.replace(&format!("{{{name}}}"), &param_string(value));
        }
        expanded
    }
}

/// Wire form of a synthesized value: strings verbatim, everything else as JSON.
#[must_use]
pub fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the request catalog for every operation of `spec`.
///
/// # Errors
///
/// Any malformed parameter, unsupported body media type or unsynthesizable
/// schema aborts the whole build.
pub fn build(spec: &ResolvedSpec) -> Result<Vec<RequestDescriptor>, SpecError> {
    if spec.operations.is_empty() {
        return Err(SpecError::Empty);
    }

    let catalog = spec
        .operations
        .iter()
        .map(build_descriptor)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(operations = catalog.len(), "request catalog built");
    Ok(catalog)
}

fn build_descriptor(op: &OperationDecl) -> Result<RequestDescriptor, SpecError> {
    let operation = op.label();
    let mut parameters = ParameterSet::default();

    for param in &op.parameters {
        let name = param
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SpecError::MissingName {
                operation: operation.clone(),
            })?;
        let raw_location = param
            .location
            .as_deref()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| SpecError::MissingLocation {
                operation: operation.clone(),
                name: name.to_string(),
            })?;
        let location =
            raw_location
                .parse::<ParamLocation>()
                .map_err(|()| SpecError::UnsupportedLocation {
                    operation: operation.clone(),
                    name: name.to_string(),
                    location: raw_location.to_string(),
                })?;

        let context = format!("{location}.{name}");
        let value = synthesize_schema(&param.schema, &context, &operation)?;
        parameters.group_mut(location).insert(name.to_string(), value);
    }

    let body = match &op.request_body {
        None => None,
        Some(decl) if decl.content.is_empty() => {
            tracing::warn!(%operation, "request body declares no content, sending a placeholder");
            Some(missing_body_placeholder())
        }
        Some(decl) => {
            let Some((_, schema)) = decl.json_schema() else {
                return Err(SpecError::UnsupportedMediaType {
                    operation,
                    declared: decl.content.iter().map(|(m, _)| m.clone()).collect(),
                });
            };
            Some(synthesize_schema(schema, "body", &operation)?)
        }
    };

    Ok(RequestDescriptor {
        path: op.path.clone(),
        method: op.method.to_ascii_lowercase(),
        parameters,
        body,
    })
}

/// Body sent for operations whose request body declares no content.
#[must_use]
pub fn missing_body_placeholder() -> Value {
    serde_json::json!({"not-provided-in-api-sec": "sorry-for-this"})
}

fn synthesize_schema(schema: &Value, context: &str, operation: &str) -> Result<Value, SpecError> {
    SchemaNode::parse(schema, context)
        .and_then(|node| synth::synthesize_at(&node, context))
        .map_err(|source| SpecError::Schema {
            operation: operation.to_string(),
            source,
        })
}

/// A parameter or body declaration is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("{operation}: a parameter without a name was declared")]
    MissingName { operation: String },
    #[error("{operation}: parameter \"{name}\" has no location (\"in\")")]
    MissingLocation { operation: String, name: String },
    #[error("{operation}: parameter \"{name}\" uses unsupported location \"{location}\"")]
    UnsupportedLocation {
        operation: String,
        name: String,
        location: String,
    },
    #[error("{operation}: only JSON request bodies are supported (declared: {declared:?})")]
    UnsupportedMediaType {
        operation: String,
        declared: Vec<String>,
    },
    #[error("{operation}: invalid schema: {source}")]
    Schema {
        operation: String,
        #[source]
        source: SchemaError,
    },
    #[error("no operations found in API description")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ParameterDecl, RequestBodyDecl};
    use serde_json::json;

    fn param(name: &str, location: &str, schema: Value) -> ParameterDecl {
        ParameterDecl {
            name: Some(name.into()),
            location: Some(location.into()),
            schema,
        }
    }

    fn op(path: &str, method: &str, parameters: Vec<ParameterDecl>) -> OperationDecl {
        OperationDecl {
            path: path.into(),
            method: method.into(),
            parameters,
            request_body: None,
        }
    }

    fn spec(operations: Vec<OperationDecl>) -> ResolvedSpec {
        ResolvedSpec {
            base_url: None,
            operations,
        }
    }

    #[test]
    fn build_groups_parameters_by_location() {
        let s = spec(vec![op(
            "/items/{id}",
            "get",
            vec![
                param("id", "path", json!({"type": "integer", "minimum": 5})),
                param("verbose", "query", json!({"type": "boolean"})),
                param("X-Trace", "header", json!({"type": "string", "format": "uuid"})),
                param("session", "cookie", json!({"type": "string", "example": "s1"})),
            ],
        )]);
        let catalog = build(&s).unwrap();
        assert_eq!(catalog.len(), 1);
        let d = &catalog[0];
        assert_eq!(d.parameters.path.get("id"), Some(&json!(5)));
        assert_eq!(d.parameters.query.get("verbose"), Some(&json!(true)));
        assert_eq!(
            d.parameters.header.get("X-Trace"),
            Some(&json!("00000000-1111-2222-3333-445566778899"))
        );
        assert_eq!(d.parameters.cookie.get("session"), Some(&json!("s1")));
        assert!(d.body.is_none());
    }

    #[test]
    fn build_keeps_document_order() {
        let s = spec(vec![
            op("/b", "post", vec![]),
            op("/a", "get", vec![]),
            op("/a", "DELETE", vec![]),
        ]);
        let labels: Vec<String> = build(&s).unwrap().iter().map(RequestDescriptor::label).collect();
        insta::assert_debug_snapshot!(labels, @r#"
        [
            "POST /b",
            "GET /a",
            "DELETE /a",
        ]
        "#);
    }

    #[test]
    fn build_lowercases_method() {
        let s = spec(vec![op("/a", "PUT", vec![])]);
        assert_eq!(build(&s).unwrap()[0].method, "put");
    }

    #[test]
    fn build_missing_name_is_fatal() {
        let s = spec(vec![op(
            "/a",
            "get",
            vec![ParameterDecl {
                name: None,
                location: Some("query".into()),
                schema: json!({"type": "string"}),
            }],
        )]);
        assert_eq!(
            build(&s).unwrap_err(),
            SpecError::MissingName {
                operation: "GET /a".into()
            }
        );
    }

    #[test]
    fn build_missing_location_is_fatal() {
        let s = spec(vec![op(
            "/a",
            "get",
            vec![ParameterDecl {
                name: Some("q".into()),
                location: None,
                schema: json!({"type": "string"}),
            }],
        )]);
        assert!(matches!(build(&s).unwrap_err(), SpecError::MissingLocation { .. }));
    }

    #[test]
    fn build_unsupported_location_is_fatal() {
        let s = spec(vec![
            op("/ok", "get", vec![]),
            op("/upload", "post", vec![param("file", "formData", json!({"type": "file"}))]),
        ]);
        let err = build(&s).unwrap_err();
        assert_eq!(
            err,
            SpecError::UnsupportedLocation {
                operation: "POST /upload".into(),
                name: "file".into(),
                location: "formData".into(),
            }
        );
    }

    #[test]
    fn build_json_body() {
        let mut o = op("/pets", "post", vec![]);
        o.request_body = Some(RequestBodyDecl {
            content: vec![(
                "application/json".into(),
                json!({"type": "object", "properties": {"name": {"type": "string"}}}),
            )],
        });
        let catalog = build(&spec(vec![o])).unwrap();
        assert_eq!(catalog[0].body, Some(json!({"name": "apiknock"})));
    }

    #[test]
    fn build_non_json_body_is_fatal() {
        let mut o = op("/pets", "post", vec![]);
        o.request_body = Some(RequestBodyDecl {
            content: vec![("application/xml".into(), json!({"type": "string"}))],
        });
        let err = build(&spec(vec![o])).unwrap_err();
        assert_eq!(
            err,
            SpecError::UnsupportedMediaType {
                operation: "POST /pets".into(),
                declared: vec!["application/xml".into()],
            }
        );
    }

    #[test]
    fn build_body_without_content_uses_placeholder() {
        let mut o = op("/pets", "post", vec![]);
        o.request_body = Some(RequestBodyDecl::default());
        let catalog = build(&spec(vec![o, op("/pets", "get", vec![])])).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog[0].body,
            Some(json!({"not-provided-in-api-sec": "sorry-for-this"}))
        );
        assert_eq!(catalog[1].label(), "GET /pets");
    }

    #[test]
    fn build_schema_error_names_operation() {
        let s = spec(vec![op("/a", "get", vec![param("q", "query", json!({}))])]);
        let err = build(&s).unwrap_err();
        assert_eq!(err.to_string(), "GET /a: invalid schema: query.q: neither type nor schema defined");
    }

    #[test]
    fn build_empty_spec_is_error() {
        assert_eq!(build(&spec(vec![])).unwrap_err(), SpecError::Empty);
    }

    #[test]
    fn expand_path_substitutes_placeholders() {
        let s = spec(vec![op(
            "/users/{user}/items/{id}",
            "get",
            vec![
                param("user", "path", json!({"type": "string", "example": "alice"})),
                param("id", "path", json!({"type": "integer"})),
            ],
        )]);
        let d = &build(&s).unwrap()[0];
        assert_eq!(d.expand_path(&d.parameters.path), "/users/alice/items/1234");
    }

    #[test]
    fn overrides_replace_declared_names_only() {
        let mut set = ParameterSet::default();
        set.path.insert("id".into(), json!(5));
        set.query.insert("page".into(), json!(1));
        let mut overrides = IndexMap::new();
        overrides.insert("id".to_string(), json!("42"));
        overrides.insert("unknown".to_string(), json!(true));
        set.apply_overrides(&overrides);
        assert_eq!(set.path.get("id"), Some(&json!("42")));
        assert_eq!(set.query.get("page"), Some(&json!(1)));
        assert!(!set.query.contains_key("unknown"));
    }

    #[test]
    fn param_string_forms() {
        assert_eq!(param_string(&json!("abc")), "abc");
        assert_eq!(param_string(&json!(5)), "5");
        assert_eq!(param_string(&json!({"a": 1})), r#"{"a":1}"#);
    }
}

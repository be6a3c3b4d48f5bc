//! API description loading: OpenAPI 3 / Swagger 2, JSON or YAML
//!
//! Produces a [`ResolvedSpec`] with every local `$ref` reachable from an
//! operation dereferenced. Circular references fail the load.

use std::path::{Path, PathBuf};

use apiknock_core::{OperationDecl, ParameterDecl, RequestBodyDecl, ResolvedSpec};
use serde_json::{Map, Value};

/// Path item keys that are operations.
const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Keys whose values are literal data, not schema; `$ref`s inside them stay as-is.
const LITERAL_KEYS: &[&str] = &["example", "examples", "default", "x-example", "enum"];

/// Keys whose values map user-chosen names to schemas. A name there is never a
/// keyword, even when it reads like one of [`LITERAL_KEYS`].
const NAME_MAP_KEYS: &[&str] = &["properties", "patternProperties", "definitions", "$defs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    OpenApi3,
    Swagger2,
}

/// Read and resolve an API description file.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed, declares an unsupported
/// version, or contains a non-local, dangling or circular `$ref`.
pub fn load(path: &Path) -> Result<ResolvedSpec, LoadError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LoadError::Io(path.to_path_buf(), e.to_string()))?;
    let document = parse_document(path, &content)?;
    let spec = from_value(&document)?;
    tracing::info!(
        path = %path.display(),
        operations = spec.operations.len(),
        base_url = spec.base_url.as_deref().unwrap_or("-"),
        "API description loaded"
    );
    Ok(spec)
}

/// Parse an API description from JSON or YAML.
///
/// Detection strategy: try extension first (`.yaml`/`.yml`/`.json`), then fall
/// back to content sniffing (leading `{` → JSON, otherwise YAML).
///
/// # Errors
///
/// Returns [`LoadError::Parse`] on invalid JSON/YAML.
pub fn parse_document(path: &Path, content: &str) -> Result<Value, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let as_json = |c: &str| {
        serde_json::from_str(c).map_err(|e| LoadError::Parse(format!("Invalid JSON: {e}")))
    };
    let as_yaml = |c: &str| {
        serde_yml::from_str(c).map_err(|e| LoadError::Parse(format!("Invalid YAML: {e}")))
    };

    match ext.as_str() {
        "yaml" | "yml" => as_yaml(content),
        "json" => as_json(content),
        _ if content.trim_start().starts_with('{') => as_json(content),
        _ => as_yaml(content),
    }
}

/// Detect the document's version from `openapi` / `swagger`.
///
/// # Errors
///
/// Returns error if neither key is present or the version is not 2.x / 3.x.
pub fn detect_version(document: &Value) -> Result<SpecVersion, LoadError> {
    if let Some(v) = document.get("openapi") {
        let version = version_string(v);
        return if version.starts_with("3.") {
            Ok(SpecVersion::OpenApi3)
        } else {
            Err(LoadError::UnsupportedVersion(version))
        };
    }
    if let Some(v) = document.get("swagger") {
        let version = version_string(v);
        return if version.starts_with("2.") || version == "2" {
            Ok(SpecVersion::Swagger2)
        } else {
            Err(LoadError::UnsupportedVersion(version))
        };
    }
    Err(LoadError::MissingVersion)
}

fn version_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve an already-parsed document.
///
/// # Errors
///
/// See [`load`].
pub fn from_value(document: &Value) -> Result<ResolvedSpec, LoadError> {
    let version = detect_version(document)?;
    let resolver = Resolver { root: document };

    let base_url = match version {
        SpecVersion::OpenApi3 => openapi3_base_url(document),
        SpecVersion::Swagger2 => swagger2_base_url(document)?,
    };

    let mut operations = Vec::new();
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Ok(ResolvedSpec {
            base_url,
            operations,
        });
    };

    for (path, raw_item) in paths {
        let item = resolver.resolve_shallow(raw_item)?;
        let Some(item) = item.as_object() else {
            continue;
        };
        let shared = item.get("parameters");

        for (method, operation) in item {
            if !HTTP_METHODS.contains(&method.as_str()) {
                continue;
            }
            let parameters = merge_parameters(
                resolver.parameter_list(shared)?,
                resolver.parameter_list(operation.get("parameters"))?,
            );
            let decl = match version {
                SpecVersion::OpenApi3 => {
                    openapi3_operation(&resolver, path, method, operation, parameters)?
                }
                SpecVersion::Swagger2 => {
                    swagger2_operation(document, path, method, operation, parameters)
                }
            };
            tracing::debug!(operation = %decl.label(), params = decl.parameters.len(), "operation");
            operations.push(decl);
        }
    }

    Ok(ResolvedSpec {
        base_url,
        operations,
    })
}

/// Operation-level parameters replace path-level ones with the same name and location.
fn merge_parameters(shared: Vec<Value>, own: Vec<Value>) -> Vec<Value> {
    let key = |p: &Value| {
        (
            p.get("name").and_then(Value::as_str).map(String::from),
            p.get("in").and_then(Value::as_str).map(String::from),
        )
    };
    let mut merged = shared;
    for param in own {
        let k = key(&param);
        if let Some(slot) = merged.iter_mut().find(|p| key(p) == k) {
            *slot = param;
        } else {
            merged.push(param);
        }
    }
    merged
}

fn parameter_decl(param: &Value, schema: Value) -> ParameterDecl {
    ParameterDecl {
        name: param.get("name").and_then(Value::as_str).map(String::from),
        location: param.get("in").and_then(Value::as_str).map(String::from),
        schema,
    }
}

// ── OpenAPI 3 ──

fn openapi3_operation(
    resolver: &Resolver<'_>,
    path: &str,
    method: &str,
    operation: &Value,
    parameters: Vec<Value>,
) -> Result<OperationDecl, LoadError> {
    let parameters = parameters
        .iter()
        .map(|p| parameter_decl(p, p.get("schema").cloned().unwrap_or(Value::Null)))
        .collect();

    let request_body = match operation.get("requestBody") {
        None => None,
        Some(raw) => {
            let body = resolver.resolve(raw)?;
            let content = body
                .get("content")
                .and_then(Value::as_object)
                .map(|content| {
                    content
                        .iter()
                        .map(|(media, entry)| {
                            (media.clone(), entry.get("schema").cloned().unwrap_or(Value::Null))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(RequestBodyDecl { content })
        }
    };

    Ok(OperationDecl {
        path: path.to_string(),
        method: method.to_string(),
        parameters,
        request_body,
    })
}

/// `servers[0].url` with variable defaults substituted, when absolute.
fn openapi3_base_url(document: &Value) -> Option<String> {
    let server = document.get("servers")?.as_array()?.first()?;
    let mut url = server.get("url")?.as_str()?.to_string();
    if let Some(variables) = server.get("variables").and_then(Value::as_object) {
        for (name, variable) in variables {
            if let Some(default) = variable.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{name}}}"), default);
            }
        }
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Some(url.trim_end_matches('/').to_string())
    } else {
        None
    }
}

// ── Swagger 2 ──

fn swagger2_operation(
    document: &Value,
    path: &str,
    method: &str,
    operation: &Value,
    parameters: Vec<Value>,
) -> OperationDecl {
    let mut decls = Vec::new();
    let mut request_body = None;

    for param in &parameters {
        if param.get("in").and_then(Value::as_str) == Some("body") {
            let content = param
                .get("schema")
                .map(|schema| {
                    swagger2_consumes(document, operation)
                        .into_iter()
                        .map(|media| (media, schema.clone()))
                        .collect()
                })
                .unwrap_or_default();
            request_body = Some(RequestBodyDecl { content });
        } else {
            // Non-body parameters carry their schema keywords inline.
            decls.push(parameter_decl(param, param.clone()));
        }
    }

    OperationDecl {
        path: path.to_string(),
        method: method.to_string(),
        parameters: decls,
        request_body,
    }
}

/// Operation `consumes`, else document `consumes`, else JSON.
fn swagger2_consumes(document: &Value, operation: &Value) -> Vec<String> {
    operation
        .get("consumes")
        .or_else(|| document.get("consumes"))
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).map(String::from).collect::<Vec<_>>())
        .filter(|list| !list.is_empty())
        .unwrap_or_else(|| vec!["application/json".to_string()])
}

/// `scheme://host/basePath` when `schemes`, `host` and `basePath` are all declared.
fn swagger2_base_url(document: &Value) -> Result<Option<String>, LoadError> {
    let (Some(schemes), Some(host), Some(base_path)) = (
        document.get("schemes").and_then(Value::as_array),
        document.get("host").and_then(Value::as_str),
        document.get("basePath").and_then(Value::as_str),
    ) else {
        return Ok(None);
    };
    let schemes: Vec<String> = schemes
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_ascii_lowercase)
        .collect();
    let scheme = if schemes.iter().any(|s| s == "https") {
        "https"
    } else if schemes.iter().any(|s| s == "http") {
        "http"
    } else {
        return Err(LoadError::UnsupportedScheme(schemes));
    };
    let base_path = base_path.trim_end_matches('/');
    Ok(Some(format!("{scheme}://{host}{base_path}")))
}

// ── $ref resolution ──

struct Resolver<'a> {
    root: &'a Value,
}

impl Resolver<'_> {
    /// Resolve `$ref`s recursively.
    fn resolve(&self, value: &Value) -> Result<Value, LoadError> {
        self.resolve_inner(value, false, &mut Vec::new())
    }

    /// Follow a top-level `$ref` chain only; nested refs are left alone.
    fn resolve_shallow(&self, value: &Value) -> Result<Value, LoadError> {
        let mut seen = Vec::new();
        let mut current = value.clone();
        while let Some(reference) = ref_of(&current) {
            if seen.contains(&reference) {
                return Err(LoadError::CircularReference(reference));
            }
            let target = self.lookup(&reference)?.clone();
            current = merge_siblings(target, &current);
            seen.push(reference);
        }
        Ok(current)
    }

    /// `names` is true while walking a name → schema map such as `properties`.
    fn resolve_inner(
        &self,
        value: &Value,
        names: bool,
        stack: &mut Vec<String>,
    ) -> Result<Value, LoadError> {
        match value {
            Value::Object(obj) => {
                let reference = if names { None } else { ref_of(value) };
                if let Some(reference) = reference {
                    if stack.contains(&reference) {
                        return Err(LoadError::CircularReference(reference));
                    }
                    let target = self.lookup(&reference)?;
                    stack.push(reference);
                    let resolved = self.resolve_inner(target, false, stack)?;
                    stack.pop();
                    let merged = merge_siblings(resolved, value);
                    return Ok(merged);
                }
                let mut out = Map::with_capacity(obj.len());
                for (key, child) in obj {
                    let key_str = key.as_str();
                    let child = if names {
                        self.resolve_inner(child, false, stack)?
                    } else if LITERAL_KEYS.contains(&key_str) {
                        child.clone()
                    } else {
                        self.resolve_inner(child, NAME_MAP_KEYS.contains(&key_str), stack)?
                    };
                    out.insert(key.clone(), child);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_inner(item, false, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn lookup(&self, reference: &str) -> Result<&Value, LoadError> {
        let Some(pointer) = reference.strip_prefix('#') else {
            return Err(LoadError::ExternalReference(reference.to_string()));
        };
        // serde_json's pointer lookup unescapes ~1 and ~0 itself.
        self.root
            .pointer(pointer)
            .ok_or_else(|| LoadError::UnresolvedReference(reference.to_string()))
    }

    /// Resolved parameter objects of a `parameters` array.
    fn parameter_list(&self, raw: Option<&Value>) -> Result<Vec<Value>, LoadError> {
        raw.and_then(Value::as_array)
            .map(|params| params.iter().map(|p| self.resolve(p)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn ref_of(value: &Value) -> Option<String> {
    value.get("$ref").and_then(Value::as_str).map(String::from)
}

/// Overlay the keys written next to a `$ref` onto its resolved target.
fn merge_siblings(target: Value, with_ref: &Value) -> Value {
    let Some(siblings) = with_ref.as_object().filter(|o| o.len() > 1) else {
        return target;
    };
    let Value::Object(mut merged) = target else {
        return target;
    };
    for (key, value) in siblings {
        if key != "$ref" {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Neither \"openapi\" nor \"swagger\" version declared")]
    MissingVersion,
    #[error("Unsupported API description version {0}")]
    UnsupportedVersion(String),
    #[error("Only local references are supported: {0}")]
    ExternalReference(String),
    #[error("Reference {0} points nowhere")]
    UnresolvedReference(String),
    #[error("Circular reference {0}")]
    CircularReference(String),
    #[error("No supported scheme in {0:?} (expected http or https)")]
    UnsupportedScheme(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn openapi3(paths: Value) -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "t", "version": "1"},
            "servers": [{"url": "https://{region}.api.test/v1/", "variables": {"region": {"default": "eu"}}}],
            "paths": paths,
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "owner": {"$ref": "#/components/schemas/Owner"}
                        }
                    },
                    "Owner": {"type": "object", "properties": {"email": {"type": "string", "format": "email"}}},
                    "Node": {
                        "type": "object",
                        "properties": {"next": {"$ref": "#/components/schemas/Node"}}
                    },
                    "a/b": {"type": "integer", "minimum": 7}
                },
                "parameters": {
                    "Id": {"name": "id", "in": "path", "required": true, "schema": {"type": "integer", "minimum": 5}}
                }
            }
        })
    }

    #[test]
    fn detect_versions() {
        assert_eq!(detect_version(&json!({"openapi": "3.1.0"})).unwrap(), SpecVersion::OpenApi3);
        assert_eq!(detect_version(&json!({"swagger": "2.0"})).unwrap(), SpecVersion::Swagger2);
        assert!(matches!(
            detect_version(&json!({"openapi": "4.0"})),
            Err(LoadError::UnsupportedVersion(_))
        ));
        assert!(matches!(detect_version(&json!({})), Err(LoadError::MissingVersion)));
    }

    #[test]
    fn openapi3_operations_in_document_order() {
        let doc = openapi3(json!({
            "/pets": {
                "summary": "ignored",
                "post": {"responses": {}},
                "get": {"responses": {}},
                "x-internal": {"responses": {}}
            },
            "/pets/{id}": {"delete": {"responses": {}}}
        }));
        let spec = from_value(&doc).unwrap();
        let labels: Vec<String> = spec.operations.iter().map(OperationDecl::label).collect();
        assert_eq!(labels, ["POST /pets", "GET /pets", "DELETE /pets/{id}"]);
    }

    #[test]
    fn openapi3_base_url_substitutes_variables() {
        let spec = from_value(&openapi3(json!({}))).unwrap();
        assert_eq!(spec.base_url.as_deref(), Some("https://eu.api.test/v1"));
    }

    #[test]
    fn openapi3_relative_server_has_no_base_url() {
        let doc = json!({"openapi": "3.0.0", "servers": [{"url": "/api"}], "paths": {}});
        assert_eq!(from_value(&doc).unwrap().base_url, None);
    }

    #[test]
    fn parameter_refs_resolved_and_merged() {
        let doc = openapi3(json!({
            "/pets/{id}": {
                "parameters": [
                    {"$ref": "#/components/parameters/Id"},
                    {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                ],
                "get": {
                    "parameters": [
                        {"name": "verbose", "in": "query", "schema": {"type": "string"}},
                        {"name": "lang", "in": "header", "schema": {"type": "string"}}
                    ]
                }
            }
        }));
        let spec = from_value(&doc).unwrap();
        let params = &spec.operations[0].parameters;
        let names: Vec<&str> = params.iter().filter_map(|p| p.name.as_deref()).collect();
        assert_eq!(names, ["id", "verbose", "lang"]);
        assert_eq!(params[0].schema, json!({"type": "integer", "minimum": 5}));
        assert_eq!(params[1].schema, json!({"type": "string"}));
    }

    #[test]
    fn request_body_schema_resolved_recursively() {
        let doc = openapi3(json!({
            "/pets": {
                "post": {
                    "requestBody": {
                        "content": {
                            "application/xml": {"schema": {"type": "string"}},
                            "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}
                        }
                    }
                }
            }
        }));
        let spec = from_value(&doc).unwrap();
        let body = spec.operations[0].request_body.as_ref().unwrap();
        let (media, schema) = body.json_schema().unwrap();
        assert_eq!(media, "application/json");
        assert_eq!(
            schema["properties"]["owner"]["properties"]["email"],
            json!({"type": "string", "format": "email"})
        );
    }

    #[test]
    fn escaped_pointer_segments() {
        let doc = openapi3(json!({
            "/n": {"get": {"parameters": [
                {"name": "n", "in": "query", "schema": {"$ref": "#/components/schemas/a~1b"}}
            ]}}
        }));
        let spec = from_value(&doc).unwrap();
        assert_eq!(spec.operations[0].parameters[0].schema, json!({"type": "integer", "minimum": 7}));
    }

    #[test]
    fn ref_siblings_override_target() {
        let doc = openapi3(json!({
            "/n": {"get": {"parameters": [
                {"name": "n", "in": "query", "schema": {"$ref": "#/components/schemas/a~1b", "example": 3}}
            ]}}
        }));
        let spec = from_value(&doc).unwrap();
        assert_eq!(
            spec.operations[0].parameters[0].schema,
            json!({"type": "integer", "minimum": 7, "example": 3})
        );
    }

    #[test]
    fn circular_reference_fails() {
        let doc = openapi3(json!({
            "/nodes": {"post": {"requestBody": {"content": {
                "application/json": {"schema": {"$ref": "#/components/schemas/Node"}}
            }}}}
        }));
        let err = from_value(&doc).unwrap_err();
        assert!(matches!(err, LoadError::CircularReference(ref r) if r == "#/components/schemas/Node"));
    }

    #[test]
    fn unused_cycle_is_harmless() {
        let doc = openapi3(json!({"/ok": {"get": {}}}));
        assert!(from_value(&doc).is_ok());
    }

    #[test]
    fn dangling_and_external_refs_fail() {
        let dangling = openapi3(json!({"/a": {"get": {"parameters": [{"$ref": "#/components/parameters/Nope"}]}}}));
        assert!(matches!(from_value(&dangling), Err(LoadError::UnresolvedReference(_))));

        let external = openapi3(json!({"/a": {"get": {"parameters": [{"$ref": "common.yaml#/Id"}]}}}));
        assert!(matches!(from_value(&external), Err(LoadError::ExternalReference(_))));
    }

    #[test]
    fn refs_inside_examples_are_literal() {
        let doc = openapi3(json!({
            "/a": {"get": {"parameters": [
                {"name": "q", "in": "query", "schema": {"type": "object", "example": {"$ref": "#/nowhere"}}}
            ]}}
        }));
        let spec = from_value(&doc).unwrap();
        assert_eq!(spec.operations[0].parameters[0].schema["example"], json!({"$ref": "#/nowhere"}));
    }

    #[test]
    fn properties_named_like_keywords_are_resolved() {
        let doc = openapi3(json!({
            "/a": {"post": {"requestBody": {"content": {"application/json": {"schema": {
                "type": "object",
                "properties": {
                    "default": {"$ref": "#/components/schemas/Owner"},
                    "enum": {"$ref": "#/components/schemas/a~1b"},
                    "example": {"type": "string", "example": {"$ref": "#/nowhere"}}
                }
            }}}}}}
        }));
        let spec = from_value(&doc).unwrap();
        let (_, schema) = spec.operations[0].request_body.as_ref().unwrap().json_schema().unwrap();
        assert_eq!(schema["properties"]["default"]["properties"]["email"]["format"], "email");
        assert_eq!(schema["properties"]["enum"], json!({"type": "integer", "minimum": 7}));
        assert_eq!(schema["properties"]["example"]["example"], json!({"$ref": "#/nowhere"}));
    }

    #[test]
    fn swagger2_body_and_inline_parameters() {
        let doc = json!({
            "swagger": "2.0",
            "schemes": ["http", "https"],
            "host": "api.test",
            "basePath": "/v2/",
            "consumes": ["application/json"],
            "paths": {
                "/pets/{id}": {
                    "put": {
                        "parameters": [
                            {"name": "id", "in": "path", "type": "integer", "x-example": 42},
                            {"name": "pet", "in": "body", "schema": {"$ref": "#/definitions/Pet"}}
                        ]
                    }
                }
            },
            "definitions": {"Pet": {"type": "object", "properties": {"name": {"type": "string"}}}}
        });
        let spec = from_value(&doc).unwrap();
        assert_eq!(spec.base_url.as_deref(), Some("https://api.test/v2"));

        let op = &spec.operations[0];
        assert_eq!(op.parameters.len(), 1);
        assert_eq!(op.parameters[0].schema["x-example"], json!(42));
        let body = op.request_body.as_ref().unwrap();
        assert_eq!(body.content[0].0, "application/json");
        assert_eq!(body.content[0].1["properties"]["name"], json!({"type": "string"}));
    }

    #[test]
    fn swagger2_operation_consumes_wins() {
        let doc = json!({
            "swagger": "2.0",
            "consumes": ["application/json"],
            "paths": {"/up": {"post": {
                "consumes": ["application/xml"],
                "parameters": [{"name": "b", "in": "body", "schema": {"type": "string"}}]
            }}}
        });
        let spec = from_value(&doc).unwrap();
        let body = spec.operations[0].request_body.as_ref().unwrap();
        assert!(body.json_schema().is_none());
        assert_eq!(spec.base_url, None);
    }

    #[test]
    fn swagger2_unsupported_scheme() {
        let doc = json!({"swagger": "2.0", "schemes": ["ws"], "host": "h", "basePath": "/", "paths": {}});
        assert!(matches!(from_value(&doc), Err(LoadError::UnsupportedScheme(_))));
    }

    #[test]
    fn load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.yaml");
        std::fs::write(
            &path,
            "openapi: 3.0.0\npaths:\n  /items/{id}:\n    get:\n      parameters:\n        - name: id\n          in: path\n          schema:\n            type: integer\n            minimum: 5\n",
        )
        .unwrap();
        let spec = load(&path).unwrap();
        assert_eq!(spec.operations.len(), 1);
        assert_eq!(spec.operations[0].parameters[0].schema["minimum"], json!(5));
    }

    #[test]
    fn sniff_json_without_extension() {
        let doc = parse_document(Path::new("spec"), r#"{"openapi": "3.0.0"}"#).unwrap();
        assert_eq!(doc["openapi"], "3.0.0");
    }

    #[test]
    fn load_missing_file() {
        assert!(matches!(load(Path::new("/nonexistent/api.yaml")), Err(LoadError::Io(..))));
    }
}

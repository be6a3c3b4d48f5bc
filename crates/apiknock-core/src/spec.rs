//! Resolved API description: what the catalog builder consumes
//!
//! Produced by a loader after decoding and `$ref` dereferencing. Schemas stay
//! as resolved JSON; the catalog builder turns them into [`crate::SchemaNode`]s
//! so schema errors can name the operation they belong to.

use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSpec {
    /// scheme + host + base path, when the document declares one
    pub base_url: Option<String>,
    /// Operations in document order (paths, then methods within a path)
    pub operations: Vec<OperationDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationDecl {
    pub path: String,
    /// Lowercase HTTP verb
    pub method: String,
    pub parameters: Vec<ParameterDecl>,
    pub request_body: Option<RequestBodyDecl>,
}

/// A declared parameter. `name` and `location` are optional here because the
/// catalog builder, not the loader, decides that their absence is fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDecl {
    pub name: Option<String>,
    /// Raw `in` value: `query`, `path`, `header`, `cookie`, or anything else
    pub location: Option<String>,
    pub schema: Value,
}

/// Request body media types in declaration order, each with its schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestBodyDecl {
    pub content: Vec<(String, Value)>,
}

impl OperationDecl {
    /// Operation label, e.g. `"GET /items/{id}"`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.path)
    }
}

impl RequestBodyDecl {
    /// First media type that carries JSON, with its schema.
    #[must_use]
    pub fn json_schema(&self) -> Option<(&str, &Value)> {
        self.content
            .iter()
            .find(|(media, _)| is_json_media_type(media))
            .map(|(media, schema)| (media.as_str(), schema))
    }
}

/// `application/json`, with or without parameters, or any `+json` suffix type.
#[must_use]
pub fn is_json_media_type(media: &str) -> bool {
    let essence = media.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_media_types() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/json; charset=utf-8"));
        assert!(is_json_media_type("application/vnd.api+json"));
        assert!(!is_json_media_type("application/xml"));
        assert!(!is_json_media_type("multipart/form-data"));
    }

    #[test]
    fn json_schema_picks_first_json_entry() {
        let body = RequestBodyDecl {
            content: vec![
                ("application/xml".into(), json!({"type": "string"})),
                ("application/json".into(), json!({"type": "object"})),
            ],
        };
        let (media, schema) = body.json_schema().unwrap();
        assert_eq!(media, "application/json");
        assert_eq!(schema, &json!({"type": "object"}));
    }

    #[test]
    fn label_uppercases_method() {
        let op = OperationDecl {
            path: "/items/{id}".into(),
            method: "get".into(),
            parameters: vec![],
            request_body: None,
        };
        assert_eq!(op.label(), "GET /items/{id}");
    }
}

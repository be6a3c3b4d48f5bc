//! Schema node model: a resolved API schema fragment as a tagged tree
//!
//! Built from already-dereferenced JSON Schema / OpenAPI objects. Pure data:
//! the only behavior here is construction and validation of the tree shape.
//! Value synthesis lives in [`crate::synth`].

use indexmap::IndexMap;
use serde_json::{Number, Value};

/// One node of a resolved schema.
///
/// Precedence annotations (`default`, `example`, `x-example`, `enum`) are kept
/// on every node, not only on primitives: a declared example on an object node
/// overrides traversal of its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub kind: NodeKind,
    pub default: Option<Value>,
    pub example: Option<Value>,
    pub x_example: Option<Value>,
    /// Declared `enum` members, in document order
    pub enumeration: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Primitive(Primitive),
    /// `type: array` with its single `items` child
    Array(Box<SchemaNode>),
    /// `type: object`; properties in declaration order
    Object(IndexMap<String, SchemaNode>),
    /// A `$ref` that was not dereferenced by the loader
    Reference(String),
    /// A `type` name this model does not know (e.g. `null`, `file`)
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub format: Option<String>,
    pub minimum: Option<Number>,
    pub maximum: Option<Number>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl PrimitiveKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

impl SchemaNode {
    /// Build a node tree from a resolved JSON schema object.
    ///
    /// `context` names the node for error messages (`"query.limit"`,
    /// `"body"`); children extend it (`"body.address.zip"`, `"body[]"`).
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when a node has no `type`, when an array has no
    /// `items`, or when the schema is not a JSON object.
    pub fn parse(schema: &Value, context: &str) -> Result<Self, SchemaError> {
        let Some(obj) = schema.as_object() else {
            if schema.is_null() {
                return Err(SchemaError::MissingType {
                    context: context.to_string(),
                });
            }
            return Err(SchemaError::Malformed {
                context: context.to_string(),
                reason: format!("expected a schema object, got {schema}"),
            });
        };

        let annotation = |key: &str| obj.get(key).cloned();
        let enumeration = obj
            .get("enum")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let kind = if let Some(reference) = obj.get("$ref").and_then(|v| v.as_str()) {
            NodeKind::Reference(reference.to_string())
        } else {
            let type_name = type_name(obj.get("type")).ok_or_else(|| SchemaError::MissingType {
                context: context.to_string(),
            })?;
            parse_kind(obj, &type_name, context)?
        };

        Ok(Self {
            kind,
            default: annotation("default"),
            example: annotation("example"),
            x_example: annotation("x-example"),
            enumeration,
        })
    }

    /// Shorthand for a bare primitive node without annotations.
    #[must_use]
    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self {
            kind: NodeKind::Primitive(Primitive {
                kind,
                format: None,
                minimum: None,
                maximum: None,
            }),
            default: None,
            example: None,
            x_example: None,
            enumeration: Vec::new(),
        }
    }
}

/// `type` is usually a string; OpenAPI 3.1 also allows `["string", "null"]`.
fn type_name(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(types) => types
            .iter()
            .filter_map(|t| t.as_str())
            .find(|t| *t != "null")
            .map(String::from),
        _ => None,
    }
}

fn parse_kind(
    obj: &serde_json::Map<String, Value>,
    type_name: &str,
    context: &str,
) -> Result<NodeKind, SchemaError> {
    if let Some(kind) = PrimitiveKind::from_type_name(type_name) {
        return Ok(NodeKind::Primitive(Primitive {
            kind,
            format: obj.get("format").and_then(|v| v.as_str()).map(String::from),
            minimum: obj.get("minimum").and_then(|v| v.as_number()).cloned(),
            maximum: obj.get("maximum").and_then(|v| v.as_number()).cloned(),
        }));
    }

    match type_name {
        "array" => {
            let items = obj.get("items").ok_or_else(|| SchemaError::Malformed {
                context: context.to_string(),
                reason: "array without \"items\"".to_string(),
            })?;
            let child = SchemaNode::parse(items, &format!("{context}[]"))?;
            Ok(NodeKind::Array(Box::new(child)))
        }
        "object" => {
            let mut properties = IndexMap::new();
            match obj.get("properties") {
                None | Some(Value::Null) => {}
                Some(Value::Object(props)) => {
                    for (name, prop) in props {
                        let child = SchemaNode::parse(prop, &format!("{context}.{name}"))?;
                        properties.insert(name.clone(), child);
                    }
                }
                Some(other) => {
                    return Err(SchemaError::Malformed {
                        context: context.to_string(),
                        reason: format!("\"properties\" must be an object, got {other}"),
                    });
                }
            }
            Ok(NodeKind::Object(properties))
        }
        other => Ok(NodeKind::Unknown(other.to_string())),
    }
}

/// A schema node cannot yield a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{context}: neither type nor schema defined")]
    MissingType { context: String },
    #[error("{context}: unsupported type \"{type_name}\"")]
    UnsupportedType { context: String, type_name: String },
    #[error("{context}: unresolved reference {reference}")]
    UnresolvedReference { context: String, reference: String },
    #[error("{context}: {reason}")]
    Malformed { context: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_primitive_with_constraints() {
        let node = SchemaNode::parse(
            &json!({"type": "integer", "minimum": 5, "maximum": 10, "format": "int32"}),
            "query.limit",
        )
        .unwrap();
        let NodeKind::Primitive(p) = node.kind else {
            panic!("expected primitive");
        };
        assert_eq!(p.kind, PrimitiveKind::Integer);
        assert_eq!(p.format.as_deref(), Some("int32"));
        assert_eq!(p.minimum, Some(5.into()));
        assert_eq!(p.maximum, Some(10.into()));
    }

    #[test]
    fn parse_keeps_property_order() {
        let node = SchemaNode::parse(
            &json!({
                "type": "object",
                "properties": {
                    "zeta": {"type": "string"},
                    "alpha": {"type": "string"},
                    "mid": {"type": "boolean"}
                }
            }),
            "body",
        )
        .unwrap();
        let NodeKind::Object(props) = node.kind else {
            panic!("expected object");
        };
        let names: Vec<&str> = props.keys().map(String::as_str).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn parse_missing_type_is_error() {
        let err = SchemaNode::parse(&json!({"format": "uuid"}), "path.id").unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingType {
                context: "path.id".into()
            }
        );
        assert!(err.to_string().contains("path.id"));
    }

    #[test]
    fn parse_missing_type_nested_names_child() {
        let err = SchemaNode::parse(
            &json!({"type": "object", "properties": {"owner": {"description": "?"}}}),
            "body",
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingType {
                context: "body.owner".into()
            }
        );
    }

    #[test]
    fn parse_null_schema_is_missing_type() {
        let err = SchemaNode::parse(&Value::Null, "header.X-Trace").unwrap_err();
        assert!(matches!(err, SchemaError::MissingType { .. }));
    }

    #[test]
    fn parse_array_without_items_is_error() {
        let err = SchemaNode::parse(&json!({"type": "array"}), "query.ids").unwrap_err();
        assert!(matches!(err, SchemaError::Malformed { .. }));
    }

    #[test]
    fn parse_reference_is_kept() {
        let node =
            SchemaNode::parse(&json!({"$ref": "#/components/schemas/Pet"}), "body").unwrap();
        assert_eq!(
            node.kind,
            NodeKind::Reference("#/components/schemas/Pet".into())
        );
    }

    #[test]
    fn parse_unknown_type_is_representable() {
        let node = SchemaNode::parse(&json!({"type": "file"}), "formData.upload").unwrap();
        assert_eq!(node.kind, NodeKind::Unknown("file".into()));
    }

    #[test]
    fn parse_nullable_type_array() {
        let node = SchemaNode::parse(&json!({"type": ["null", "string"]}), "q").unwrap();
        assert!(matches!(
            node.kind,
            NodeKind::Primitive(Primitive {
                kind: PrimitiveKind::String,
                ..
            })
        ));
    }

    #[test]
    fn parse_annotations_on_object() {
        let node = SchemaNode::parse(
            &json!({"type": "object", "example": {"id": 7}, "enum": [{"id": 1}]}),
            "body",
        )
        .unwrap();
        assert_eq!(node.example, Some(json!({"id": 7})));
        assert_eq!(node.enumeration, vec![json!({"id": 1})]);
        assert!(node.default.is_none());
    }
}

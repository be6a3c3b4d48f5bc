//! Schema node → representative `serde_json::Value`
//!
//! One canonical example per node, no randomness: the same tree always yields
//! the same value. Arrays are represented by their single item value; the
//! caller decides whether the wire format needs a list.

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::schema::{NodeKind, Primitive, PrimitiveKind, SchemaError, SchemaNode};

/// Placeholder for an object that declares no properties.
pub const OBJECT_SENTINEL: &str = "apiknock-object";

const STRING_LITERAL: &str = "apiknock";
const EMAIL_LITERAL: &str = "knock@example.com";
const UUID_LITERAL: &str = "00000000-1111-2222-3333-445566778899";
/// base64("apiknock\n")
const BYTE_LITERAL: &str = "YXBpa25vY2sK";
const BINARY_LITERAL: &str = "001122334455";
const DATE_LITERAL: &str = "2020-06-08";
const DATE_TIME_LITERAL: &str = "2020-06-08T19:22:00+02:00";
const INTEGER_LITERAL: i64 = 1234;
const NUMBER_LITERAL: f64 = 12.3;

/// Synthesize the representative value of a resolved schema node.
///
/// # Errors
///
/// Returns [`SchemaError`] if the tree contains an unknown type or a leaked
/// `$ref` that no precedence value short-circuits.
pub fn synthesize(node: &SchemaNode) -> Result<Value, SchemaError> {
    synthesize_at(node, "$")
}

/// Like [`synthesize`], with `context` naming the root in error messages.
///
/// # Errors
///
/// See [`synthesize`].
pub fn synthesize_at(node: &SchemaNode, context: &str) -> Result<Value, SchemaError> {
    if let Some(preset) = preset_value(node) {
        return Ok(preset.clone());
    }

    match &node.kind {
        NodeKind::Primitive(p) => Ok(gen_primitive(p)),
        NodeKind::Array(items) => synthesize_at(items, &format!("{context}[]")),
        NodeKind::Object(properties) => gen_object(properties, context),
        NodeKind::Reference(reference) => Err(SchemaError::UnresolvedReference {
            context: context.to_string(),
            reference: reference.clone(),
        }),
        NodeKind::Unknown(type_name) => Err(SchemaError::UnsupportedType {
            context: context.to_string(),
            type_name: type_name.clone(),
        }),
    }
}

/// Declared value that wins over type-directed synthesis:
/// `default`, then `example`, then `x-example`, then the first `enum` member.
fn preset_value(node: &SchemaNode) -> Option<&Value> {
    [&node.default, &node.example, &node.x_example]
        .into_iter()
        .flatten()
        .find(|v| is_meaningful(v))
        .or_else(|| node.enumeration.first())
}

/// Null, `false`, zero and empty strings / arrays / objects do not count as
/// a declared value.
fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}

fn gen_primitive(p: &Primitive) -> Value {
    match p.kind {
        PrimitiveKind::String => gen_string(p.format.as_deref()),
        PrimitiveKind::Integer => gen_integer(p),
        PrimitiveKind::Number => json!(NUMBER_LITERAL),
        PrimitiveKind::Boolean => Value::Bool(true),
    }
}

fn gen_string(format: Option<&str>) -> Value {
    let literal = match format {
        Some("email") => EMAIL_LITERAL,
        Some("uuid") => UUID_LITERAL,
        Some("byte") => BYTE_LITERAL,
        Some("binary") => BINARY_LITERAL,
        Some("date") => DATE_LITERAL,
        Some("date-time") => DATE_TIME_LITERAL,
        _ => STRING_LITERAL,
    };
    Value::String(literal.to_string())
}

fn gen_integer(p: &Primitive) -> Value {
    p.minimum
        .as_ref()
        .or(p.maximum.as_ref())
        .map_or_else(|| Value::Number(INTEGER_LITERAL.into()), |n| Value::Number(n.clone()))
}

fn gen_object(properties: &IndexMap<String, SchemaNode>, context: &str) -> Result<Value, SchemaError> {
    if properties.is_empty() {
        return Ok(Value::String(OBJECT_SENTINEL.to_string()));
    }
    let mut obj = serde_json::Map::new();
    for (name, child) in properties {
        let value = synthesize_at(child, &format!("{context}.{name}"))?;
        obj.insert(name.clone(), value);
    }
    Ok(Value::Object(obj))
}

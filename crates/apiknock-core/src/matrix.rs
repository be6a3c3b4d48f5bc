//! Authorization matrix configuration
//!
//! The persisted form is keyed by path, then method:
//!
//! ```json
//! {
//!   "user_count": 2,
//!   "content_type": "json",
//!   "auth_matrix": {
//!     "/items/{id}": {
//!       "get": {
//!         "matrix": {"user_1": true, "user_2": false},
//!         "success": ["http_code", 200],
//!         "blocked": ["http_code", 403]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Entries are deserialized leniently: a missing or malformed `success` /
//! `blocked` check, or a non-boolean matrix value, is reported per operation at
//! run time, not as a load failure.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::RequestDescriptor;

/// Supported range for `user_count`.
pub const USER_COUNT_RANGE: std::ops::RangeInclusive<u8> = 2..=9;

/// Identity name for the 1-based index `n` (`user_1`, `user_2`, ...).
#[must_use]
pub fn identity_name(n: usize) -> String {
    format!("user_{n}")
}

/// Project configuration: the authorization matrix plus run-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnockConfig {
    /// Number of identities the matrix is written for (2..=9)
    #[serde(default = "default_user_count")]
    pub user_count: u8,

    /// Request body encoding; only "json" is supported
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Expectations per path, then per method
    #[serde(default)]
    pub auth_matrix: AuthMatrix,

    /// Fixed values replacing synthesized parameters of the same name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameter_override: IndexMap<String, Value>,
}

fn default_user_count() -> u8 {
    2
}

fn default_content_type() -> String {
    "json".to_string()
}

/// Path → method → entry, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AuthMatrix(pub IndexMap<String, IndexMap<String, MatrixEntry>>);

/// Expectations for one operation.
///
/// Fields are kept as raw values so that one malformed entry does not fail the
/// whole file; [`MatrixEntry::permissions`] and [`MatrixEntry::check_spec`]
/// validate them per operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatrixEntry {
    /// Identity → allowed (`true`) or denied (`false`), in declared order
    #[serde(default)]
    pub matrix: IndexMap<String, Value>,

    /// `[kind, expected]` applied when the identity is expected to be allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<Value>,

    /// `[kind, expected]` applied when the identity is expected to be denied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<Value>,
}

/// Persisted check: `[kind, expected]`, e.g. `["http_code", 403]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CheckSpec(pub String, pub Value);

impl CheckSpec {
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Array(vec![Value::String(self.0.clone()), self.1.clone()])
    }
}

/// Entry field holding the check for allowed (`success`) or denied
/// (`blocked`) identities.
#[must_use]
pub const fn check_field(allowed: bool) -> &'static str {
    if allowed { "success" } else { "blocked" }
}

impl MatrixEntry {
    /// Entry with every identity in `permissions` and both checks set.
    #[must_use]
    pub fn new<'a>(
        permissions: impl IntoIterator<Item = (&'a str, bool)>,
        success: &CheckSpec,
        blocked: &CheckSpec,
    ) -> Self {
        Self {
            matrix: permissions
                .into_iter()
                .map(|(identity, allowed)| (identity.to_string(), Value::Bool(allowed)))
                .collect(),
            success: Some(success.to_value()),
            blocked: Some(blocked.to_value()),
        }
    }

    /// Identities in declared order with their expected access.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::NotABool`] for the first non-boolean value.
    pub fn permissions(&self) -> Result<Vec<(&str, bool)>, EntryError> {
        self.matrix
            .iter()
            .map(|(identity, value)| match value {
                Value::Bool(allowed) => Ok((identity.as_str(), *allowed)),
                other => Err(EntryError::NotABool {
                    identity: identity.clone(),
                    found: other.to_string(),
                }),
            })
            .collect()
    }

    /// The check for identities expected to be allowed (`true`) or denied.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError`] if the field is absent or not a `[kind, expected]` pair.
    pub fn check_spec(&self, allowed: bool) -> Result<CheckSpec, EntryError> {
        let field = check_field(allowed);
        let raw = if allowed { &self.success } else { &self.blocked };
        let raw = raw.as_ref().ok_or(EntryError::MissingCheck(field))?;
        serde_json::from_value(raw.clone()).map_err(|e| EntryError::MalformedCheck {
            field,
            reason: e.to_string(),
        })
    }
}

/// A matrix entry cannot be evaluated as written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    #[error("missing \"{0}\" check")]
    MissingCheck(&'static str),
    #[error("\"{field}\" is not a [kind, expected] pair ({reason})")]
    MalformedCheck { field: &'static str, reason: String },
    #[error("\"{identity}\" must be true or false, got {found}")]
    NotABool { identity: String, found: String },
}

/// Result of looking an operation up in the matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixLookup<'a> {
    Found(&'a MatrixEntry),
    MissingPath,
    MissingMethod,
}

impl AuthMatrix {
    /// Find the entry for `path` and `method`. Methods compare case-insensitively.
    #[must_use]
    pub fn lookup(&self, path: &str, method: &str) -> MatrixLookup<'_> {
        let Some(methods) = self.0.get(path) else {
            return MatrixLookup::MissingPath;
        };
        methods
            .iter()
            .find(|(m, _)| m.eq_ignore_ascii_case(method))
            .map_or(MatrixLookup::MissingMethod, |(_, entry)| {
                MatrixLookup::Found(entry)
            })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All `(path, method)` keys, in document order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(path, methods)| {
            methods
                .keys()
                .map(move |method| (path.as_str(), method.as_str()))
        })
    }
}

impl Default for KnockConfig {
    fn default() -> Self {
        Self {
            user_count: default_user_count(),
            content_type: default_content_type(),
            auth_matrix: AuthMatrix::default(),
            parameter_override: IndexMap::new(),
        }
    }
}

impl KnockConfig {
    /// Load config from file: TOML for `.toml`, JSON otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;
        tracing::info!(path = %path.display(), "loading authorization matrix");

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from the first default location that exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if none exists, or a load error.
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".apiknock.json", ".apiknock.toml", "knockerconf.json"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(ConfigError::NotFound(
            candidates.iter().map(|c| (*c).to_string()).collect(),
        ))
    }

    /// Check run-wide settings.
    ///
    /// # Errors
    ///
    /// Returns error if `user_count` is outside 2..=9, `content_type` is not
    /// `json`, or the matrix is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !USER_COUNT_RANGE.contains(&self.user_count) {
            return Err(ConfigError::UserCount(self.user_count));
        }
        if self.content_type != "json" {
            return Err(ConfigError::ContentType(self.content_type.clone()));
        }
        if self.auth_matrix.is_empty() {
            return Err(ConfigError::EmptyMatrix);
        }
        Ok(())
    }

    /// Starting matrix for `catalog`: `user_1` allowed, every other identity
    /// denied, `http_code` 200 on success and 403 when blocked.
    ///
    /// # Errors
    ///
    /// Returns error if `user_count` is outside 2..=9.
    pub fn scaffold(catalog: &[RequestDescriptor], user_count: u8) -> Result<Self, ConfigError> {
        if !USER_COUNT_RANGE.contains(&user_count) {
            return Err(ConfigError::UserCount(user_count));
        }

        let success = CheckSpec("http_code".into(), Value::from(200));
        let blocked = CheckSpec("http_code".into(), Value::from(403));
        let mut auth_matrix = AuthMatrix::default();
        for descriptor in catalog {
            let names: Vec<String> = (1..=usize::from(user_count)).map(identity_name).collect();
            let entry = MatrixEntry::new(
                names.iter().enumerate().map(|(i, name)| (name.as_str(), i == 0)),
                &success,
                &blocked,
            );
            auth_matrix
                .0
                .entry(descriptor.path.clone())
                .or_default()
                .insert(descriptor.method.clone(), entry);
        }

        Ok(Self {
            user_count,
            auth_matrix,
            ..Self::default()
        })
    }

    /// Write the config to `path` (TOML for `.toml`, pretty JSON otherwise).
    ///
    /// # Errors
    ///
    /// Refuses to overwrite an existing file; returns I/O or encoding errors.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let content = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Encode(e.to_string()))?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Encode(e.to_string()))?
        };
        tracing::info!(path = %path.display(), "writing authorization matrix");
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))
    }
}

/// JSON Schema of the config file.
///
/// # Errors
///
/// Returns error if the schema cannot be serialized.
pub fn generate_config_schema() -> serde_json::Result<String> {
    let schema = schemars::schema_for!(KnockConfig);
    serde_json::to_string_pretty(&schema)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("No config file found (looked for {0:?})")]
    NotFound(Vec<String>),
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("user_count must be between 2 and 9, got {0}")]
    UserCount(u8),
    #[error("content_type \"{0}\" is not supported (only \"json\")")]
    ContentType(String),
    #[error("auth_matrix is missing or empty")]
    EmptyMatrix,
}

//! apiknock-core: authorization-matrix testing without I/O
//!
//! Turns a resolved API description into one representative request per
//! operation, and holds everything needed to judge the responses: the
//! authorization matrix, response checks, and the outcome log.
//!
//! Sending requests and loading API descriptions live in `apiknock-runner`.

pub mod catalog;
pub mod check;
pub mod identity;
pub mod matrix;
pub mod outcome;
pub mod plan;
pub mod schema;
pub mod spec;
pub mod synth;

pub use catalog::{ParamLocation, ParameterSet, RequestDescriptor, SpecError};
pub use check::{Check, CheckError, CheckKind, CheckResult, Response};
pub use identity::{Credential, Identities};
pub use matrix::{
    AuthMatrix, CheckSpec, ConfigError, EntryError, KnockConfig, MatrixEntry, MatrixLookup,
};
pub use outcome::{Classification, KnockReport, Outcome, ResultSet, Summary, Verdict, VerdictStatus};
pub use plan::Plan;
pub use schema::{SchemaError, SchemaNode};
pub use spec::{OperationDecl, ParameterDecl, RequestBodyDecl, ResolvedSpec};
pub use synth::synthesize;

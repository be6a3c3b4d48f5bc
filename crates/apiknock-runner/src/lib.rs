//! apiknock-runner: loading API descriptions and knocking on a live API

pub mod engine;
pub mod loader;
pub mod requester;

pub use engine::{FireReport, FiredRequest, RunConfig, TestEngine, build_request, fire};
pub use loader::{LoadError, load};
pub use requester::{AuthMode, HttpRequester, OutboundRequest, Requester, TransportError};

//! Observability for provisioning and consumer construction
//!
//! Structured logging via `tracing`; see [`logging`].

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{consumer_span, provision_span};

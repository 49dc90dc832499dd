//! Logging and tracing bootstrap shared by `movies-proxy` and `events-relay`.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{LogFormat, OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};

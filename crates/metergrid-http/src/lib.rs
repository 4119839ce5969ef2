//! metergrid-http — the exporter facade and scrape endpoint.
//!
//! Bridges observation events to the core metric store and serves
//! the aggregate state as a Prometheus text exposition over HTTP.
//!
//! # Architecture
//!
//! ```text
//! Exporter (implements Recorder)
//!   ├── record() ← one call per observation, any thread
//!   │     ├── validates + canonicalizes labels (pooled scratch)
//!   │     └── every 10,000th call evicts idle series
//!   └── render_into() → text exposition document
//!
//! router() / serve_metrics()
//!   └── GET/HEAD /metrics → 200 (gzip-negotiated), others → 405
//! ```

pub mod config;
pub mod exporter;
pub mod handler;
mod pool;

pub use config::{ConfigError, ExporterConfig};
pub use exporter::Exporter;
pub use handler::{router, serve_metrics};

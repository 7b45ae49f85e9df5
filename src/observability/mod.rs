//! Observability for the bitmap index
//!
//! - Structured JSON logging, one line per event
//! - BEGIN / COMPLETE / FAILED scopes around builds, recovery and commands
//! - Per-index counters
//!
//! Observability is read-only: nothing here changes a result.

mod logger;
mod metrics;
mod scope;

pub use logger::{Logger, Severity};
pub use metrics::{BitmapMetrics, MetricsSnapshot};
pub use scope::ObservationScope;

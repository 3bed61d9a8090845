//! JaRules Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Child processes
//! - Async runtimes
//! - UI toolkits
//!
//! All types here describe what the bridge exchanges with its workers and
//! with the UI shell that drives it.

pub mod diagnostic;
pub mod error;
pub mod event;
pub mod ids;
pub mod model;
pub mod status;

// Re-export commonly used types
pub use diagnostic::{now_timestamp, DiagnosticResult, DiagnosticStatus};
pub use error::{CoreError, FailureKind};
pub use event::{BridgeEvent, DoneSummary};
pub use ids::SessionId;
pub use model::ModelInfo;
pub use status::SessionState;

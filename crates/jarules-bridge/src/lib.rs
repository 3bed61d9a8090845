//! JaRules Bridge
//!
//! The process bridge between a chat UI shell and the JaRules Python agent.
//! One `BridgeContext` holds everything the bridge shares between requests:
//!
//! - `ModelCache`: available models and the active model id
//! - `SessionManager`: the single streaming prompt slot
//! - `HistoryClient`: chat history relay
//! - `DiagnosticsRunner`: ordered environment checks
//!
//! `Router` turns named UI operations into calls on the context and shapes
//! the answers. Streaming output is delivered on the event channel returned
//! by `BridgeContext::new`.
//!
//! # Example
//!
//! ```rust,no_run
//! use jarules_bridge::{BridgeConfig, BridgeContext, Request, Router};
//!
//! async fn run() {
//!     let (ctx, mut events) = BridgeContext::new(BridgeConfig::default());
//!     ctx.initialize().await;
//!
//!     let router = Router::new(ctx.clone());
//!     let models = router.dispatch(Request::ListModels).await;
//!     println!("{}", models);
//!
//!     router
//!         .dispatch(Request::SendPromptStreaming { prompt: "Hello".to_string() })
//!         .await;
//!     while let Some(event) = events.recv().await {
//!         let done = event.is_done();
//!         println!("{}", serde_json::to_string(&event).unwrap());
//!         if done {
//!             break;
//!         }
//!     }
//!
//!     ctx.shutdown().await;
//! }
//! ```

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod history;
pub mod models;
pub mod router;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{BridgeConfig, DiagnosticTask, WorkerTask};
pub use context::BridgeContext;
pub use diagnostics::DiagnosticsRunner;
pub use error::BridgeError;
pub use history::HistoryClient;
pub use models::ModelCache;
pub use router::{rejection, Request, Router};
pub use session::{SessionManager, SessionSnapshot};

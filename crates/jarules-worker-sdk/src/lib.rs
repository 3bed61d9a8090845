//! Worker SDK for the JaRules bridge
//!
//! This crate runs external worker scripts and turns their line-delimited
//! JSON stdout into typed values. Two execution modes are provided:
//!
//! - [`WorkerInvoker`]: one-shot. Runs a script to completion and resolves to
//!   an [`InvocationResult`]; it never returns an error.
//! - [`StreamingWorker`]: long-running. Relays every stdout line to a
//!   [`MessageHandler`] and can be interrupted through its [`WorkerHandle`].
//!
//! # Example
//!
//! ```rust,no_run
//! use jarules_worker_sdk::{InvocationResult, WorkerCommand, WorkerInvoke, WorkerInvoker};
//!
//! async fn list_models() {
//!     let invoker = WorkerInvoker::new(
//!         WorkerCommand::default().with_scripts_dir("jarules_agent/electron_bridge"),
//!     );
//!
//!     match invoker.invoke("get_available_models_wrapper.py", &[]).await {
//!         InvocationResult::Success(payload) => println!("{}", payload),
//!         InvocationResult::Failure(failure) => eprintln!("{}", failure),
//!     }
//! }
//! ```

mod client;
mod command;
mod error;
mod invoker;
mod signal;
mod stream;
mod types;

// Re-export main types
pub use client::ChannelHandler;
pub use command::WorkerCommand;
pub use error::{SignalError, WorkerError};
pub use invoker::{
    first_json_payload, InvocationFailure, InvocationResult, WorkerInvoke, WorkerInvoker,
};
pub use stream::{MessageHandler, RunningWorker, StreamExit, StreamingWorker, WorkerHandle};
pub use types::WorkerMessage;

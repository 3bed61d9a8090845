//! Scripted in-memory workers for bridge tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use jarules_worker_sdk::{InvocationFailure, InvocationResult, WorkerInvoke};

type Responder = Box<dyn Fn(&[String]) -> InvocationResult + Send + Sync>;

/// A `WorkerInvoke` that answers from a per-script table and records calls.
///
/// Scripts without a response behave like a missing interpreter.
#[derive(Default)]
pub(crate) struct FakeInvoker {
    responders: Mutex<HashMap<String, Responder>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeInvoker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Always answer `script` with `result`.
    pub(crate) fn respond(&self, script: &str, result: InvocationResult) {
        self.respond_with(script, move |_| result.clone());
    }

    /// Answer `script` by calling `f` with the invocation arguments.
    pub(crate) fn respond_with<F>(&self, script: &str, f: F)
    where
        F: Fn(&[String]) -> InvocationResult + Send + Sync + 'static,
    {
        self.responders
            .lock()
            .unwrap()
            .insert(script.to_string(), Box::new(f));
    }

    pub(crate) fn calls(&self, script: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == script)
            .count()
    }

    pub(crate) fn last_args(&self, script: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(s, _)| s == script)
            .map(|(_, args)| args.clone())
            .unwrap_or_default()
    }

    /// Scripts in the order they were invoked.
    pub(crate) fn call_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| s.clone())
            .collect()
    }
}

#[async_trait]
impl WorkerInvoke for FakeInvoker {
    async fn invoke(&self, script: &str, args: &[String]) -> InvocationResult {
        self.calls
            .lock()
            .unwrap()
            .push((script.to_string(), args.to_vec()));

        match self.responders.lock().unwrap().get(script) {
            Some(responder) => responder(args),
            None => InvocationResult::Failure(InvocationFailure::transport(
                format!("Failed to start worker '{}'", script),
                Some("No such file or directory (os error 2)".to_string()),
            )),
        }
    }
}

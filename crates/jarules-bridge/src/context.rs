//! The bridge context: every piece of shared bridge state, built once.

use std::sync::Arc;

use jarules_core::BridgeEvent;
use jarules_worker_sdk::{InvocationResult, StreamingWorker, WorkerInvoke, WorkerInvoker};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{BridgeConfig, WorkerTask};
use crate::diagnostics::DiagnosticsRunner;
use crate::history::HistoryClient;
use crate::models::ModelCache;
use crate::session::SessionManager;

pub struct BridgeContext {
    config: BridgeConfig,
    invoker: Arc<dyn WorkerInvoke>,
    pub models: ModelCache,
    pub sessions: SessionManager,
    pub history: HistoryClient,
    pub diagnostics: DiagnosticsRunner,
}

impl BridgeContext {
    /// Create the context and the receiving end of the UI event channel.
    pub fn new(config: BridgeConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<BridgeEvent>) {
        let invoker = Arc::new(WorkerInvoker::new(config.worker_command()));
        Self::with_invoker(config, invoker)
    }

    /// Like `new`, with one-shot workers served by `invoker`.
    pub fn with_invoker(
        config: BridgeConfig,
        invoker: Arc<dyn WorkerInvoke>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let streaming = StreamingWorker::new(config.worker_command())
            .with_idle_timeout(config.stream_idle_timeout);

        let ctx = Arc::new(Self {
            models: ModelCache::new(invoker.clone(), &config),
            sessions: SessionManager::new(
                streaming,
                config.script(WorkerTask::SendPrompt),
                events_tx,
            ),
            history: HistoryClient::new(invoker.clone(), &config),
            diagnostics: DiagnosticsRunner::new(invoker.clone(), config.diagnostics.clone()),
            invoker,
            config,
        });

        (ctx, events_rx)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Fetch the model list and active model.
    pub async fn initialize(&self) {
        info!(scripts_dir = %self.config.scripts_dir.display(), "Initializing bridge");
        self.models.initialize().await;
    }

    /// Run a one-shot worker task.
    pub async fn invoke(&self, task: WorkerTask, args: &[String]) -> InvocationResult {
        self.invoker.invoke(self.config.script(task), args).await
    }

    /// Interrupt any live session. The context stays usable.
    pub async fn shutdown(&self) {
        info!("Shutting down bridge");
        self.sessions.shutdown().await;
    }
}

//! Ready-to-use `MessageHandler` implementations.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::WorkerError;
use crate::stream::MessageHandler;
use crate::types::WorkerMessage;

/// A handler that forwards every worker message to a channel.
///
/// Useful when the consumer wants to pull messages rather than react to
/// them inline.
pub struct ChannelHandler {
    message_tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl ChannelHandler {
    /// Create a new handler with a message receiver.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { message_tx: tx }, rx)
    }
}

#[async_trait]
impl MessageHandler for ChannelHandler {
    async fn on_message(&self, message: WorkerMessage) -> Result<(), WorkerError> {
        trace!(message_type = message.kind(), "Forwarding worker message");
        // Receiver might be dropped
        self.message_tx.send(message).ok();
        Ok(())
    }
}

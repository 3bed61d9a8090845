//! Request loop.
//!
//! Reads request lines until EOF and answers each one from its own task, so
//! a slow worker never holds up the next request. One writer task owns the
//! output stream; responses and events reach it through a channel.

use std::sync::Arc;
use std::time::Duration;

use jarules_bridge::{BridgeContext, Router};
use jarules_core::{BridgeEvent, SessionState};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::protocol::{encode_event, encode_response, parse_request, Incoming, Response};

/// Time allowed for an interrupted session to report its final events.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub async fn serve<R, W>(
    ctx: Arc<BridgeContext>,
    mut events: mpsc::UnboundedReceiver<BridgeEvent>,
    input: R,
    output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(output, line_rx));

    let event_tx = line_tx.clone();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let forwarder = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => forward_event(&event_tx, &event),
                _ = &mut stop_rx => break,
            }
        }
        while let Ok(event) = events.try_recv() {
            forward_event(&event_tx, &event);
        }
    });

    let router = Router::new(ctx.clone());
    let mut requests = JoinSet::new();
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_request(line) {
            Incoming::Request { id, request } => {
                let router = router.clone();
                let line_tx = line_tx.clone();
                requests.spawn(async move {
                    let op = request.op();
                    let expects_response = request.expects_response();
                    let result = router.dispatch(request).await;
                    if expects_response {
                        send_response(&line_tx, Response { id, result });
                    } else {
                        debug!(op = op, "Fire-and-forget request accepted");
                    }
                });
            }
            Incoming::Rejected(response) => {
                warn!(id = %response.id, "Rejected request line");
                send_response(&line_tx, response);
            }
        }

        while let Some(joined) = requests.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Request task failed");
            }
        }
    }

    info!("Input closed");
    while let Some(joined) = requests.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Request task failed");
        }
    }

    ctx.shutdown().await;
    wait_for_idle(&ctx).await;

    let _ = stop_tx.send(());
    if let Err(e) = forwarder.await {
        error!(error = %e, "Event forwarder failed");
    }
    drop(line_tx);

    match writer.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Writer task failed");
            Ok(())
        }
    }
}

fn forward_event(line_tx: &mpsc::UnboundedSender<String>, event: &BridgeEvent) {
    match encode_event(event) {
        Ok(line) => {
            if line_tx.send(line).is_err() {
                warn!("Output closed, dropping event");
            }
        }
        Err(e) => error!(error = %e, "Failed to encode event"),
    }
}

fn send_response(line_tx: &mpsc::UnboundedSender<String>, response: Response) {
    match encode_response(&response) {
        Ok(line) => {
            if line_tx.send(line).is_err() {
                warn!("Output closed, dropping response");
            }
        }
        Err(e) => error!(error = %e, "Failed to encode response"),
    }
}

async fn wait_for_idle(ctx: &BridgeContext) {
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while ctx.sessions.snapshot().await.state != SessionState::Idle {
        if tokio::time::Instant::now() >= deadline {
            warn!("Session still live at exit");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn write_lines<W>(mut output: W, mut lines: mpsc::UnboundedReceiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    output.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarules_bridge::BridgeConfig;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, BufReader};

    async fn run_session(input: &'static str) -> Vec<Value> {
        let config = BridgeConfig {
            interpreter: "/nonexistent/interpreter-for-tests".to_string(),
            ..Default::default()
        };
        let (ctx, events) = BridgeContext::new(config);
        let (client, server) = tokio::io::duplex(64 * 1024);

        serve(ctx, events, BufReader::new(input.as_bytes()), server)
            .await
            .unwrap();

        let mut output = String::new();
        let mut client = client;
        client.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_requests_get_matching_responses() {
        let lines = run_session(concat!(
            "{\"id\": 1, \"op\": \"get-session-state\"}\n",
            "\n",
            "this is not json\n",
            "{\"id\": 2, \"op\": \"launch-rockets\"}\n",
            "{\"id\": 3, \"op\": \"history-add\", \"args\": {\"message\": {\"text\": \"hi\"}}}\n",
            "{\"id\": 4, \"op\": \"list-models\"}\n",
        ))
        .await;

        assert_eq!(lines.len(), 4);
        let by_id = |id: Value| {
            lines
                .iter()
                .find(|line| line["id"] == id)
                .unwrap_or_else(|| panic!("no response for id {}", id))
        };
        assert_eq!(by_id(Value::from(1))["result"]["state"], "idle");
        assert_eq!(by_id(Value::Null)["result"]["success"], false);
        assert_eq!(by_id(Value::from(2))["result"]["kind"], "protocol");
        assert_eq!(by_id(Value::from(4))["result"], Value::Array(vec![]));
        assert!(lines.iter().all(|line| line["id"] != Value::from(3)));
    }

    #[tokio::test]
    async fn test_prompt_without_model_emits_events() {
        let lines = run_session("{\"id\": 1, \"op\": \"send-prompt-streaming\", \"args\": {\"prompt\": \"hi\"}}\n").await;

        let events: Vec<&str> = lines
            .iter()
            .filter_map(|line| line["event"].as_str())
            .collect();
        assert_eq!(events, vec!["stream-error", "stream-done"]);

        let response = lines.iter().find(|line| line["id"] == 1).unwrap();
        assert_eq!(response["result"]["code"], "no_active_model");
    }
}

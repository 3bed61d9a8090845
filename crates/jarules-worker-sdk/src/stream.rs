//! Streaming worker execution.
//!
//! A streaming worker prints one JSON message per line for as long as it
//! runs. Every line is significant and is handed to a `MessageHandler` in
//! the order it was written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::command::WorkerCommand;
use crate::error::{SignalError, WorkerError};
use crate::signal;
use crate::types::WorkerMessage;

/// Number of stderr lines kept for failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// Receives the messages of a streaming worker.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called once per decoded stdout line, in emission order.
    async fn on_message(&self, message: WorkerMessage) -> Result<(), WorkerError>;
}

/// How a streaming worker's process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamExit {
    /// Exit status zero.
    Clean,
    /// Non-zero exit or death by signal.
    Failed {
        code: Option<i32>,
        stderr: String,
    },
    /// No stdout line within the idle deadline; the process was killed.
    TimedOut { idle: Duration },
    /// Reading stdout or reaping the child failed.
    Io(String),
}

impl StreamExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Human-readable description for error events.
    pub fn describe(&self) -> String {
        match self {
            Self::Clean => "Worker exited cleanly".to_string(),
            Self::Failed { code: Some(code), .. } => format!("Worker exited with code {}", code),
            Self::Failed { code: None, .. } => "Worker was terminated by a signal".to_string(),
            Self::TimedOut { idle } => format!(
                "Worker produced no output for {} seconds and was terminated",
                idle.as_secs()
            ),
            Self::Io(e) => format!("Lost connection to worker: {}", e),
        }
    }
}

/// Handle used to interrupt a running streaming worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// True once the process has been reaped.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Deliver a cooperative interrupt to the worker.
    pub fn interrupt(&self) -> Result<(), SignalError> {
        if self.has_exited() {
            return Err(SignalError::AlreadyTerminated);
        }
        let pid = self.pid.ok_or(SignalError::AlreadyTerminated)?;
        info!(pid = pid, "Interrupting worker");
        signal::interrupt(pid)
    }
}

/// A spawned streaming worker.
pub struct RunningWorker {
    handle: WorkerHandle,
    task: JoinHandle<StreamExit>,
}

impl RunningWorker {
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Wait until stdout is drained and the process is reaped.
    pub async fn wait(self) -> StreamExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(error = %e, "Worker supervision task failed");
                StreamExit::Io(e.to_string())
            }
        }
    }
}

/// Launches streaming workers.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use jarules_worker_sdk::{ChannelHandler, StreamingWorker, WorkerCommand};
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let worker = StreamingWorker::new(WorkerCommand::default());
///     let (handler, mut rx) = ChannelHandler::new();
///
///     let running = worker.spawn(
///         "send_prompt_wrapper.py",
///         &["hello".to_string(), "ollama_default_local".to_string()],
///         Arc::new(handler),
///     )?;
///
///     while let Some(message) = rx.recv().await {
///         println!("{:?}", message);
///     }
///     println!("{:?}", running.wait().await);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StreamingWorker {
    command: WorkerCommand,
    idle_timeout: Option<Duration>,
}

impl StreamingWorker {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            idle_timeout: None,
        }
    }

    /// Kill the worker if it stays silent for longer than `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Spawn `script` and start relaying its messages to `handler`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        &self,
        script: &str,
        args: &[String],
        handler: Arc<dyn MessageHandler>,
    ) -> Result<RunningWorker, WorkerError> {
        info!(
            script = %script,
            interpreter = %self.command.interpreter(),
            idle_timeout_secs = ?self.idle_timeout.map(|d| d.as_secs()),
            "Spawning streaming worker"
        );

        let child = self
            .command
            .build(script, args)
            .spawn()
            .map_err(|source| {
                error!(script = %script, error = %source, "Failed to spawn streaming worker");
                WorkerError::Spawn {
                    script: script.to_string(),
                    source,
                }
            })?;

        let pid = child.id();
        info!(script = %script, pid = ?pid, "Streaming worker spawned");

        let exited = Arc::new(AtomicBool::new(false));
        let handle = WorkerHandle {
            pid,
            exited: exited.clone(),
        };

        let script = script.to_string();
        let idle_timeout = self.idle_timeout;
        let task = tokio::spawn(async move {
            let exit = supervise(&script, child, handler, idle_timeout, exited).await;
            info!(script = %script, exit = ?exit, "Streaming worker finished");
            exit
        });

        Ok(RunningWorker { handle, task })
    }
}

/// Drain stdout into the handler while a separate waiter reaps the child.
///
/// The waiter marks the handle as exited the moment the process is reaped,
/// even if a grandchild still holds stdout open.
async fn supervise(
    script: &str,
    mut child: Child,
    handler: Arc<dyn MessageHandler>,
    idle_timeout: Option<Duration>,
    exited: Arc<AtomicBool>,
) -> StreamExit {
    let stdout = child.stdout.take();
    let stderr_task = child.stderr.take().map(|stderr| {
        let script = script.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: Vec<String> = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                warn!(script = %script, stderr = %trimmed, "Worker stderr");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(trimmed.to_string());
            }
            tail.join("\n")
        })
    });

    let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
    let mut waiter = tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = &mut kill_rx => {
                if let Err(e) = child.kill().await {
                    error!(error = %e, "Failed to kill worker");
                }
                child.wait().await
            }
        };
        exited.store(true, Ordering::SeqCst);
        status
    });

    let Some(stdout) = stdout else {
        let _ = kill_tx.send(());
        let _ = waiter.await;
        return StreamExit::Io("worker stdout was not captured".to_string());
    };

    let mut lines = BufReader::new(stdout).lines();
    let mut message_count = 0u64;

    loop {
        let next = match idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, lines.next_line()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(
                        script = %script,
                        idle_secs = idle.as_secs(),
                        "Worker went silent past the idle deadline, killing it"
                    );
                    let _ = kill_tx.send(());
                    let _ = waiter.await;
                    return StreamExit::TimedOut { idle };
                }
            },
            None => lines.next_line().await,
        };

        match next {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                message_count += 1;
                trace!(script = %script, raw = %trimmed, "Worker stdout");

                match WorkerMessage::parse_line(trimmed) {
                    Ok(message) => {
                        debug!(
                            message_num = message_count,
                            message_type = message.kind(),
                            "Parsed worker message"
                        );
                        if let Err(e) = handler.on_message(message).await {
                            warn!(error = %e, "Handler error processing message");
                        }
                    }
                    Err(e) => {
                        let preview: String = trimmed.chars().take(200).collect();
                        warn!(error = %e, preview = %preview, "Failed to parse worker message");
                    }
                }
            }
            Ok(None) => {
                debug!(total_messages = message_count, "Worker stdout closed (EOF)");
                break;
            }
            Err(e) => {
                error!(script = %script, error = %e, "Error reading worker stdout");
                let _ = kill_tx.send(());
                let _ = waiter.await;
                return StreamExit::Io(e.to_string());
            }
        }
    }

    // A worker may close stdout and keep running; the idle deadline still holds.
    let joined = match idle_timeout {
        Some(idle) => match tokio::time::timeout(idle, &mut waiter).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    script = %script,
                    idle_secs = idle.as_secs(),
                    "Worker closed stdout but did not exit, killing it"
                );
                let _ = kill_tx.send(());
                let _ = waiter.await;
                return StreamExit::TimedOut { idle };
            }
        },
        None => waiter.await,
    };

    let status = match joined {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => return StreamExit::Io(e.to_string()),
        Err(e) => return StreamExit::Io(e.to_string()),
    };

    let stderr = match stderr_task {
        Some(task) => match tokio::time::timeout(Duration::from_secs(1), task).await {
            Ok(Ok(tail)) => tail,
            _ => String::new(),
        },
        None => String::new(),
    };

    if status.success() {
        StreamExit::Clean
    } else {
        StreamExit::Failed {
            code: status.code(),
            stderr,
        }
    }
}

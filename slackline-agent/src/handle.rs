// ABOUTME: AgentHandle provides a cloneable Send+Sync front for any backend.
// ABOUTME: Uses channels to talk to a worker task; each prompt runs on its own task.

use crate::{AgentBackend, AgentEvent, PromptRequest};
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Commands sent from AgentHandle to the backend worker
#[derive(Debug)]
pub enum Command {
    Prompt {
        request: PromptRequest,
        event_tx: mpsc::Sender<AgentEvent>,
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        session_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Send + Sync handle the relay interacts with.
///
/// Internally communicates with a worker task that owns the backend, so a
/// turn blocked on a long tool call never blocks other turns.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<Command>,
    name: &'static str,
}

impl AgentHandle {
    /// Create a new AgentHandle with the given command channel and backend name
    pub fn new(tx: mpsc::Sender<Command>, name: &'static str) -> Self {
        Self { tx, name }
    }

    /// Run `backend` on a worker task and return a handle to it.
    ///
    /// Every prompt is served on its own task so concurrent conversations
    /// stay independent.
    pub fn spawn<B>(backend: B) -> Self
    where
        B: AgentBackend + Send + Sync + 'static,
    {
        let backend = Arc::new(backend);
        let name = backend.name();
        let (tx, mut rx) = mpsc::channel::<Command>(32);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                let backend = Arc::clone(&backend);
                match cmd {
                    Command::Prompt {
                        request,
                        event_tx,
                        reply,
                    } => {
                        tokio::spawn(async move {
                            let mut stream = match backend.prompt(&request).await {
                                Ok(stream) => {
                                    let _ = reply.send(Ok(()));
                                    stream
                                }
                                Err(e) => {
                                    let _ = reply.send(Err(e));
                                    return;
                                }
                            };
                            while let Some(event) = stream.next().await {
                                if event_tx.send(event).await.is_err() {
                                    tracing::debug!(
                                        backend = name,
                                        session_id = %request.session_id,
                                        "Event receiver dropped, abandoning prompt stream"
                                    );
                                    break;
                                }
                            }
                        });
                    }
                    Command::Cancel { session_id, reply } => {
                        tokio::spawn(async move {
                            let _ = reply.send(backend.cancel(&session_id).await);
                        });
                    }
                }
            }
            tracing::debug!(backend = name, "Agent worker shut down");
        });

        Self::new(tx, name)
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Send a prompt and receive events via EventReceiver
    pub async fn prompt(&self, request: PromptRequest) -> Result<EventReceiver> {
        let (event_tx, event_rx) = mpsc::channel(2048);
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Command::Prompt {
                request,
                event_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker closed"))?;

        // Wait for the backend to acknowledge the prompt started
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker dropped reply channel"))??;

        Ok(EventReceiver::new(event_rx))
    }

    /// Cancel an in-progress prompt
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Cancel {
                session_id: session_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker dropped reply channel"))?
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle").field("name", &self.name).finish()
    }
}

/// Receiver for streaming events from a prompt.
///
/// This is `Send` so it can be passed across async task boundaries.
pub struct EventReceiver {
    rx: mpsc::Receiver<AgentEvent>,
}

impl EventReceiver {
    /// Create a new EventReceiver wrapping the given channel
    pub fn new(rx: mpsc::Receiver<AgentEvent>) -> Self {
        Self { rx }
    }

    /// Build a receiver that replays a fixed list of events
    pub fn from_events(events: Vec<AgentEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // Capacity covers every event, so this never fails
            let _ = tx.try_send(event);
        }
        Self { rx }
    }

    /// Receive the next event, or None if the stream is closed
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        self.rx.try_recv().ok()
    }
}

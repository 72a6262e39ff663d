// ABOUTME: Mock backend for testing - returns pre-configured event scripts.
// ABOUTME: Allows deterministic relay tests without a real model behind the handle.
//!
//! # Example
//!
//! ```no_run
//! use slackline_agent::backends::mock::MockBackend;
//! use slackline_agent::{AgentEvent, PromptRequest, ToolContext};
//!
//! # async fn example() {
//! let mock = MockBackend::new()
//!     .on_prompt("hello").respond_stream(&["Hel", "lo ", "there"]);
//!
//! let handle = mock.into_handle();
//! let request = PromptRequest::new("hello", ToolContext::new("C1", "1.0"));
//! let mut receiver = handle.prompt(request).await.unwrap();
//!
//! while let Some(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use crate::event::{AgentEvent, ErrorCode};
use crate::handle::{AgentHandle, Command};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock backend for testing
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

struct Expectation {
    pattern: String,
    events: Vec<AgentEvent>,
}

impl MockBackend {
    /// Create a new mock backend with no expectations
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Set up an expectation for a prompt matching the given pattern
    pub fn on_prompt(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: pattern.to_string(),
        }
    }

    /// Convert this backend into an AgentHandle
    pub fn into_handle(self) -> AgentHandle {
        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let name = "mock";
        let expectations = self.expectations;

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Prompt {
                        request,
                        event_tx,
                        reply,
                    } => {
                        let _ = reply.send(Ok(()));

                        // FIFO preference: check the front first, fall back to
                        // searching the queue if the front doesn't match.
                        let events = {
                            let mut exp = expectations.lock().unwrap_or_else(|e| e.into_inner());
                            match exp.front() {
                                Some(front) if request.text.contains(&front.pattern) => {
                                    exp.pop_front().map(|e| e.events)
                                }
                                Some(_) => exp
                                    .iter()
                                    .position(|e| request.text.contains(&e.pattern))
                                    .and_then(|i| exp.remove(i))
                                    .map(|e| e.events),
                                None => None,
                            }
                        };

                        let events = events.unwrap_or_else(|| {
                            vec![AgentEvent::Result {
                                text: format!("Mock: no expectation for '{}'", request.text),
                                usage: None,
                                metadata: serde_json::json!({}),
                            }]
                        });

                        for event in events {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Command::Cancel { reply, .. } => {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
        });

        AgentHandle::new(tx, name)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: String,
}

impl ExpectationBuilder {
    /// Respond with a list of events
    pub fn respond_with(self, events: Vec<AgentEvent>) -> MockBackend {
        self.backend
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                pattern: self.pattern,
                events,
            });
        self.backend
    }

    /// Respond with a bare result (no streamed text)
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.respond_with(vec![AgentEvent::Result {
            text: text.to_string(),
            usage: None,
            metadata: serde_json::json!({}),
        }])
    }

    /// Respond with one text segment streamed as the given chunks
    pub fn respond_stream(self, chunks: &[&str]) -> MockBackend {
        let mut events = vec![AgentEvent::TextStart {
            id: "text-1".to_string(),
        }];
        events.extend(chunks.iter().map(|c| AgentEvent::Text(c.to_string())));
        events.push(AgentEvent::TextEnd {
            id: "text-1".to_string(),
        });
        events.push(AgentEvent::Result {
            text: chunks.concat(),
            usage: None,
            metadata: serde_json::json!({}),
        });
        self.respond_with(events)
    }

    /// Respond with an error
    pub fn respond_error(self, code: ErrorCode, message: &str) -> MockBackend {
        self.respond_with(vec![AgentEvent::Error {
            code,
            message: message.to_string(),
            recoverable: false,
        }])
    }
}

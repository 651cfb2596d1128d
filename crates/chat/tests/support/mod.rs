#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use lumen_chat::{ChatSession, ScrollMetrics, Viewport};
use lumen_llm::{
    BoxFuture, ChatConnection, ChatRequest, LlmProvider, Model, ProviderError, ProviderResult,
    ProviderStreamHandle, ProviderWorker, StreamEvent, StreamEventPayload, make_event_stream,
};

/// How a scripted reply ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    Done,
    Error(String),
    /// The provider refuses to open the request.
    Refuse,
    /// The event stream closes without `Done` or `Error`.
    Hangup,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub chunks: Vec<String>,
    pub ending: Ending,
}

impl Reply {
    pub fn ok(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|chunk| chunk.to_string()).collect(),
            ending: Ending::Done,
        }
    }

    pub fn failing_after(chunks: &[&str]) -> Self {
        Self {
            ending: Ending::Error("connection reset".to_string()),
            ..Self::ok(chunks)
        }
    }

    pub fn refused() -> Self {
        Self {
            ending: Ending::Refuse,
            ..Self::ok(&[])
        }
    }

    pub fn hangup_after(chunks: &[&str]) -> Self {
        Self {
            ending: Ending::Hangup,
            ..Self::ok(chunks)
        }
    }
}

/// Provider that plays back queued replies in order.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, request: ChatRequest) -> Reply {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::ok(&[]))
    }
}

impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn models(&self) -> &[Model] {
        &[]
    }

    fn complete<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, ProviderResult<String>> {
        let stream_id = request.stream_id;
        let reply = self.next_reply(request);
        Box::pin(async move {
            match reply.ending {
                Ending::Done => Ok(reply.chunks.concat()),
                _ => Err(ProviderError::StreamClosed {
                    stage: "scripted-complete",
                    stream_id,
                }),
            }
        })
    }

    fn stream_chat(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle> {
        let stream_id = request.stream_id;
        let reply = self.next_reply(request);
        if reply.ending == Ending::Refuse {
            return Err(ProviderError::MissingApiKey {
                stage: "scripted-stream",
                provider_id: "scripted".to_string(),
            });
        }

        let (event_tx, stream, _cancel_rx) = make_event_stream(stream_id);
        let worker: ProviderWorker = Box::pin(async move {
            let _ = event_tx.send(StreamEvent::new(stream_id, StreamEventPayload::Opened));
            for chunk in reply.chunks {
                let _ = event_tx.send(StreamEvent::delta(stream_id, chunk));
                tokio::task::yield_now().await;
            }
            match reply.ending {
                Ending::Done => {
                    let _ = event_tx.send(StreamEvent::new(stream_id, StreamEventPayload::Done));
                }
                Ending::Error(message) => {
                    let _ = event_tx.send(StreamEvent::new(
                        stream_id,
                        StreamEventPayload::Error(message),
                    ));
                }
                Ending::Refuse | Ending::Hangup => {}
            }
        });

        Ok(ProviderStreamHandle { stream, worker })
    }
}

/// Viewport whose content grows by a fixed amount per transcript change.
#[derive(Debug, Clone, PartialEq)]
pub struct TestViewport {
    pub metrics: ScrollMetrics,
    pub scroll_calls: usize,
}

impl TestViewport {
    pub fn new() -> Self {
        Self {
            metrics: ScrollMetrics::new(0.0, 400.0, 400.0),
            scroll_calls: 0,
        }
    }

    pub fn grow(&mut self, pixels: f32) {
        self.metrics.scroll_height += pixels;
    }

    pub fn scroll_to(&mut self, scroll_top: f32) {
        self.metrics.scroll_top = scroll_top;
    }

    pub fn is_at_bottom(&self) -> bool {
        self.metrics.scroll_top == self.metrics.max_scroll_top()
    }
}

impl Viewport for TestViewport {
    fn metrics(&self) -> ScrollMetrics {
        self.metrics
    }

    fn set_scroll_top(&mut self, scroll_top: f32) {
        self.metrics.scroll_top = scroll_top;
        self.scroll_calls += 1;
    }
}

pub fn session_with(replies: Vec<Reply>) -> (ChatSession<TestViewport>, Arc<ScriptedProvider>) {
    let provider = ScriptedProvider::new(replies);
    let connection = ChatConnection::new(provider.clone(), "scripted-model", Vec::new());
    (ChatSession::new(connection, TestViewport::new()), provider)
}

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};

use super::provider::{
    ChatRequest, LlmProvider, ProviderError, ProviderEventStream, ProviderMessage, ProviderResult,
    ProviderStreamHandle, ProviderWorker, StreamEvent, StreamEventPayload, StreamId,
    make_event_stream,
};

/// How a reply is delivered back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Incremental chunks as the provider produces them.
    #[default]
    Streaming,
    /// One complete reply delivered as a single delta.
    SingleShot,
}

/// A backend chat session: one model plus the turns exchanged so far.
///
/// History only grows after a reply finishes successfully, so a failed request
/// never leaves a dangling user turn behind.
#[derive(Clone)]
pub struct ChatConnection {
    provider: Arc<dyn LlmProvider>,
    model_id: String,
    history: Arc<RwLock<Vec<ProviderMessage>>>,
}

impl ChatConnection {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model_id: impl Into<String>,
        history: Vec<ProviderMessage>,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            history: Arc::new(RwLock::new(history)),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub async fn history(&self) -> Vec<ProviderMessage> {
        self.history.read().await.clone()
    }

    async fn build_request(&self, stream_id: StreamId, text: &str) -> ChatRequest {
        let mut messages = self.history.read().await.clone();
        messages.push(ProviderMessage::user(text));
        ChatRequest::new(stream_id, self.model_id.clone(), messages)
    }

    async fn record_exchange(&self, text: String, reply: String) {
        let mut history = self.history.write().await;
        history.push(ProviderMessage::user(text));
        history.push(ProviderMessage::model(reply));
    }

    /// Sends one message and waits for the complete reply.
    pub async fn send_message(&self, stream_id: StreamId, text: &str) -> ProviderResult<String> {
        let request = self.build_request(stream_id, text).await;
        let reply = self.provider.complete(request).await?;
        self.record_exchange(text.to_string(), reply.clone()).await;
        Ok(reply)
    }

    /// Sends one message and returns the chunk stream for its reply.
    ///
    /// The returned worker owns the provider request; nothing is sent until it is
    /// polled.
    pub fn send_message_stream(
        &self,
        stream_id: StreamId,
        text: &str,
    ) -> ProviderStreamHandle {
        let (event_tx, stream, cancel_rx) = make_event_stream(stream_id);
        let connection = self.clone();
        let text = text.to_string();

        let worker: ProviderWorker = Box::pin(async move {
            let request = connection.build_request(stream_id, &text).await;
            let inner = match connection.provider.stream_chat(request) {
                Ok(inner) => inner,
                Err(error) => {
                    tracing::error!(
                        stream_id = ?stream_id,
                        provider_id = %connection.provider.id(),
                        error = %error,
                        "provider rejected stream request"
                    );
                    let _ = event_tx.send(StreamEvent::new(
                        stream_id,
                        StreamEventPayload::Error(error.to_string()),
                    ));
                    return;
                }
            };

            let ProviderStreamHandle {
                stream: inner_stream,
                worker: inner_worker,
            } = inner;
            let forward = connection.forward_stream(text, inner_stream, event_tx, cancel_rx);
            tokio::join!(inner_worker, forward);
        });

        ProviderStreamHandle { stream, worker }
    }

    /// Dispatches one message using the given delivery mode. Failures of either
    /// mode arrive as an `Error` event on the returned stream.
    pub fn request(
        &self,
        stream_id: StreamId,
        text: &str,
        mode: ResponseMode,
    ) -> ProviderStreamHandle {
        match mode {
            ResponseMode::Streaming => self.send_message_stream(stream_id, text),
            ResponseMode::SingleShot => self.send_message_single(stream_id, text),
        }
    }

    fn send_message_single(&self, stream_id: StreamId, text: &str) -> ProviderStreamHandle {
        let (event_tx, stream, _cancel_rx) = make_event_stream(stream_id);
        let connection = self.clone();
        let text = text.to_string();

        let worker: ProviderWorker = Box::pin(async move {
            let _ = event_tx.send(StreamEvent::new(stream_id, StreamEventPayload::Opened));
            let payloads = match connection.send_message(stream_id, &text).await {
                Ok(reply) => vec![StreamEventPayload::Delta(reply), StreamEventPayload::Done],
                Err(error) => vec![StreamEventPayload::Error(error.to_string())],
            };
            for payload in payloads {
                if event_tx.send(StreamEvent::new(stream_id, payload)).is_err() {
                    return;
                }
            }
        });

        ProviderStreamHandle { stream, worker }
    }

    /// Relays provider events to the caller, recording the exchange on `Done`.
    async fn forward_stream(
        &self,
        text: String,
        mut inner: ProviderEventStream,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let stream_id = inner.stream_id();
        let mut reply = String::new();

        loop {
            let event = tokio::select! {
                _ = &mut cancel_rx => {
                    tracing::debug!(stream_id = ?stream_id, "caller dropped stream; abandoning request");
                    return;
                }
                event = inner.recv() => event,
            };

            let Some(event) = event else {
                let error = ProviderError::StreamClosed {
                    stage: "forward-stream",
                    stream_id,
                };
                tracing::warn!(stream_id = ?stream_id, error = %error, "provider stream closed early");
                let _ = event_tx.send(StreamEvent::new(
                    stream_id,
                    StreamEventPayload::Error(error.to_string()),
                ));
                return;
            };

            if let StreamEventPayload::Delta(chunk) = &event.payload {
                reply.push_str(chunk);
            }

            // History is written before `Done` is relayed so the next turn sees it.
            if event.payload == StreamEventPayload::Done {
                self.record_exchange(text.clone(), std::mem::take(&mut reply))
                    .await;
            }

            let terminal = event.payload.is_terminal();
            if event_tx.send(event).is_err() || terminal {
                return;
            }
        }
    }
}

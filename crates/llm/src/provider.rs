use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

use super::model::Model;

/// Identifier for one request/response exchange.
///
/// A fresh id is allocated for every accepted submission so late events from an
/// earlier exchange can be told apart from the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Speaker of one turn as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content)
    }
}

/// One request against a provider: prior turns followed by the new user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub stream_id: StreamId,
    pub model_id: String,
    pub messages: Vec<ProviderMessage>,
}

impl ChatRequest {
    pub fn new(
        stream_id: StreamId,
        model_id: impl Into<String>,
        messages: Vec<ProviderMessage>,
    ) -> Self {
        Self {
            stream_id,
            model_id: model_id.into(),
            messages,
        }
    }
}

/// Provider-agnostic stream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    /// The request was accepted and chunks may follow.
    Opened,
    Delta(String),
    Done,
    Error(String),
}

impl StreamEventPayload {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub stream_id: StreamId,
    pub payload: StreamEventPayload,
}

impl StreamEvent {
    pub fn new(stream_id: StreamId, payload: StreamEventPayload) -> Self {
        Self { stream_id, payload }
    }

    pub fn delta(stream_id: StreamId, text: impl Into<String>) -> Self {
        Self::new(stream_id, StreamEventPayload::Delta(text.into()))
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("request for {stream_id:?} has no messages"))]
    EmptyMessageSet {
        stage: &'static str,
        stream_id: StreamId,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("provider stream for {stream_id:?} ended before a terminal event"))]
    StreamClosed {
        stage: &'static str,
        stream_id: StreamId,
    },
}

/// Receiving side of one provider stream.
///
/// Dropping it signals the worker to stop provider IO.
pub struct ProviderEventStream {
    stream_id: StreamId,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// A stream plus the future that feeds it. The worker must be polled (spawned or
/// joined) for events to arrive.
pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

impl ProviderEventStream {
    fn new(
        stream_id: StreamId,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            stream_id,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for ProviderEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn models(&self) -> &[Model];
    /// Single-shot request returning the whole reply text.
    fn complete<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, ProviderResult<String>>;
    fn stream_chat(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle>;
}

/// Builds the channel pair backing a [`ProviderEventStream`].
pub fn make_event_stream(
    stream_id: StreamId,
) -> (
    mpsc::UnboundedSender<StreamEvent>,
    ProviderEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        ProviderEventStream::new(stream_id, event_rx, cancel_tx),
        cancel_rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_config_trims_fields() {
        let config = ProviderConfig::new(" gemini ", "  key\n", " https://example.test ");
        assert_eq!(config.provider_id, "gemini");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.endpoint, "https://example.test");
    }

    #[tokio::test]
    async fn dropping_stream_signals_cancellation() {
        let (event_tx, stream, cancel_rx) = make_event_stream(StreamId::new(3));
        assert_eq!(stream.stream_id(), StreamId::new(3));

        drop(stream);

        assert!(cancel_rx.await.is_ok());
        assert!(event_tx.send(StreamEvent::delta(StreamId::new(3), "late")).is_err());
    }

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let id = StreamId::new(1);
        let (event_tx, mut stream, _cancel_rx) = make_event_stream(id);
        event_tx
            .send(StreamEvent::new(id, StreamEventPayload::Opened))
            .unwrap();
        event_tx.send(StreamEvent::delta(id, "a")).unwrap();
        event_tx.send(StreamEvent::delta(id, "b")).unwrap();
        drop(event_tx);

        let mut payloads = Vec::new();
        while let Some(event) = stream.recv().await {
            payloads.push(event.payload);
        }

        assert_eq!(
            payloads,
            vec![
                StreamEventPayload::Opened,
                StreamEventPayload::Delta("a".to_string()),
                StreamEventPayload::Delta("b".to_string()),
            ]
        );
    }

    #[test]
    fn stream_ids_advance() {
        assert_eq!(StreamId::new(7).next(), StreamId::new(8));
        assert_eq!(StreamId::new(u64::MAX).next(), StreamId::new(u64::MAX));
    }
}

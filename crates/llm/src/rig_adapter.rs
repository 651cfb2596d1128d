use futures::StreamExt;
use rig::completion::message::AssistantContent;
use rig::completion::{CompletionModel, CompletionRequestBuilder, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::gemini;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::model::{DEFAULT_GEMINI_MODEL, Model, default_gemini_models};
use super::provider::{
    BoxFuture, ChatRequest, CompletionsFailedSnafu, EmptyMessageSetSnafu,
    HttpClientSnafu, LlmProvider, MissingApiKeySnafu, ProviderConfig, ProviderError,
    ProviderMessage, ProviderResult, ProviderStreamHandle, ProviderWorker, Role, StreamEvent,
    StreamEventPayload, StreamId, make_event_stream,
};

pub const RIG_GEMINI_PROVIDER_ID: &str = "gemini";

pub struct RigProviderAdapter {
    config: ProviderConfig,
    models: Vec<Model>,
}

impl RigProviderAdapter {
    /// A blank API key is accepted here; requests then fail with
    /// [`ProviderError::MissingApiKey`] and surface through the normal error path.
    pub fn new(config: ProviderConfig) -> Self {
        if config.api_key.is_empty() {
            tracing::warn!(
                provider_id = %config.provider_id,
                "provider created without an API key; requests will fail"
            );
        }

        Self {
            config,
            models: default_gemini_models(),
        }
    }

    fn build_client(config: &ProviderConfig, stage: &'static str) -> ProviderResult<gemini::Client> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage,
                provider_id: config.provider_id.clone(),
            }
        );

        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu { stage })
    }

    fn to_rig_message(message: &ProviderMessage) -> RigMessage {
        match message.role {
            Role::User => RigMessage::user(message.content.clone()),
            Role::Model => RigMessage::assistant(message.content.clone()),
        }
    }

    /// Splits the request into rig's prompt + history shape.
    fn prepare<M>(model: M, request: &ChatRequest) -> ProviderResult<CompletionRequestBuilder<M>>
    where
        M: CompletionModel,
    {
        let mut messages = request
            .messages
            .iter()
            .map(Self::to_rig_message)
            .collect::<Vec<_>>();

        let Some(prompt) = messages.pop() else {
            tracing::error!(
                stream_id = ?request.stream_id,
                model_id = %request.model_id,
                "request has no messages to send"
            );
            return EmptyMessageSetSnafu {
                stage: "prepare-request",
                stream_id: request.stream_id,
            }
            .fail();
        };

        Ok(model.completion_request(prompt).messages(messages))
    }

    async fn complete_once(config: &ProviderConfig, request: ChatRequest) -> ProviderResult<String> {
        let client = Self::build_client(config, "complete-build-client")?;
        let model = client.completion_model(request.model_id.clone());
        let response = Self::prepare(model, &request)?
            .send()
            .await
            .context(CompletionsFailedSnafu { stage: "complete" })?;

        // An empty reply is a valid completion, same as a stream with no chunks.
        Ok(Self::reply_text(response.choice.iter()))
    }

    fn reply_text<'a>(contents: impl Iterator<Item = &'a AssistantContent>) -> String {
        contents
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEvent>,
        stream_id: StreamId,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEvent::new(
            stream_id,
            StreamEventPayload::Error(error.to_string()),
        ));
    }

    fn map_stream_item<R>(stream_id: StreamId, item: StreamedAssistantContent<R>) -> Option<StreamEvent>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) => Some(StreamEvent::delta(stream_id, text.text)),
            // Reasoning traces are not part of the visible transcript.
            StreamedAssistantContent::Reasoning(_)
            | StreamedAssistantContent::ReasoningDelta { .. }
            | StreamedAssistantContent::ToolCall { .. }
            | StreamedAssistantContent::ToolCallDelta { .. }
            | StreamedAssistantContent::Final(_) => None,
        }
    }

    async fn run_stream_worker(
        config: ProviderConfig,
        request: ChatRequest,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let stream_id = request.stream_id;

        let opened = match Self::build_client(&config, "stream-build-client") {
            Ok(client) => {
                let model = client.completion_model(request.model_id.clone());
                match Self::prepare(model, &request) {
                    Ok(builder) => builder
                        .stream()
                        .await
                        .context(CompletionsFailedSnafu { stage: "open-stream" }),
                    Err(error) => Err(error),
                }
            }
            Err(error) => Err(error),
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    stream_id = ?stream_id,
                    provider_id = %config.provider_id,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, stream_id, error);
                return;
            }
        };

        if event_tx
            .send(StreamEvent::new(stream_id, StreamEventPayload::Opened))
            .is_err()
        {
            return;
        }

        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    // The receiving side went away; stop provider IO promptly.
                    tracing::debug!(stream_id = ?stream_id, "provider stream dropped by receiver");
                    stream.cancel();
                    break;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            if let Some(mapped) = Self::map_stream_item(stream_id, item)
                                && event_tx.send(mapped).is_err()
                            {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            tracing::warn!(
                                stream_id = ?stream_id,
                                error = %source,
                                "provider stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, stream_id, error);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if !cancelled && !stream_failed {
            let _ = event_tx.send(StreamEvent::new(stream_id, StreamEventPayload::Done));
        }
    }
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Rig Gemini"
    }

    fn default_model(&self) -> &str {
        DEFAULT_GEMINI_MODEL
    }

    fn models(&self) -> &[Model] {
        &self.models
    }

    fn complete<'a>(&'a self, request: ChatRequest) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            let stream_id = request.stream_id;
            let result = Self::complete_once(&self.config, request).await;
            if let Err(error) = &result {
                tracing::error!(
                    stream_id = ?stream_id,
                    provider_id = %self.config.provider_id,
                    error = %error,
                    "single-shot completion failed"
                );
            }
            result
        })
    }

    fn stream_chat(&self, request: ChatRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
                stream_id: request.stream_id,
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(request.stream_id);
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_without_key() -> RigProviderAdapter {
        RigProviderAdapter::new(ProviderConfig::new(RIG_GEMINI_PROVIDER_ID, "", ""))
    }

    #[test]
    fn empty_request_is_rejected_before_streaming() {
        let adapter = adapter_without_key();
        let request = ChatRequest::new(StreamId::new(1), DEFAULT_GEMINI_MODEL, Vec::new());

        let result = adapter.stream_chat(request);

        assert!(matches!(
            result,
            Err(ProviderError::EmptyMessageSet { stream_id, .. }) if stream_id == StreamId::new(1)
        ));
    }

    #[tokio::test]
    async fn missing_key_surfaces_as_stream_error() {
        let adapter = adapter_without_key();
        let request = ChatRequest::new(
            StreamId::new(2),
            DEFAULT_GEMINI_MODEL,
            vec![ProviderMessage::user("hello")],
        );

        let ProviderStreamHandle { mut stream, worker } = adapter.stream_chat(request).unwrap();
        worker.await;

        let event = stream.recv().await.unwrap();
        assert_eq!(event.stream_id, StreamId::new(2));
        assert!(matches!(
            event.payload,
            StreamEventPayload::Error(message) if message.contains("missing API key")
        ));
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn reply_text_keeps_text_parts_only() {
        let contents = [
            AssistantContent::text("Hi"),
            AssistantContent::text(" there"),
        ];
        assert_eq!(RigProviderAdapter::reply_text(contents.iter()), "Hi there");
    }

    #[test]
    fn empty_reply_text_is_not_an_error() {
        assert_eq!(RigProviderAdapter::reply_text(std::iter::empty()), "");
    }

    #[tokio::test]
    async fn missing_key_fails_single_shot() {
        let adapter = adapter_without_key();
        let request = ChatRequest::new(
            StreamId::new(3),
            DEFAULT_GEMINI_MODEL,
            vec![ProviderMessage::user("hello")],
        );

        let result = adapter.complete(request).await;

        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }
}

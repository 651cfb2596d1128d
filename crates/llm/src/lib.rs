use std::sync::Arc;

mod connection;
mod model;
mod provider;
mod rig_adapter;

pub use connection::{ChatConnection, ResponseMode};
pub use model::{DEFAULT_GEMINI_MODEL, Model, default_gemini_models, resolve_model_id};
pub use provider::{
    BoxFuture, ChatRequest, LlmProvider, ProviderConfig, ProviderError, ProviderEventStream,
    ProviderMessage, ProviderResult, ProviderStreamHandle, ProviderWorker, Role, StreamEvent,
    StreamEventPayload, StreamId, make_event_stream,
};
pub use rig_adapter::{RIG_GEMINI_PROVIDER_ID, RigProviderAdapter};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "gemini" | "google" | "rig-gemini" => {
            config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

/// Opens a backend chat session on the given model with prior turns.
pub fn create_session(
    provider: Arc<dyn LlmProvider>,
    model_id: &str,
    history: Vec<ProviderMessage>,
) -> ChatConnection {
    let model_id = resolve_model_id(model_id, provider.default_model());
    tracing::info!(
        provider_id = %provider.id(),
        model_id = %model_id,
        history_len = history.len(),
        "opened backend chat session"
    );
    ChatConnection::new(provider, model_id, history)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_provider_id_defaults_to_gemini() {
        let provider = create_provider(ProviderConfig::new("", "key", "")).unwrap();
        assert_eq!(provider.id(), RIG_GEMINI_PROVIDER_ID);
    }

    #[test]
    fn google_alias_is_normalized() {
        let provider = create_provider(ProviderConfig::new("google", "key", "")).unwrap();
        assert_eq!(provider.id(), RIG_GEMINI_PROVIDER_ID);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = create_provider(ProviderConfig::new("acme", "key", ""));
        assert!(matches!(
            result,
            Err(ProviderError::UnsupportedProvider { provider_id, .. }) if provider_id == "acme"
        ));
    }

    #[test]
    fn session_uses_provider_default_for_blank_model() {
        let provider = create_provider(ProviderConfig::new("gemini", "key", "")).unwrap();
        let connection = create_session(provider, " ", Vec::new());
        assert_eq!(connection.model_id(), DEFAULT_GEMINI_MODEL);
    }
}

use lumen_llm::{StreamEvent, StreamEventPayload};

use crate::events::{IngestStep, StreamProgress};
use crate::message::{
    Message, StreamId, StreamState, StreamTransition, StreamTransitionRejection,
};
use crate::transcript::{Transcript, TranscriptChange};

/// Text shown in place of a reply when the request fails.
pub const REQUEST_FAILED_NOTICE: &str = "Sorry, something went wrong.";

/// Applies one request's events to the transcript, in arrival order.
///
/// While a request is active the controller is the only writer of the last
/// transcript turn. Callers gate new requests on [`StreamIngestion::is_active`].
#[derive(Debug, Default)]
pub struct StreamIngestion {
    state: StreamState,
    placeholder_index: Option<usize>,
}

impl StreamIngestion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn active_stream(&self) -> Option<StreamId> {
        self.state.active_stream()
    }

    /// `Idle -> Awaiting`. Nothing is written to the transcript yet.
    pub fn begin(&mut self, stream_id: StreamId) -> Result<(), StreamTransitionRejection> {
        self.state = self.state.apply(StreamTransition::Start(stream_id))?;
        self.placeholder_index = None;
        tracing::debug!(stream_id = ?stream_id, "request awaiting backend");
        Ok(())
    }

    /// Appends the empty model turn that chunks are written into.
    pub fn reserve_placeholder(&mut self, transcript: &mut Transcript) -> Option<TranscriptChange> {
        if !self.is_active() || self.placeholder_index.is_some() {
            return None;
        }

        let change = transcript.append(Message::model_placeholder());
        self.placeholder_index = Some(change.index());
        Some(change)
    }

    /// Applies one provider event.
    pub fn apply(&mut self, event: StreamEvent, transcript: &mut Transcript) -> IngestStep {
        let stream_id = event.stream_id;
        if !self.state.accepts_stream_event(stream_id) {
            tracing::debug!(
                stream_id = ?stream_id,
                active = ?self.active_stream(),
                "ignoring event for inactive stream"
            );
            return IngestStep::ignored();
        }

        match event.payload {
            StreamEventPayload::Opened => {
                self.open(stream_id);
                IngestStep::new(StreamProgress::Opened, None)
            }
            StreamEventPayload::Delta(chunk) => {
                // Providers that never acknowledge opening still stream chunks.
                self.open(stream_id);
                let change = self.apply_chunk(&chunk, transcript);
                IngestStep::new(StreamProgress::ChunkApplied, change)
            }
            StreamEventPayload::Done => self.complete(stream_id),
            StreamEventPayload::Error(message) => self.fail(stream_id, &message, transcript),
        }
    }

    /// Fails the active request if it is `stream_id`. Used when the request could
    /// not be dispatched or its event stream closed without a terminal event.
    pub fn abort(
        &mut self,
        stream_id: StreamId,
        reason: &str,
        transcript: &mut Transcript,
    ) -> IngestStep {
        if !self.state.accepts_stream_event(stream_id) {
            return IngestStep::ignored();
        }

        self.fail(stream_id, reason, transcript)
    }

    fn open(&mut self, stream_id: StreamId) {
        if let Ok(next_state) = self.state.apply(StreamTransition::Open(stream_id)) {
            if self.state != next_state {
                tracing::debug!(stream_id = ?stream_id, "request opened");
            }
            self.state = next_state;
        }
    }

    fn apply_chunk(&mut self, chunk: &str, transcript: &mut Transcript) -> Option<TranscriptChange> {
        debug_assert_eq!(
            self.placeholder_index,
            transcript.len().checked_sub(1),
            "pending turn must stay last while a request is active"
        );

        let current = transcript.last()?.text();
        let mut text = String::with_capacity(current.len() + chunk.len());
        text.push_str(current);
        text.push_str(chunk);
        transcript.update_last(text)
    }

    fn complete(&mut self, stream_id: StreamId) -> IngestStep {
        match self.state.apply(StreamTransition::Complete(stream_id)) {
            Ok(next_state) => {
                self.state = next_state;
                self.placeholder_index = None;
                tracing::debug!(stream_id = ?stream_id, "request completed");
                IngestStep::new(StreamProgress::Completed, None)
            }
            Err(rejection) => {
                tracing::warn!(stream_id = ?stream_id, ?rejection, "completion rejected");
                IngestStep::ignored()
            }
        }
    }

    fn fail(&mut self, stream_id: StreamId, reason: &str, transcript: &mut Transcript) -> IngestStep {
        let next_state = match self.state.apply(StreamTransition::Fail(stream_id)) {
            Ok(next_state) => next_state,
            Err(rejection) => {
                tracing::warn!(stream_id = ?stream_id, ?rejection, "failure rejected");
                return IngestStep::ignored();
            }
        };

        tracing::error!(stream_id = ?stream_id, error = %reason, "request failed");

        // Partial text is discarded, not kept in front of the notice.
        let change = transcript.update_last(REQUEST_FAILED_NOTICE);
        self.state = next_state;
        self.placeholder_index = None;
        IngestStep::new(StreamProgress::Failed, change)
    }
}

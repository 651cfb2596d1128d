use lumen_llm::{
    ChatConnection, ProviderError, ProviderStreamHandle, ResponseMode, StreamEvent,
};

use crate::events::{IngestStep, StreamProgress, Submission};
use crate::ingest::StreamIngestion;
use crate::message::{Message, StreamId, StreamState};
use crate::message_input::{InputSurface, RequestInFlightSnafu, SubmitRejected, validate_submission};
use crate::scroll_manager::{ScrollManager, Viewport};
use crate::transcript::{Transcript, TranscriptChange};

/// Chat state for one open view: transcript, loading gate, backend connection and
/// scroll-follow. Memory only; dropping it discards everything.
pub struct ChatSession<V> {
    transcript: Transcript,
    ingestion: StreamIngestion,
    scroll: ScrollManager<V>,
    connection: ChatConnection,
    response_mode: ResponseMode,
    next_stream_id: StreamId,
}

impl<V: Viewport> ChatSession<V> {
    pub fn new(connection: ChatConnection, viewport: V) -> Self {
        Self {
            transcript: Transcript::new(),
            ingestion: StreamIngestion::new(),
            scroll: ScrollManager::new(viewport),
            connection,
            response_mode: ResponseMode::default(),
            next_stream_id: StreamId::new(1),
        }
    }

    pub fn with_response_mode(mut self, response_mode: ResponseMode) -> Self {
        self.response_mode = response_mode;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_loading(&self) -> bool {
        self.ingestion.is_active()
    }

    pub fn stream_state(&self) -> StreamState {
        self.ingestion.state()
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.response_mode
    }

    pub fn connection(&self) -> &ChatConnection {
        &self.connection
    }

    pub fn scroll(&self) -> &ScrollManager<V> {
        &self.scroll
    }

    pub fn viewport_mut(&mut self) -> &mut V {
        self.scroll.viewport_mut()
    }

    /// Viewport scroll event. Returns whether the user is now scrolled away.
    pub fn handle_scroll(&mut self) -> bool {
        self.scroll.handle_scroll()
    }

    /// Validates and dispatches the text currently in `input`.
    ///
    /// On acceptance the transcript gains the user turn and an empty model turn,
    /// `input` is cleared and the request is handed to the backend. The returned
    /// [`Submission`] must then be driven with [`ChatSession::drive`] or fed event
    /// by event through [`ChatSession::handle_stream_event`].
    pub fn submit(&mut self, input: &mut impl InputSurface) -> Result<Submission, SubmitRejected> {
        let text = input.value().to_string();
        if let Err(rejection) = validate_submission(&text, self.ingestion.active_stream()) {
            tracing::debug!(%rejection, "submission rejected");
            return Err(rejection);
        }

        let stream_id = self.next_stream_id;
        if let Err(rejection) = self.ingestion.begin(stream_id) {
            tracing::warn!(?rejection, "stream start rejected");
            return RequestInFlightSnafu {
                stage: "submit-begin",
                active: self.ingestion.active_stream().unwrap_or(stream_id),
            }
            .fail();
        }
        self.next_stream_id = stream_id.next();

        self.scroll.resume_follow();
        let change = self.transcript.append(Message::user(text.clone()));
        self.notify_changed(Some(change));
        input.clear();

        let change = self.ingestion.reserve_placeholder(&mut self.transcript);
        self.notify_changed(change);

        tracing::info!(
            stream_id = ?stream_id,
            mode = ?self.response_mode,
            chars = text.chars().count(),
            "submitted message"
        );

        let response = self.connection.request(stream_id, &text, self.response_mode);

        Ok(Submission {
            stream_id,
            response,
        })
    }

    /// Applies one provider event and repositions the viewport if it changed the
    /// transcript.
    pub fn handle_stream_event(&mut self, event: StreamEvent) -> StreamProgress {
        let step = self.ingestion.apply(event, &mut self.transcript);
        self.finish_step(step)
    }

    /// The event stream for `stream_id` ended. Fails the request if it was still
    /// waiting for a terminal event.
    pub fn handle_stream_closed(&mut self, stream_id: StreamId) -> StreamProgress {
        let error = ProviderError::StreamClosed {
            stage: "stream-closed",
            stream_id,
        };
        let step = self
            .ingestion
            .abort(stream_id, &error.to_string(), &mut self.transcript);
        self.finish_step(step)
    }

    /// Runs a submission to completion or failure.
    ///
    /// The provider worker and the event reader share this task, so chunks are
    /// applied one at a time in the order they were produced. The session stays
    /// borrowed until the reply ends; hosts that must handle scroll events while
    /// waiting use [`ChatSession::drive_with`] or feed events through
    /// [`ChatSession::handle_stream_event`] themselves.
    pub async fn drive(&mut self, submission: Submission) -> StreamProgress {
        self.drive_with(submission, |_, _| {}).await
    }

    /// Like [`ChatSession::drive`], calling `observe` after every applied event.
    /// The callback gets the session mutably, so a front end can redraw and
    /// report viewport scrolls between chunks.
    pub async fn drive_with(
        &mut self,
        submission: Submission,
        mut observe: impl FnMut(&mut Self, StreamProgress),
    ) -> StreamProgress {
        let Submission {
            stream_id,
            response: ProviderStreamHandle { mut stream, worker },
        } = submission;

        let consume = async {
            while let Some(event) = stream.recv().await {
                let progress = self.handle_stream_event(event);
                observe(&mut *self, progress);
                if progress.is_terminal() {
                    return progress;
                }
            }
            let progress = self.handle_stream_closed(stream_id);
            observe(&mut *self, progress);
            progress
        };

        let ((), progress) = tokio::join!(worker, consume);
        progress
    }

    /// Submits `input` and drives the reply to the end.
    pub async fn send(
        &mut self,
        input: &mut impl InputSurface,
    ) -> Result<StreamProgress, SubmitRejected> {
        let submission = self.submit(input)?;
        Ok(self.drive(submission).await)
    }

    fn finish_step(&mut self, step: IngestStep) -> StreamProgress {
        self.notify_changed(step.change);
        step.progress
    }

    fn notify_changed(&mut self, change: Option<TranscriptChange>) {
        if change.is_some() {
            self.scroll.on_transcript_changed();
        }
    }
}

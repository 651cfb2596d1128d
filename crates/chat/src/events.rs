use lumen_llm::ProviderStreamHandle;

use crate::message::StreamId;
use crate::transcript::TranscriptChange;

/// Result of applying one provider event to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProgress {
    /// The backend acknowledged the request.
    Opened,
    /// One chunk was appended to the pending turn.
    ChunkApplied,
    Completed,
    /// The pending turn now holds the failure notice.
    Failed,
    /// The event did not belong to the active request.
    Ignored,
}

impl StreamProgress {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One step of the ingestion controller: its progress and the mutation it made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStep {
    pub progress: StreamProgress,
    pub change: Option<TranscriptChange>,
}

impl IngestStep {
    pub(crate) fn new(progress: StreamProgress, change: Option<TranscriptChange>) -> Self {
        Self { progress, change }
    }

    pub(crate) fn ignored() -> Self {
        Self::new(StreamProgress::Ignored, None)
    }
}

/// An accepted submission and the stream its reply arrives on.
pub struct Submission {
    pub stream_id: StreamId,
    pub response: ProviderStreamHandle,
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}

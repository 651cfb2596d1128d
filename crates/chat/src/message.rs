pub use lumen_llm::StreamId;

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Model,
}

/// One conversation turn.
///
/// `role` is fixed at creation. `text` only changes through
/// [`Transcript::update_last`](crate::Transcript::update_last) while the message is
/// the pending streaming target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    text: String,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    /// Empty model turn reserved at stream start.
    pub fn model_placeholder() -> Self {
        Self::new(Role::Model, String::new())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.text = text;
    }
}

/// Lifecycle of the single outstanding request.
///
/// `Completed` and `Failed` are not resting states: both settle straight back to
/// `Idle`, so they only appear as transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    /// Placeholder reserved, request not yet acknowledged by the backend.
    Awaiting(StreamId),
    Streaming(StreamId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransition {
    Start(StreamId),
    Open(StreamId),
    Complete(StreamId),
    Fail(StreamId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyActive {
        active: StreamId,
        attempted: StreamId,
    },
    NoActiveStream,
    StreamMismatch {
        active: StreamId,
        attempted: StreamId,
    },
}

pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    pub fn active_stream(&self) -> Option<StreamId> {
        match self {
            Self::Awaiting(stream_id) | Self::Streaming(stream_id) => Some(*stream_id),
            Self::Idle => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_stream().is_some()
    }

    /// Returns true when an incoming event belongs to the active request.
    pub fn accepts_stream_event(&self, stream_id: StreamId) -> bool {
        self.active_stream() == Some(stream_id)
    }

    /// Applies one transition deterministically.
    ///
    /// Only `Idle` may start a request. Every other transition must name the
    /// active request exactly.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Start(stream_id) => self.apply_start(stream_id),
            StreamTransition::Open(stream_id) => self.apply_open(stream_id),
            StreamTransition::Complete(stream_id) | StreamTransition::Fail(stream_id) => {
                self.apply_finish(stream_id)
            }
        }
    }

    fn apply_start(&self, stream_id: StreamId) -> StreamTransitionResult {
        match self {
            Self::Idle => Ok(Self::Awaiting(stream_id)),
            Self::Awaiting(active) | Self::Streaming(active) => {
                Err(StreamTransitionRejection::AlreadyActive {
                    active: *active,
                    attempted: stream_id,
                })
            }
        }
    }

    fn apply_open(&self, stream_id: StreamId) -> StreamTransitionResult {
        let active = self.checked_active(stream_id)?;
        Ok(Self::Streaming(active))
    }

    fn apply_finish(&self, stream_id: StreamId) -> StreamTransitionResult {
        self.checked_active(stream_id)?;
        Ok(Self::Idle)
    }

    fn checked_active(&self, stream_id: StreamId) -> Result<StreamId, StreamTransitionRejection> {
        match self.active_stream() {
            Some(active) if active == stream_id => Ok(active),
            Some(active) => Err(StreamTransitionRejection::StreamMismatch {
                active,
                attempted: stream_id,
            }),
            None => Err(StreamTransitionRejection::NoActiveStream),
        }
    }
}

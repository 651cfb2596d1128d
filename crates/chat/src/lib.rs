#![deny(unsafe_code)]

//! Chat session controller.
//!
//! Keeps the transcript of one conversation, admits one request at a time,
//! streams the reply into the transcript chunk by chunk and keeps the viewport
//! following the newest content.

pub mod events;
pub mod ingest;
/// Domain entities and the request lifecycle state machine.
pub mod message;
pub mod message_input;
pub mod scroll_manager;
pub mod session;
pub mod transcript;

pub use events::{IngestStep, StreamProgress, Submission};
pub use ingest::{REQUEST_FAILED_NOTICE, StreamIngestion};
pub use message::{
    Message, Role, StreamId, StreamState, StreamTransition, StreamTransitionRejection,
    StreamTransitionResult,
};
pub use message_input::{InputSurface, SubmitRejected, TextInput, validate_submission};
pub use scroll_manager::{SCROLL_FOLLOW_THRESHOLD, ScrollManager, ScrollMetrics, Viewport};
pub use session::ChatSession;
pub use transcript::{Transcript, TranscriptChange};

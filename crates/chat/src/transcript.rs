use crate::message::Message;

/// What one transcript mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptChange {
    Appended { index: usize },
    LastUpdated { index: usize },
}

impl TranscriptChange {
    pub fn index(self) -> usize {
        match self {
            Self::Appended { index } | Self::LastUpdated { index } => index,
        }
    }
}

/// Ordered log of conversation turns.
///
/// Turns are never removed or reordered. Only the final turn can be rewritten,
/// and each rewrite replaces its text in one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) -> TranscriptChange {
        self.messages.push(message);
        TranscriptChange::Appended {
            index: self.messages.len() - 1,
        }
    }

    /// Replaces the text of the final turn. No-op on an empty transcript.
    pub fn update_last(&mut self, text: impl Into<String>) -> Option<TranscriptChange> {
        let index = self.messages.len().checked_sub(1)?;
        self.messages[index].set_text(text.into());
        Some(TranscriptChange::LastUpdated { index })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

//! Ordered message log for one chat session.
//!
//! Identity is assigned here: a message appended without an id receives the
//! largest existing id plus one, so ids grow monotonically until the log is
//! cleared.

use thiserror::Error;
use time::OffsetDateTime;

pub type MessageId = u64;

/// Id value of a message that has not been appended yet.
pub const UNASSIGNED_ID: MessageId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub created_at: OffsetDateTime,
}

impl Message {
    /// New message without an id, stamped with the current UTC time.
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: UNASSIGNED_ID,
            text: text.into(),
            sender,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text)
    }

    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("message {id} not found in transcript")]
    NotFound { id: MessageId },

    #[error("message id {id} is already in use")]
    DuplicateId { id: MessageId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message`, assigning the next id when it has none.
    pub fn append(&mut self, mut message: Message) -> Result<&Message, TranscriptError> {
        if message.id == UNASSIGNED_ID {
            message.id = self.next_id();
        } else if self.position(message.id).is_some() {
            return Err(TranscriptError::DuplicateId { id: message.id });
        }

        self.messages.push(message);
        let index = self.messages.len() - 1;
        Ok(&self.messages[index])
    }

    /// Replaces the text and sender of message `id` in place. Position, id and
    /// creation time are kept.
    pub fn replace_by_id(
        &mut self,
        id: MessageId,
        replacement: Message,
    ) -> Result<&Message, TranscriptError> {
        let index = self.position(id).ok_or(TranscriptError::NotFound { id })?;
        let message = &mut self.messages[index];
        message.text = replacement.text;
        message.sender = replacement.sender;
        Ok(message)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.position(id).map(|index| &self.messages[index])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Id the next unassigned append will receive.
    pub fn next_id(&self) -> MessageId {
        self.messages
            .iter()
            .map(|message| message.id)
            .max()
            .map_or(1, |max| max + 1)
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|message| message.id == id)
    }
}

use crate::display::apply_display_transform;

/// Stream event emitted by the client after folding a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateStreamEvent {
    /// Full transformed text accumulated so far.
    TextDelta { text: String },
    /// The server marked the stream complete.
    Done { reason: Option<String> },
}

/// Outcome of a stream that ended without error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamResult {
    pub text: String,
    /// True when a `done` record ended the stream; false when the body simply
    /// ran out.
    pub done: bool,
    pub done_reason: Option<String>,
}

/// Running fold of transformed fragments.
#[derive(Debug, Clone, Default)]
pub struct TextAccumulator {
    text: String,
}

impl TextAccumulator {
    /// Appends a fragment after the display transform and returns the
    /// cumulative text.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.text.push_str(&apply_display_transform(fragment));
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

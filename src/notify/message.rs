//! Notification message: a title and body split from free text.

use std::fmt;

use serde::Serialize;

/// Immutable `{title, body}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    title: String,
    body: String,
}

impl Message {
    /// The first line becomes the title and the rest the body. Single-line
    /// text is used for both.
    #[must_use]
    pub fn new(text: &str) -> Self {
        match text.split_once('\n') {
            Some((title, body)) => Self {
                title: title.to_string(),
                body: body.to_string(),
            },
            None => Self {
                title: text.to_string(),
                body: text.to_string(),
            },
        }
    }

    /// First line, used as the subject.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Text after the first line, or the title for one-line messages.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

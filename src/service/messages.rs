//! User-facing message channel

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageLevel::Info => "info",
            MessageLevel::Success => "success",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

/// Messages queued for the user, in the order they were produced
#[derive(Debug, Default)]
pub struct Messages {
    queue: Mutex<Vec<Message>>,
}

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: MessageLevel, text: impl Into<String>) {
        self.queue.lock().push(Message {
            level,
            text: text.into(),
        });
    }

    pub fn success(&self, text: impl Into<String>) {
        self.push(MessageLevel::Success, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.push(MessageLevel::Error, text);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Copy of the pending messages
    pub fn snapshot(&self) -> Vec<Message> {
        self.queue.lock().clone()
    }

    /// Take every pending message, leaving the channel empty
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub fn has_errors(&self) -> bool {
        self.queue.lock().iter().any(|m| m.level == MessageLevel::Error)
    }
}

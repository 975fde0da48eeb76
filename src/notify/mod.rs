//! Operator notification seam
//!
//! Delivery (mail, chat, pager) is a collaborator; the core only emits
//! subject + free text on workflow-creation failures, venue trouble, and
//! balance warnings.

use std::sync::Mutex;

use tracing::warn;

/// Trait for operator notification channels.
pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, body: &str);
}

/// Default channel: mirrors notifications into the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) {
        let first_line = body.lines().next().unwrap_or_default();
        warn!(subject, detail = first_line, "operator notification");
    }
}

/// Capturing channel for tests and dry runs.
#[derive(Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All (subject, body) pairs delivered so far
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, subject: &str, body: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_notifier_captures_messages() {
        let notifier = MemoryNotifier::new();
        assert!(notifier.is_empty());

        notifier.notify("Notice from your robot trader", "maker venue timed out");
        assert_eq!(notifier.len(), 1);
        assert_eq!(notifier.messages()[0].1, "maker venue timed out");
    }
}

//! Desktop notification sink.
//!
//! Toasts are an external collaborator; the default sink writes to the
//! log so sentinel responses remain observable on headless hosts.

/// Receives the trimmed assistant text after a sentinel-driven turn.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Default sink: structured log line.
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(title, body, "notification");
    }
}

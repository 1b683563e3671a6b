use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
}

/// A user-facing message (toast).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

pub const LOAD_FAILED: &str = "Failed to load data. Please try again.";
pub const EXPORT_FAILED: &str = "Failed to export data. Please try again.";

/// Fan-out of notifications to whoever displays them.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Error => log::warn!("{}: {}", notification.title, notification.description),
            Severity::Info => log::info!("{}: {}", notification.title, notification.description),
        }
        // No listeners is fine
        let _ = self.tx.send(notification);
    }

    pub fn error<S: Into<String>>(&self, description: S) {
        self.notify(Notification {
            title: "Error".to_string(),
            description: description.into(),
            severity: Severity::Error,
        });
    }

    pub fn info<T: Into<String>, D: Into<String>>(&self, title: T, description: D) {
        self.notify(Notification {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_the_toast() {
        let notifier = Notifier::default();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.error(LOAD_FAILED);
        notifier.info("Export", "saved");

        let first = a.try_recv().unwrap();
        assert_eq!(first.title, "Error");
        assert_eq!(first.severity, Severity::Error);
        assert_eq!(b.try_recv().unwrap(), first);
        assert_eq!(a.try_recv().unwrap().severity, Severity::Info);
    }

    #[test]
    fn notifying_without_listeners_is_fine() {
        Notifier::new(0).error(EXPORT_FAILED);
    }
}

//! Post-commit notification delivery.
//!
//! The executor forwards notifications only after their transaction commits.
//! The dispatcher hands them to a [`Notifier`] one by one, off the ledger
//! worker, so slow delivery never holds up a transaction.

use async_trait::async_trait;
use stash_domain::Notification;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Delivers text messages to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) {
        info!(user_id = notification.user_id, message = %notification.message, "Notify user");
    }
}

/// Deliver notifications until the channel closes or `shutdown` fires.
///
/// On shutdown, whatever is already queued is still delivered.
pub fn spawn_dispatcher(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                next = notifications.recv() => match next {
                    Some(notification) => notifier.notify(&notification).await,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    while let Ok(notification) = notifications.try_recv() {
                        notifier.notify(&notification).await;
                    }
                    break;
                }
            }
        }
        debug!("Notification dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<Notification>>);

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, notification: &Notification) {
            self.0.lock().unwrap().push(notification.clone());
        }
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let recording = Arc::new(Recording::default());
        let handle = spawn_dispatcher(receiver, recording.clone(), CancellationToken::new());

        sender.send(Notification::new(1, "first")).unwrap();
        sender.send(Notification::new(2, "second")).unwrap();
        drop(sender);
        handle.await.unwrap();

        let delivered = recording.0.lock().unwrap().clone();
        assert_eq!(delivered, vec![Notification::new(1, "first"), Notification::new(2, "second")]);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let recording = Arc::new(Recording::default());
        let shutdown = CancellationToken::new();

        sender.send(Notification::new(3, "queued")).unwrap();
        shutdown.cancel();
        let handle = spawn_dispatcher(receiver, recording.clone(), shutdown);
        handle.await.unwrap();

        // stopped by the token while the sender is still open
        assert_eq!(recording.0.lock().unwrap().len(), 1);
        assert!(sender.is_closed());
    }
}

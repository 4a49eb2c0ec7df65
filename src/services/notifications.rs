// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local notification dispatcher.
//!
//! Notifications are scheduled as spawned timers and, when due, broadcast to
//! whoever is subscribed (the SSE notification stream). Nothing is persisted:
//! a restart drops pending reminders.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Buffered deliveries per subscriber before the slowest one starts lagging.
const BROADCAST_CAPACITY: usize = 256;

/// When a notification should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Immediate,
    At(DateTime<Utc>),
}

/// What the user sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
}

/// A notification that has fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredNotification {
    pub id: Uuid,
    pub recipient: String,
    #[serde(flatten)]
    pub content: NotificationContent,
    pub delivered_at: DateTime<Utc>,
}

/// Handle to a scheduled notification, usable with [`NotificationDispatcher::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationHandle(pub Uuid);

/// Scheduling failures. Callers log these and carry on.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Too many pending notifications ({0})")]
    QueueFull(usize),

    #[error("Trigger time {0} is in the past")]
    TriggerInPast(DateTime<Utc>),
}

/// Schedules and delivers local notifications.
pub struct NotificationDispatcher {
    sender: broadcast::Sender<DeliveredNotification>,
    pending: Arc<DashMap<Uuid, JoinHandle<()>>>,
    max_pending: usize,
}

impl NotificationDispatcher {
    pub fn new(max_pending: usize) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            pending: Arc::new(DashMap::new()),
            max_pending,
        }
    }

    /// Receive every notification delivered after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveredNotification> {
        self.sender.subscribe()
    }

    /// Schedule a notification for `recipient`.
    ///
    /// Returns as soon as the notification is queued; delivery never blocks
    /// the caller.
    pub fn schedule_local(
        &self,
        recipient: &str,
        content: NotificationContent,
        trigger: Trigger,
    ) -> Result<NotificationHandle, NotificationError> {
        let id = Uuid::new_v4();
        let notification = DeliveredNotification {
            id,
            recipient: recipient.to_string(),
            content,
            delivered_at: Utc::now(),
        };

        let fire_at = match trigger {
            Trigger::Immediate => {
                self.deliver(notification);
                return Ok(NotificationHandle(id));
            }
            Trigger::At(at) if at <= Utc::now() => {
                return Err(NotificationError::TriggerInPast(at));
            }
            Trigger::At(at) => at,
        };

        self.prune();
        if self.pending.len() >= self.max_pending {
            return Err(NotificationError::QueueFull(self.max_pending));
        }

        let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let notification = DeliveredNotification {
                delivered_at: Utc::now(),
                ..notification
            };
            tracing::debug!(
                notification_id = %notification.id,
                recipient = %notification.recipient,
                "Delivering scheduled notification"
            );
            // No subscribers is not an error.
            let _ = sender.send(notification);
        });
        self.pending.insert(id, task);

        tracing::debug!(notification_id = %id, recipient, %fire_at, "Notification scheduled");
        Ok(NotificationHandle(id))
    }

    /// Cancel a pending notification. Returns false if it already fired or
    /// was never scheduled.
    pub fn cancel(&self, handle: NotificationHandle) -> bool {
        match self.pending.remove(&handle.0) {
            Some((_, task)) if !task.is_finished() => {
                task.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether `handle` is still waiting to fire.
    pub fn is_pending(&self, handle: NotificationHandle) -> bool {
        self.pending
            .get(&handle.0)
            .is_some_and(|task| !task.is_finished())
    }

    /// Number of notifications still waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.prune();
        self.pending.len()
    }

    fn deliver(&self, notification: DeliveredNotification) {
        let _ = self.sender.send(notification);
    }

    fn prune(&self) {
        self.pending.retain(|_, task| !task.is_finished());
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        for entry in self.pending.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn content(title: &str) -> NotificationContent {
        NotificationContent {
            title: title.to_string(),
            body: "body".to_string(),
            appointment_id: None,
        }
    }

    #[tokio::test]
    async fn test_immediate_is_delivered() {
        let dispatcher = NotificationDispatcher::new(10);
        let mut rx = dispatcher.subscribe();

        dispatcher
            .schedule_local("user-1", content("hello"), Trigger::Immediate)
            .unwrap();

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.recipient, "user-1");
        assert_eq!(delivered.content.title, "hello");
    }

    #[tokio::test]
    async fn test_scheduled_fires_later() {
        let dispatcher = NotificationDispatcher::new(10);
        let mut rx = dispatcher.subscribe();

        let at = Utc::now() + Duration::milliseconds(50);
        let handle = dispatcher
            .schedule_local("user-1", content("reminder"), Trigger::At(at))
            .unwrap();
        assert_eq!(dispatcher.pending_count(), 1);

        let delivered = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.content.title, "reminder");
        assert!(delivered.delivered_at >= at);

        // The task finishes right after sending.
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while dispatcher.is_pending(handle) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_prevents_delivery() {
        let dispatcher = NotificationDispatcher::new(10);
        let mut rx = dispatcher.subscribe();

        let handle = dispatcher
            .schedule_local(
                "user-1",
                content("never"),
                Trigger::At(Utc::now() + Duration::milliseconds(100)),
            )
            .unwrap();
        assert!(dispatcher.is_pending(handle));
        assert!(dispatcher.cancel(handle));
        assert!(!dispatcher.is_pending(handle));
        assert!(!dispatcher.cancel(handle));

        let result = tokio::time::timeout(std::time::Duration::from_millis(300), rx.recv()).await;
        assert!(result.is_err(), "cancelled notification was delivered");
    }

    #[tokio::test]
    async fn test_past_trigger_and_full_queue() {
        let dispatcher = NotificationDispatcher::new(1);

        let err = dispatcher
            .schedule_local("u", content("late"), Trigger::At(Utc::now() - Duration::minutes(1)))
            .unwrap_err();
        assert!(matches!(err, NotificationError::TriggerInPast(_)));

        let later = Trigger::At(Utc::now() + Duration::hours(1));
        dispatcher.schedule_local("u", content("a"), later).unwrap();
        let err = dispatcher.schedule_local("u", content("b"), later).unwrap_err();
        assert!(matches!(err, NotificationError::QueueFull(1)));

        // Immediate delivery does not occupy the queue.
        dispatcher
            .schedule_local("u", content("now"), Trigger::Immediate)
            .unwrap();
    }
}

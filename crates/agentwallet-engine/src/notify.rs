//! External notification hooks
//!
//! Notifications are best-effort: delivery runs under a bounded timeout and
//! a failure never blocks admission.

use agentwallet_types::AgentId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// An outbound alert about a governance event
#[derive(Debug, Clone)]
pub struct Notification {
    pub agent_id: Option<AgentId>,
    pub kind: String,
    pub message: String,
}

impl Notification {
    pub fn new(agent_id: Option<AgentId>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            agent_id,
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Delivery hook for escalations, dead-man triggers and kill-switch events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Default sink: structured log lines only
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) {
        warn!(
            agent = notification.agent_id.map(|a| a.to_string()).unwrap_or_default(),
            kind = %notification.kind,
            "{}",
            notification.message
        );
    }
}

/// Fire-and-forget with the bounded timeout applied
pub async fn notify_best_effort(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let kind = notification.kind.clone();
    if tokio::time::timeout(NOTIFY_TIMEOUT, notifier.notify(notification))
        .await
        .is_err()
    {
        warn!(kind = %kind, "notification hook timed out");
    }
}

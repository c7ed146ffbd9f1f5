//! Status Notifications
//!
//! Push-side of status reporting. Every persisted state transition emits a
//! notification after the write commits, so a pull via status query can
//! never observe an older state than the one just pushed. Delivery is
//! best-effort; dropped events are recovered by polling.

use tokio::sync::broadcast;

use crate::types::{RunState, RunStatus, WorkflowRun};

/// One pushed state-transition event
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub report_id: String,
    pub state: RunState,
    pub status: RunStatus,
}

/// Sink for state-transition events. Implementations must not block the
/// workflow; a slow or absent subscriber never stalls a transition.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, run: &WorkflowRun);
}

/// Notifier that discards all events. Pull-only deployments use this.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl StatusNotifier for NoopNotifier {
    fn notify(&self, _run: &WorkflowRun) {}
}

/// Fan-out notifier backed by a tokio broadcast channel.
#[derive(Debug)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<StatusEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl StatusNotifier for BroadcastNotifier {
    fn notify(&self, run: &WorkflowRun) {
        let event = StatusEvent {
            report_id: run.report_id.clone(),
            state: run.state,
            status: RunStatus::from(run),
        };
        // send only fails when no subscriber exists, which is fine
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReportInput;

    #[tokio::test]
    async fn test_broadcast_delivers_transition() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        let mut run = WorkflowRun::new("r1", ReportInput::default());
        run.state = RunState::AwaitingApproval;
        notifier.notify(&run);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.report_id, "r1");
        assert_eq!(event.state, RunState::AwaitingApproval);
        assert_eq!(event.status.state, RunState::AwaitingApproval);
    }

    #[test]
    fn test_notify_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(8);
        let run = WorkflowRun::new("r1", ReportInput::default());
        notifier.notify(&run);
        NoopNotifier.notify(&run);
    }
}

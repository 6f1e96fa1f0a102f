//! Execution events and notifiers.
//!
//! The executor reports progress through an [`ExecutionNotifier`] so callers
//! can stream it to a UI, persist it, or ignore it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while a chain runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The run has started.
  RunStarted { execution_id: String, steps: usize },

  /// A step has been handed to a worker.
  StepStarted {
    execution_id: String,
    step_id: String,
  },

  /// A step finished and its outputs are in the store.
  StepCompleted {
    execution_id: String,
    step_id: String,
    produced: usize,
    duration_ms: u64,
  },

  /// A step failed.
  StepFailed {
    execution_id: String,
    step_id: String,
    error: String,
  },

  /// Every step succeeded.
  RunCompleted { execution_id: String },

  /// The run was aborted.
  RunFailed { execution_id: String, error: String },
}

/// Receives execution events.
///
/// `notify` is called from the coordinating task, never from a worker, so
/// events for one run arrive in a consistent order.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls the scheduler. Volume is a
  // handful of events per step.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channel_notifier_forwards_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(tx);

    notifier.notify(ExecutionEvent::RunCompleted {
      execution_id: "exec-1".to_string(),
    });

    assert_eq!(
      rx.try_recv().unwrap(),
      ExecutionEvent::RunCompleted {
        execution_id: "exec-1".to_string()
      }
    );
  }

  #[test]
  fn test_channel_notifier_ignores_dropped_receiver() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    ChannelNotifier::new(tx).notify(ExecutionEvent::RunCompleted {
      execution_id: "exec-1".to_string(),
    });
  }
}

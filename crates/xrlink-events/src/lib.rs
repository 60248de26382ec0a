//! Event plumbing between the host session and the native callbacks.
//!
//! - [`CallbackRegistry`] keeps application callbacks attached to whichever
//!   session is active and buffers registrations made before one exists.
//! - [`InputEventDispatcher`] marshals input events into descriptors.
//! - [`LifecycleHub`] broadcasts lifecycle transitions to in-process
//!   observers and keeps a short history of them.

mod dispatch;
mod registry;

pub use dispatch::{DispatchOutcome, InputEventDispatcher};
pub use registry::{CallbackRegistry, EventHandler, Registration};

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use xrlink_protocol::LifecycleTransition;

const HISTORY_LIMIT: usize = 128;

#[derive(Clone)]
pub struct LifecycleHub {
    sender: broadcast::Sender<LifecycleTransition>,
    history: Arc<Mutex<VecDeque<LifecycleTransition>>>,
}

impl LifecycleHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            history: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn publish(&self, transition: LifecycleTransition) {
        debug!(from = ?transition.from, to = ?transition.to, "lifecycle transition");
        {
            let mut history = self.history.lock();
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(transition.clone());
        }
        let _ = self.sender.send(transition);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleTransition> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<LifecycleTransition> {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Most recent transitions, oldest first.
    pub fn history(&self) -> Vec<LifecycleTransition> {
        self.history.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use futures_util::StreamExt;
    use xrlink_protocol::{LifecycleState, SessionMode};

    fn transition(from: LifecycleState, to: LifecycleState) -> LifecycleTransition {
        LifecycleTransition::new(from, to, SessionMode::ImmersiveVr, None)
    }

    #[tokio::test]
    async fn subscribers_receive_published_transitions() -> Result<()> {
        let hub = LifecycleHub::new(8);
        let mut stream = hub.subscribe_stream();
        hub.publish(transition(
            LifecycleState::Uninitialized,
            LifecycleState::CapabilityChecking,
        ));
        let received = stream.next().await.expect("stream open")?;
        assert_eq!(received.to, LifecycleState::CapabilityChecking);
        Ok(())
    }

    #[test]
    fn history_is_bounded() {
        let hub = LifecycleHub::new(4);
        for _ in 0..HISTORY_LIMIT + 3 {
            hub.publish(transition(
                LifecycleState::CapabilityChecking,
                LifecycleState::CapabilityConfirmed,
            ));
        }
        assert_eq!(hub.history().len(), HISTORY_LIMIT);
    }
}

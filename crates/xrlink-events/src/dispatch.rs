use std::sync::Arc;

use tracing::{debug, warn};
use xrlink_protocol::layout::INPUT_SOURCE_DESCRIPTOR_SIZE;
use xrlink_protocol::{
    HeapLease, InputFn, NativeHeap, SessionEvent, UserData, XrSessionPort, encode_input_source,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The callback received the descriptor of the source at `index`.
    Delivered { index: usize },
    /// The originating source is no longer in the session's list.
    SourceNotFound,
    /// The event carried no input source.
    MissingSource,
    AllocationFailed,
}

/// Turns host input events into 20-byte descriptors for the native side.
#[derive(Clone)]
pub struct InputEventDispatcher {
    heap: Arc<dyn NativeHeap>,
}

impl InputEventDispatcher {
    pub fn new(heap: Arc<dyn NativeHeap>) -> Self {
        Self { heap }
    }

    /// Locates the event's source in the live list by identity, then invokes
    /// `callback` with a freshly allocated descriptor that is freed on return.
    pub fn dispatch(
        &self,
        session: &dyn XrSessionPort,
        event: &SessionEvent,
        callback: &InputFn,
        user_data: UserData,
    ) -> DispatchOutcome {
        let Some(origin) = event.input_source.as_ref() else {
            warn!(event = %event.kind, "input event without source; dropped");
            return DispatchOutcome::MissingSource;
        };

        let sources = session.input_sources();
        let Some(index) = sources.iter().position(|source| source.id == origin.id) else {
            warn!(
                event = %event.kind,
                source = %origin.id,
                "input source not found in session list; dropped"
            );
            return DispatchOutcome::SourceNotFound;
        };

        let Some(mut descriptor) =
            HeapLease::alloc(self.heap.as_ref(), INPUT_SOURCE_DESCRIPTOR_SIZE)
        else {
            warn!(event = %event.kind, "descriptor allocation failed; dropped");
            return DispatchOutcome::AllocationFailed;
        };
        encode_input_source(&mut descriptor, 0, &sources[index], index as i32);
        debug!(event = %event.kind, index, "dispatching input event");
        callback(&descriptor, user_data);
        DispatchOutcome::Delivered { index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use parking_lot::Mutex;
    use xrlink_headless::HeadlessSystem;
    use xrlink_protocol::{
        Handedness, SessionEventKind, SessionInit, SessionMode, SystemHeap, XrSystemPort,
        decode_input_source,
    };

    #[tokio::test]
    async fn descriptor_reports_live_index_and_is_freed() -> Result<()> {
        let system = HeadlessSystem::default();
        system
            .request_session(SessionMode::ImmersiveVr, &SessionInit::default())
            .await?;
        let session = system.last_session().expect("granted");
        let _left = session.add_controller(Handedness::Left);
        let right = session.add_hand(Handedness::Right);

        let heap = Arc::new(SystemHeap::new());
        let dispatcher = InputEventDispatcher::new(heap.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: InputFn = Arc::new(move |bytes: &[u8], user: UserData| {
            sink.lock().push((bytes.to_vec(), user));
        });

        let outcome = dispatcher.dispatch(
            session.as_ref(),
            &SessionEvent::input(SessionEventKind::Select, right.clone()),
            &callback,
            UserData(9),
        );
        assert_eq!(outcome, DispatchOutcome::Delivered { index: 1 });

        let seen = seen.lock();
        let (bytes, user) = &seen[0];
        assert_eq!(*user, UserData(9));
        let (descriptor, _) = decode_input_source(bytes, 0).expect("20 bytes");
        assert_eq!(descriptor.index, 1);
        assert_eq!(descriptor.handedness, Handedness::Right);
        assert!(descriptor.has_hand);
        assert!(descriptor.has_controller);
        assert_eq!(heap.outstanding(), 0);
        assert_eq!(heap.allocations(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn removed_source_is_dropped_without_callback() -> Result<()> {
        let system = HeadlessSystem::default();
        system
            .request_session(SessionMode::ImmersiveVr, &SessionInit::default())
            .await?;
        let session = system.last_session().expect("granted");
        let stale = session.add_controller(Handedness::Left);
        session.remove_input_source(stale.id);

        let heap = Arc::new(SystemHeap::new());
        let dispatcher = InputEventDispatcher::new(heap.clone());
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let callback: InputFn = Arc::new(move |_: &[u8], _: UserData| *counter.lock() += 1);

        let outcome = dispatcher.dispatch(
            session.as_ref(),
            &SessionEvent::input(SessionEventKind::SelectStart, stale),
            &callback,
            UserData(0),
        );
        assert_eq!(outcome, DispatchOutcome::SourceNotFound);
        assert_eq!(*calls.lock(), 0);
        assert_eq!(heap.allocations(), 0);
        Ok(())
    }
}

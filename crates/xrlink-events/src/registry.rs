use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::{debug, instrument};
use xrlink_protocol::{
    BridgeError, BridgeResult, InputFn, ListenerId, NativeHeap, SessionEvent, SessionEventKind,
    SessionEventListener, SessionFn, UserData, XrSessionPort,
};

use crate::dispatch::InputEventDispatcher;

/// What to invoke when a registered event fires.
#[derive(Clone)]
pub enum EventHandler {
    /// `select`, `selectstart`, `selectend`: receives an input descriptor.
    Input(InputFn),
    /// `blur`, `focus`: receives only the user data.
    Session(SessionFn),
}

#[derive(Clone)]
pub struct Registration {
    pub handler: EventHandler,
    pub user_data: UserData,
}

#[derive(Default)]
struct RegistryState {
    registrations: IndexMap<SessionEventKind, Registration>,
    /// Kinds registered while no session was attached, in registration order.
    pending: IndexSet<SessionEventKind>,
    attached: IndexMap<SessionEventKind, ListenerId>,
    session: Option<Arc<dyn XrSessionPort>>,
}

struct RegistryInner {
    dispatcher: InputEventDispatcher,
    state: Mutex<RegistryState>,
}

/// Holds the application's event callbacks and keeps them attached to the
/// active session.
///
/// Registrations made without a session are buffered and attached in order
/// when [`CallbackRegistry::activate`] is called.
#[derive(Clone)]
pub struct CallbackRegistry {
    inner: Arc<RegistryInner>,
}

impl CallbackRegistry {
    pub fn new(heap: Arc<dyn NativeHeap>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                dispatcher: InputEventDispatcher::new(heap),
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    pub fn register_input(
        &self,
        kind: SessionEventKind,
        callback: InputFn,
        user_data: UserData,
    ) -> BridgeResult<()> {
        if !kind.is_input() {
            return Err(BridgeError::InvalidArgument(format!(
                "{kind} does not carry an input source"
            )));
        }
        self.register(
            kind,
            Registration {
                handler: EventHandler::Input(callback),
                user_data,
            },
        );
        Ok(())
    }

    pub fn register_session(
        &self,
        kind: SessionEventKind,
        callback: SessionFn,
        user_data: UserData,
    ) -> BridgeResult<()> {
        if !matches!(kind, SessionEventKind::Blur | SessionEventKind::Focus) {
            return Err(BridgeError::InvalidArgument(format!(
                "{kind} is not a visibility event"
            )));
        }
        self.register(
            kind,
            Registration {
                handler: EventHandler::Session(callback),
                user_data,
            },
        );
        Ok(())
    }

    /// Stores `registration`, replacing any earlier one for `kind`. With a
    /// session attached the listener is (re)attached immediately.
    #[instrument(skip(self, registration), fields(kind = %kind))]
    pub fn register(&self, kind: SessionEventKind, registration: Registration) {
        let session = {
            let mut state = self.inner.state.lock();
            state.registrations.insert(kind, registration);
            match state.session.clone() {
                Some(session) => session,
                None => {
                    state.pending.insert(kind);
                    debug!("no active session; registration buffered");
                    return;
                }
            }
        };
        self.attach(&session, kind);
    }

    /// Attaches every buffered registration to `session` and clears the
    /// buffer. Returns how many listeners were attached.
    #[instrument(skip_all)]
    pub fn activate(&self, session: Arc<dyn XrSessionPort>) -> usize {
        let pending: Vec<SessionEventKind> = {
            let mut state = self.inner.state.lock();
            state.session = Some(session.clone());
            state.pending.drain(..).collect()
        };
        for kind in &pending {
            self.attach(&session, *kind);
        }
        debug!(replayed = pending.len(), "pending registrations attached");
        pending.len()
    }

    /// Removes every listener from the current session. Registrations are
    /// kept and become pending for the next session.
    pub fn deactivate(&self) {
        let (session, attached) = {
            let mut state = self.inner.state.lock();
            let attached: Vec<ListenerId> = state.attached.drain(..).map(|(_, id)| id).collect();
            let kinds: Vec<SessionEventKind> = state.registrations.keys().copied().collect();
            state.pending.extend(kinds);
            (state.session.take(), attached)
        };
        if let Some(session) = session {
            for id in attached {
                session.remove_event_listener(id);
            }
        }
    }

    pub fn pending(&self) -> Vec<SessionEventKind> {
        self.inner.state.lock().pending.iter().copied().collect()
    }

    pub fn attached(&self) -> Vec<SessionEventKind> {
        self.inner.state.lock().attached.keys().copied().collect()
    }

    pub fn is_registered(&self, kind: SessionEventKind) -> bool {
        self.inner.state.lock().registrations.contains_key(&kind)
    }

    fn attach(&self, session: &Arc<dyn XrSessionPort>, kind: SessionEventKind) {
        let listener = event_listener(Arc::downgrade(&self.inner), kind);
        let id = session.add_event_listener(kind, listener);
        let replaced = self.inner.state.lock().attached.insert(kind, id);
        if let Some(old) = replaced {
            session.remove_event_listener(old);
        }
        debug!(%kind, listener = %id, "listener attached");
    }
}

fn event_listener(registry: Weak<RegistryInner>, kind: SessionEventKind) -> SessionEventListener {
    Arc::new(move |session: &dyn XrSessionPort, event: &SessionEvent| {
        let Some(registry) = registry.upgrade() else {
            return;
        };
        let Some(registration) = registry.state.lock().registrations.get(&kind).cloned() else {
            return;
        };
        match &registration.handler {
            EventHandler::Input(callback) => {
                registry
                    .dispatcher
                    .dispatch(session, event, callback, registration.user_data);
            }
            EventHandler::Session(callback) => callback(registration.user_data),
        }
    })
}

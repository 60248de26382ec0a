//! Session lifecycle controller and frame marshaling pipeline.
//!
//! [`XrRuntime`] owns the process-wide session singleton and the
//! current-frame context. It is the single writer of both: the controller
//! methods here assign and clear the session, the frame pipeline in
//! [`frame`] sets and clears the frame context around each native frame
//! callback, and the queries in [`queries`] only read them.

pub mod frame;
pub mod queries;

pub use frame::{FrameOutcome, encode_frame_hands, encode_frame_views};

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};
use xrlink_events::{CallbackRegistry, LifecycleHub};
use xrlink_protocol::{
    BridgeError, BridgeResult, ErrorCode, FrameRequestId, GraphicsContextPort, InputFn,
    LifecycleState, LifecycleTransition, ListenerId, NativeCallbacks, NativeHeap,
    ReferenceSpace, ReferenceSpaceType, SessionEvent, SessionEventKind, SessionEventListener,
    SessionFeature, SessionFn, SessionId, SessionInit, SessionMode, UserData, XrSessionPort,
    XrSystemPort,
};

use crate::frame::FrameContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Coordinate system requested once a session is granted.
    pub reference_space: ReferenceSpaceType,
    /// Clear the depth buffer before every frame callback. Some hosts only
    /// keep delivering frames while they observe rendering activity.
    pub clear_depth_each_frame: bool,
    /// Capacity of the lifecycle broadcast channel.
    pub lifecycle_buffer: usize,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reference_space: ReferenceSpaceType::Local,
            clear_depth_each_frame: true,
            lifecycle_buffer: 64,
        }
    }
}

#[derive(Clone)]
pub(crate) struct ActiveSession {
    pub(crate) id: SessionId,
    pub(crate) port: Arc<dyn XrSessionPort>,
    /// Set once negotiation finishes; the frame loop never runs before that.
    pub(crate) reference_space: Option<ReferenceSpace>,
    pub(crate) frame_request: Option<FrameRequestId>,
    end_listener: ListenerId,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
pub(crate) struct ControllerState {
    pub(crate) phase: LifecycleState,
    pub(crate) mode: SessionMode,
    pub(crate) callbacks: NativeCallbacks,
    pub(crate) user_data: UserData,
    pub(crate) active: Option<ActiveSession>,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    system: Option<Arc<dyn XrSystemPort>>,
    pub(crate) graphics: Arc<dyn GraphicsContextPort>,
    pub(crate) heap: Arc<dyn NativeHeap>,
    registry: CallbackRegistry,
    lifecycle: LifecycleHub,
    pub(crate) state: Mutex<ControllerState>,
    pub(crate) frame: Mutex<Option<FrameContext>>,
}

/// The session lifecycle controller.
#[derive(Clone)]
pub struct XrRuntime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl XrRuntime {
    /// `system` is `None` when the platform exposes no XR implementation.
    pub fn new(
        config: RuntimeConfig,
        system: Option<Arc<dyn XrSystemPort>>,
        graphics: Arc<dyn GraphicsContextPort>,
        heap: Arc<dyn NativeHeap>,
    ) -> Self {
        let lifecycle = LifecycleHub::new(config.lifecycle_buffer);
        let registry = CallbackRegistry::new(heap.clone());
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                system,
                graphics,
                heap,
                registry,
                lifecycle,
                state: Mutex::new(ControllerState::default()),
                frame: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_weak(inner: &Weak<RuntimeInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.lock().phase
    }

    pub fn mode(&self) -> SessionMode {
        self.inner.state.lock().mode
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner
            .state
            .lock()
            .active
            .as_ref()
            .map(|active| active.id.clone())
    }

    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .state
            .lock()
            .active
            .as_ref()
            .map(|active| active.started_at)
    }

    pub fn lifecycle(&self) -> &LifecycleHub {
        &self.inner.lifecycle
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleTransition> {
        self.inner.lifecycle.subscribe()
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.inner.registry
    }

    /// Stores the mode and callbacks, then queries host support for the mode.
    ///
    /// Failures are reported through the error callback and leave the
    /// controller in `Unsupported`; the same error is returned.
    #[instrument(skip(self, callbacks, user_data), fields(mode = %mode))]
    pub async fn init(
        &self,
        mode: SessionMode,
        callbacks: NativeCallbacks,
        user_data: UserData,
    ) -> BridgeResult<()> {
        let transition = {
            let mut state = self.inner.state.lock();
            if !state.phase.accepts_init() {
                return Err(BridgeError::InvalidState(format!(
                    "init is not allowed while {:?}",
                    state.phase
                )));
            }
            state.mode = mode;
            state.callbacks = callbacks;
            state.user_data = user_data;
            transition(&mut state, LifecycleState::CapabilityChecking)
        };
        self.inner.lifecycle.publish(transition);

        let Some(system) = self.inner.system.clone() else {
            return Err(self.fail_init(BridgeError::ApiUnsupported));
        };
        match system.is_session_supported(mode).await {
            Ok(true) => {
                self.set_phase(LifecycleState::CapabilityConfirmed);
                info!("session mode supported");
                Ok(())
            }
            Ok(false) => Err(self.fail_init(BridgeError::SessionUnsupported(mode))),
            Err(error) => Err(self.fail_init(BridgeError::CapabilityQuery(error))),
        }
    }

    /// Requests a session for the initialised mode, first with the mode's
    /// optional features and once more with required features only.
    #[instrument(skip(self))]
    pub async fn request_session(&self) -> BridgeResult<()> {
        let (system, mode) = self.begin_request()?;
        let init = SessionInit::for_mode(mode);
        let port = match system.request_session(mode, &init).await {
            Ok(port) => port,
            Err(first) => {
                warn!(%first, "session request rejected; retrying without optional features");
                match system.request_session(mode, &init.required_only()).await {
                    Ok(port) => port,
                    Err(second) => {
                        return Err(self.fail_request(BridgeError::SessionRequest(second)));
                    }
                }
            }
        };
        self.start_session(port).await
    }

    /// Requests an `immersive-ar` session directly, without fallback.
    #[instrument(skip(self))]
    pub async fn request_ar_session(&self) -> BridgeResult<()> {
        let (system, _) = self.begin_request()?;
        let init = SessionInit {
            required: Vec::new(),
            optional: vec![
                SessionFeature::HitTest,
                SessionFeature::PlaneDetection,
                SessionFeature::HandTracking,
            ],
        };
        match system.request_session(SessionMode::ImmersiveAr, &init).await {
            Ok(port) => {
                self.inner.state.lock().mode = SessionMode::ImmersiveAr;
                self.start_session(port).await
            }
            Err(error) => Err(self.fail_request(BridgeError::SessionRequest(error))),
        }
    }

    /// Application-initiated termination. The session-end callback fires
    /// when the host confirms with its `end` event.
    #[instrument(skip(self))]
    pub fn request_exit(&self) {
        let (port, transition) = {
            let mut state = self.inner.state.lock();
            let Some(port) = state.active.as_ref().map(|active| active.port.clone()) else {
                return;
            };
            let transition = (state.phase == LifecycleState::SessionActive)
                .then(|| transition(&mut state, LifecycleState::SessionEnding));
            (port, transition)
        };
        if let Some(transition) = transition {
            self.inner.lifecycle.publish(transition);
        }
        info!("session exit requested");
        port.end();
    }

    /// Forwards the depth range to the active session; no-op without one.
    pub fn set_projection_params(&self, near: f32, far: f32) {
        let port = self
            .inner
            .state
            .lock()
            .active
            .as_ref()
            .map(|active| active.port.clone());
        if let Some(port) = port {
            port.set_depth_range(near, far);
        }
    }

    pub fn set_input_callback(
        &self,
        kind: SessionEventKind,
        callback: InputFn,
        user_data: UserData,
    ) -> BridgeResult<()> {
        self.inner
            .registry
            .register_input(kind, callback, user_data)
    }

    pub fn set_session_callback(
        &self,
        kind: SessionEventKind,
        callback: SessionFn,
        user_data: UserData,
    ) -> BridgeResult<()> {
        self.inner
            .registry
            .register_session(kind, callback, user_data)
    }

    /// Converges application- and host-initiated termination. Idempotent per
    /// session: only the first call for `session_id` has any effect.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn handle_session_end(&self, session_id: &SessionId) -> bool {
        let (active, transitions, callback, user_data) = {
            let mut state = self.inner.state.lock();
            if state.active.as_ref().map(|active| &active.id) != Some(session_id) {
                return false;
            }
            let Some(active) = state.active.take() else {
                return false;
            };
            let mut transitions = Vec::with_capacity(2);
            if state.phase != LifecycleState::SessionEnding {
                transitions.push(transition(&mut state, LifecycleState::SessionEnding));
            }
            transitions.push(transition(&mut state, LifecycleState::Ended));
            for record in &mut transitions {
                record.session_id = Some(active.id.clone());
            }
            (
                active,
                transitions,
                state.callbacks.session_end.clone(),
                state.user_data,
            )
        };

        if let Some(request) = active.frame_request {
            active.port.cancel_animation_frame(request);
        }
        active.port.remove_event_listener(active.end_listener);
        self.inner.registry.deactivate();
        for transition in transitions {
            self.inner.lifecycle.publish(transition);
        }
        info!("session ended");
        if let Some(callback) = callback {
            callback(user_data);
        }
        true
    }

    fn begin_request(&self) -> BridgeResult<(Arc<dyn XrSystemPort>, SessionMode)> {
        let (mode, transition) = {
            let mut state = self.inner.state.lock();
            if state.phase != LifecycleState::CapabilityConfirmed {
                return Err(BridgeError::InvalidState(format!(
                    "session request is not allowed while {:?}",
                    state.phase
                )));
            }
            (
                state.mode,
                transition(&mut state, LifecycleState::SessionRequesting),
            )
        };
        self.inner.lifecycle.publish(transition);
        let system = self.inner.system.clone().ok_or(BridgeError::ApiUnsupported)?;
        Ok((system, mode))
    }

    /// Assigns the singleton, announces the session, replays buffered
    /// registrations, then negotiates graphics and the reference space
    /// before starting the frame loop.
    async fn start_session(&self, port: Arc<dyn XrSessionPort>) -> BridgeResult<()> {
        let id = SessionId::default();
        let end_listener = port.add_event_listener(
            SessionEventKind::End,
            end_listener(Arc::downgrade(&self.inner), id.clone()),
        );

        let (transition, callback, user_data) = {
            let mut state = self.inner.state.lock();
            state.active = Some(ActiveSession {
                id: id.clone(),
                port: port.clone(),
                reference_space: None,
                frame_request: None,
                end_listener,
                started_at: Utc::now(),
            });
            let mut transition = transition(&mut state, LifecycleState::SessionActive);
            transition.session_id = Some(id.clone());
            (transition, state.callbacks.session_start.clone(), state.user_data)
        };
        self.inner.lifecycle.publish(transition);
        info!(session_id = %id, mode = %port.mode(), "session started");

        if let Some(callback) = callback {
            callback(user_data);
        }
        self.inner.registry.activate(port.clone());

        if let Err(error) = self.inner.graphics.make_xr_compatible().await {
            return Err(self.abort_session(&port, BridgeError::GraphicsIncompatible(error)));
        }
        if let Err(error) = port.attach_base_layer(self.inner.graphics.as_ref()) {
            return Err(self.abort_session(&port, BridgeError::GraphicsIncompatible(error)));
        }
        let space = match port
            .request_reference_space(self.inner.config.reference_space)
            .await
        {
            Ok(space) => space,
            Err(error) => {
                return Err(self.abort_session(&port, BridgeError::ReferenceSpace(error)));
            }
        };

        {
            let mut state = self.inner.state.lock();
            match state.active.as_mut() {
                Some(active) if active.id == id => active.reference_space = Some(space),
                _ => {
                    warn!(session_id = %id, "session ended during negotiation");
                    return Ok(());
                }
            }
        }
        self.schedule_frame(&port, &id);
        Ok(())
    }

    fn fail_init(&self, error: BridgeError) -> BridgeError {
        error!(%error, "capability check failed");
        self.set_phase_with_error(LifecycleState::Unsupported, error.code());
        self.report(&error);
        error
    }

    fn fail_request(&self, error: BridgeError) -> BridgeError {
        error!(%error, "session request failed");
        self.set_phase_with_error(LifecycleState::CapabilityConfirmed, error.code());
        self.report(&error);
        error
    }

    /// Negotiation failed after the host granted the session: report, then
    /// end it so the regular end path runs.
    fn abort_session(&self, port: &Arc<dyn XrSessionPort>, error: BridgeError) -> BridgeError {
        error!(%error, "session negotiation failed");
        self.report(&error);
        port.end();
        error
    }

    fn report(&self, error: &BridgeError) {
        let Some(code) = error.code() else {
            return;
        };
        let (callback, user_data) = {
            let state = self.inner.state.lock();
            (state.callbacks.error.clone(), state.user_data)
        };
        if let Some(callback) = callback {
            callback(user_data, code.as_raw());
        }
    }

    fn set_phase(&self, to: LifecycleState) {
        self.set_phase_with_error(to, None);
    }

    fn set_phase_with_error(&self, to: LifecycleState, code: Option<ErrorCode>) {
        let mut record = {
            let mut state = self.inner.state.lock();
            transition(&mut state, to)
        };
        if let Some(code) = code {
            record = record.with_error_code(code.as_raw());
        }
        self.inner.lifecycle.publish(record);
    }
}

fn transition(state: &mut ControllerState, to: LifecycleState) -> LifecycleTransition {
    let from = state.phase;
    state.phase = to;
    LifecycleTransition::new(
        from,
        to,
        state.mode,
        state.active.as_ref().map(|active| active.id.clone()),
    )
}

fn end_listener(inner: Weak<RuntimeInner>, session_id: SessionId) -> SessionEventListener {
    Arc::new(move |_: &dyn XrSessionPort, _: &SessionEvent| {
        if let Some(runtime) = XrRuntime::from_weak(&inner) {
            runtime.handle_session_end(&session_id);
        }
    })
}

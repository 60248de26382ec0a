//! Native callback shapes.
//!
//! Each callback mirrors a plain function pointer on the native side and is
//! paired with an opaque [`UserData`] token that the bridge passes through
//! without looking at it. Buffer arguments are only valid for the duration of
//! the call.

use std::fmt;
use std::sync::Arc;

/// Opaque token supplied at registration and handed back on every invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UserData(pub usize);

/// `error(user_data, error_code)`
pub type ErrorFn = Arc<dyn Fn(UserData, i32) + Send + Sync>;
/// `session_start(user_data)`, `session_end(user_data)`, `blur`, `focus`.
pub type SessionFn = Arc<dyn Fn(UserData) + Send + Sync>;
/// `input_event(descriptor, user_data)`; the descriptor is 20 bytes.
pub type InputFn = Arc<dyn Fn(&[u8], UserData) + Send + Sync>;
/// `frame(user_data, time, model_matrix, views, hands)`.
pub type FrameFn = Arc<dyn Fn(UserData, f64, &[u8], &[u8], &[u8]) + Send + Sync>;

/// Callbacks supplied to `init`.
#[derive(Clone, Default)]
pub struct NativeCallbacks {
    pub frame: Option<FrameFn>,
    pub session_start: Option<SessionFn>,
    pub session_end: Option<SessionFn>,
    pub error: Option<ErrorFn>,
}

impl NativeCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_frame(
        mut self,
        callback: impl Fn(UserData, f64, &[u8], &[u8], &[u8]) + Send + Sync + 'static,
    ) -> Self {
        self.frame = Some(Arc::new(callback));
        self
    }

    pub fn on_session_start(mut self, callback: impl Fn(UserData) + Send + Sync + 'static) -> Self {
        self.session_start = Some(Arc::new(callback));
        self
    }

    pub fn on_session_end(mut self, callback: impl Fn(UserData) + Send + Sync + 'static) -> Self {
        self.session_end = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(UserData, i32) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for NativeCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCallbacks")
            .field("frame", &self.frame.is_some())
            .field("session_start", &self.session_start.is_some())
            .field("session_end", &self.session_end.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

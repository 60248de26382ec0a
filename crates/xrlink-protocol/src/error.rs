//! Error types for the XR marshaling layer.

use crate::mode::SessionMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by the host XR implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("rejected by host: {0}")]
    Rejected(String),
    #[error("not supported by host: {0}")]
    NotSupported(String),
    #[error("invalid host state: {0}")]
    InvalidState(String),
}

/// Convenience result type for host port calls.
pub type HostResult<T> = Result<T, HostError>;

/// Error codes delivered to the native error callback.
///
/// `-2..=-4` are fixed by the native ABI and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// No XR support on this platform.
    ApiUnsupported = -2,
    /// Graphics context cannot render XR content.
    GlIncapable = -3,
    /// Session mode unsupported, capability query failed or session request failed.
    SessionUnsupported = -4,
    /// The reference space could not be established.
    ReferenceSpaceUnavailable = -5,
}

impl ErrorCode {
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Errors surfaced to the application.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("immersive XR is not available on this platform")]
    ApiUnsupported,
    #[error("session mode {0} is not supported")]
    SessionUnsupported(SessionMode),
    #[error("capability query failed: {0}")]
    CapabilityQuery(HostError),
    #[error("session request failed: {0}")]
    SessionRequest(HostError),
    #[error("graphics context cannot render XR: {0}")]
    GraphicsIncompatible(HostError),
    #[error("reference space unavailable: {0}")]
    ReferenceSpace(HostError),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl BridgeError {
    /// The native error code for this failure, if it is reported through the
    /// error callback. Misuse errors carry no code.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::ApiUnsupported => Some(ErrorCode::ApiUnsupported),
            Self::SessionUnsupported(_) | Self::CapabilityQuery(_) | Self::SessionRequest(_) => {
                Some(ErrorCode::SessionUnsupported)
            }
            Self::GraphicsIncompatible(_) => Some(ErrorCode::GlIncapable),
            Self::ReferenceSpace(_) => Some(ErrorCode::ReferenceSpaceUnavailable),
            Self::InvalidState(_) | Self::InvalidArgument(_) => None,
        }
    }
}

/// Convenience result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

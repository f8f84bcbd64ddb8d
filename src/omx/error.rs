//! OMX error domain.
//!
//! The synchronous error codes shared by the component ABI and the
//! orchestration layer, plus the default fatal/recoverable split used by the
//! manager tier.

use thiserror::Error;

/// Errors produced by OMX components and by the orchestration layer itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OmxError {
    #[error("insufficient resources")]
    InsufficientResources,
    #[error("undefined error")]
    Undefined,
    #[error("component not found")]
    ComponentNotFound,
    #[error("invalid component name")]
    InvalidComponentName,
    #[error("bad parameter")]
    BadParameter,
    #[error("not implemented")]
    NotImplemented,
    #[error("underflow")]
    Underflow,
    #[error("overflow")]
    Overflow,
    #[error("hardware error")]
    Hardware,
    #[error("stream corrupt")]
    StreamCorrupt,
    #[error("ports not compatible")]
    PortsNotCompatible,
    #[error("incorrect state transition")]
    IncorrectStateTransition,
    #[error("incorrect state operation")]
    IncorrectStateOperation,
    #[error("unsupported setting")]
    UnsupportedSetting,
    #[error("unsupported index")]
    UnsupportedIndex,
    #[error("bad port index")]
    BadPortIndex,
    #[error("port unpopulated")]
    PortUnpopulated,
    #[error("component suspended")]
    ComponentSuspended,
    #[error("not ready")]
    NotReady,
    #[error("timeout")]
    Timeout,
    #[error("content uri error")]
    ContentUri,
    #[error("format not detected")]
    FormatNotDetected,
}

impl OmxError {
    /// Default fatal/recoverable classification for the manager tier.
    ///
    /// Content and transient pipeline errors restart playback with the next
    /// item; everything else tears the player down. Individual graph
    /// flavors may override this through their own error policy.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OmxError::ContentUri
                | OmxError::StreamCorrupt
                | OmxError::FormatNotDetected
                | OmxError::PortUnpopulated
                | OmxError::Underflow
                | OmxError::NotReady
                | OmxError::Timeout
        )
    }
}

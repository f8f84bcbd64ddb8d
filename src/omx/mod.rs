//! OMX component ABI.
//!
//! The command/event contract the orchestration core consumes from the
//! component library. Components are opaque: the core instantiates them by
//! name, wires tunnels, issues asynchronous commands and collects the
//! completion events the library delivers through an [`EventSink`].

mod error;
#[cfg(test)]
pub(crate) mod mock;

pub use error::OmxError;

use crate::probe::{CodecParams, PcmParams};
use std::sync::Arc;

/// Identifier the component library assigns to an instantiated component.
///
/// Identity only; the pipeline position of a component is the index of its
/// id in the owning graph's handle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub u32);

/// The OMX component states the orchestration layer transitions through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmxState {
    Loaded,
    Idle,
    Executing,
    Pause,
    WaitForResources,
}

impl OmxState {
    /// Resource-allocation rank. Transitions toward a higher rank allocate
    /// (suppliers must go first), transitions toward a lower rank release
    /// (suppliers must go last).
    pub(crate) fn rank(self) -> u8 {
        match self {
            OmxState::Loaded => 0,
            OmxState::WaitForResources => 0,
            OmxState::Idle => 1,
            OmxState::Executing => 2,
            OmxState::Pause => 2,
        }
    }
}

impl std::fmt::Display for OmxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OmxState::Loaded => "Loaded",
            OmxState::Idle => "Idle",
            OmxState::Executing => "Executing",
            OmxState::Pause => "Pause",
            OmxState::WaitForResources => "WaitForResources",
        };
        write!(f, "{}", name)
    }
}

/// Asynchronous commands accepted by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmxCommand {
    StateSet(OmxState),
    PortDisable(u32),
    PortEnable(u32),
    Flush(u32),
}

/// Tunnel buffer-supplier preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSupplier {
    Input,
    Output,
}

/// Completion payload of a `CmdComplete` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandComplete {
    StateSet(OmxState),
    PortDisable(u32),
    PortEnable(u32),
    Flush(u32),
}

/// A raw asynchronous callback from the component library.
///
/// Callbacks may arrive on library-internal threads; the sink they are
/// delivered to marshals them into the owning graph's command queue, which
/// is the only synchronization point.
#[derive(Debug, Clone)]
pub enum RawEvent {
    CmdComplete {
        component: ComponentId,
        command: CommandComplete,
        /// Some components report a non-zero error on otherwise successful
        /// transitions; the match predicate ignores it.
        error: Option<OmxError>,
    },
    PortSettingsChanged {
        component: ComponentId,
        port: u32,
        index: u32,
    },
    IndexSettingChanged {
        component: ComponentId,
        data1: u32,
        index: u32,
    },
    PortFormatDetected {
        component: ComponentId,
    },
    BufferFlag {
        component: ComponentId,
        port: u32,
        flags: u32,
    },
    Error {
        component: ComponentId,
        error: OmxError,
        port: Option<u32>,
    },
    Other {
        component: ComponentId,
        event: u32,
        data1: u32,
        data2: u32,
    },
}

impl RawEvent {
    pub fn component(&self) -> ComponentId {
        match self {
            RawEvent::CmdComplete { component, .. }
            | RawEvent::PortSettingsChanged { component, .. }
            | RawEvent::IndexSettingChanged { component, .. }
            | RawEvent::PortFormatDetected { component }
            | RawEvent::BufferFlag { component, .. }
            | RawEvent::Error { component, .. }
            | RawEvent::Other { component, .. } => *component,
        }
    }
}

/// Receiver for raw component callbacks, registered at instantiation time.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: RawEvent);
}

/// The component library.
///
/// All methods are synchronous; the asynchronous half of the ABI (command
/// completion, port settings changes, EOS, errors) arrives through the
/// [`EventSink`] passed to [`OmxCore::instantiate`]. Implementations must be
/// callable from any graph thread.
pub trait OmxCore: Send + Sync {
    /// Initializes the library. Called once per manager lifetime.
    fn init(&self) -> Result<(), OmxError>;

    /// Deinitializes the library. Called once per manager lifetime.
    fn deinit(&self);

    /// Checks that a component of this name can be instantiated.
    fn verify_component(&self, name: &str) -> Result<(), OmxError>;

    /// Checks that a component supports a role.
    fn verify_role(&self, name: &str, role: &str) -> Result<(), OmxError>;

    fn instantiate(&self, name: &str, sink: Arc<dyn EventSink>) -> Result<ComponentId, OmxError>;

    fn free(&self, component: ComponentId) -> Result<(), OmxError>;

    fn set_role(&self, component: ComponentId, role: &str) -> Result<(), OmxError>;

    fn set_buffer_supplier(
        &self,
        component: ComponentId,
        port: u32,
        supplier: BufferSupplier,
    ) -> Result<(), OmxError>;

    fn setup_tunnel(
        &self,
        out_component: ComponentId,
        out_port: u32,
        in_component: ComponentId,
        in_port: u32,
    ) -> Result<(), OmxError>;

    fn tear_down_tunnel(
        &self,
        out_component: ComponentId,
        out_port: u32,
        in_component: ComponentId,
        in_port: u32,
    ) -> Result<(), OmxError>;

    /// Issues an asynchronous command; completion arrives as a
    /// `CmdComplete` event.
    fn send_command(&self, component: ComponentId, command: OmxCommand) -> Result<(), OmxError>;

    fn set_content_uri(&self, component: ComponentId, uri: &str) -> Result<(), OmxError>;

    fn get_codec_params(&self, component: ComponentId, port: u32)
        -> Result<CodecParams, OmxError>;

    fn set_codec_params(
        &self,
        component: ComponentId,
        port: u32,
        params: &CodecParams,
    ) -> Result<(), OmxError>;

    fn set_pcm_params(
        &self,
        component: ComponentId,
        port: u32,
        params: &PcmParams,
    ) -> Result<(), OmxError>;

    /// Current volume on a port, as a percentage in `[0, 100]`.
    fn get_volume(&self, component: ComponentId, port: u32) -> Result<i32, OmxError>;

    /// Sets the volume on a port, as a percentage in `[0, 100]`.
    fn set_volume(&self, component: ComponentId, port: u32, volume: i32) -> Result<(), OmxError>;

    fn get_mute(&self, component: ComponentId, port: u32) -> Result<bool, OmxError>;

    fn set_mute(&self, component: ComponentId, port: u32, mute: bool) -> Result<(), OmxError>;
}

//! Graph event vocabulary.
//!
//! Everything a graph's state machine can be fed: user-facing requests
//! forwarded by the manager, and the typed form of the asynchronous OMX
//! callbacks. Raw callbacks are classified here, one typed event per
//! callback, before they enter the graph's command queue.

use crate::graph::GraphConfig;
use crate::omx::{CommandComplete, ComponentId, OmxError, OmxState, RawEvent};

/// Events consumed by the graph state machine.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    Load,
    Execute(GraphConfig),
    Pause,
    Seek,
    Skip { jump: i64 },
    VolumeStep { step: i32 },
    Volume(f64),
    Mute,
    Stop,
    Unload,
    /// `CmdComplete` for a state-set command.
    OmxTrans {
        component: ComponentId,
        state: OmxState,
        error: Option<OmxError>,
    },
    OmxPortDisabled {
        component: ComponentId,
        port: u32,
        error: Option<OmxError>,
    },
    OmxPortEnabled {
        component: ComponentId,
        port: u32,
        error: Option<OmxError>,
    },
    OmxPortSettings {
        component: ComponentId,
        port: u32,
        index: u32,
    },
    OmxIndexSetting {
        component: ComponentId,
        data1: u32,
        index: u32,
    },
    OmxFormatDetected {
        component: ComponentId,
    },
    OmxEos {
        component: ComponentId,
        port: u32,
        flags: u32,
    },
    /// An error raised by a component.
    OmxErr {
        component: ComponentId,
        error: OmxError,
        port: Option<u32>,
    },
    /// Catch-all for unclassified component events.
    Omx {
        component: ComponentId,
        event: u32,
        data1: u32,
        data2: u32,
    },
    /// An internal error (a failed operation), injected by the graph after
    /// dispatch. Always fatal to the pipeline.
    Err { error: OmxError, msg: String },
}

impl GraphEvent {
    /// Classifies a raw OMX callback into its typed event.
    pub fn from_omx(raw: RawEvent) -> GraphEvent {
        match raw {
            RawEvent::CmdComplete {
                component,
                command: CommandComplete::StateSet(state),
                error,
            } => GraphEvent::OmxTrans {
                component,
                state,
                error,
            },
            RawEvent::CmdComplete {
                component,
                command: CommandComplete::PortDisable(port),
                error,
            } => GraphEvent::OmxPortDisabled {
                component,
                port,
                error,
            },
            RawEvent::CmdComplete {
                component,
                command: CommandComplete::PortEnable(port),
                error,
            } => GraphEvent::OmxPortEnabled {
                component,
                port,
                error,
            },
            RawEvent::CmdComplete {
                component,
                command: CommandComplete::Flush(port),
                ..
            } => GraphEvent::Omx {
                component,
                event: 0,
                data1: port,
                data2: 0,
            },
            RawEvent::PortSettingsChanged {
                component,
                port,
                index,
            } => GraphEvent::OmxPortSettings {
                component,
                port,
                index,
            },
            RawEvent::IndexSettingChanged {
                component,
                data1,
                index,
            } => GraphEvent::OmxIndexSetting {
                component,
                data1,
                index,
            },
            RawEvent::PortFormatDetected { component } => {
                GraphEvent::OmxFormatDetected { component }
            }
            RawEvent::BufferFlag {
                component,
                port,
                flags,
            } => GraphEvent::OmxEos {
                component,
                port,
                flags,
            },
            RawEvent::Error {
                component,
                error,
                port,
            } => GraphEvent::OmxErr {
                component,
                error,
                port,
            },
            RawEvent::Other {
                component,
                event,
                data1,
                data2,
            } => GraphEvent::Omx {
                component,
                event,
                data1,
                data2,
            },
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            GraphEvent::Load => "load",
            GraphEvent::Execute(_) => "execute",
            GraphEvent::Pause => "pause",
            GraphEvent::Seek => "seek",
            GraphEvent::Skip { .. } => "skip",
            GraphEvent::VolumeStep { .. } => "volume_step",
            GraphEvent::Volume(_) => "volume",
            GraphEvent::Mute => "mute",
            GraphEvent::Stop => "stop",
            GraphEvent::Unload => "unload",
            GraphEvent::OmxTrans { .. } => "omx_trans",
            GraphEvent::OmxPortDisabled { .. } => "omx_port_disabled",
            GraphEvent::OmxPortEnabled { .. } => "omx_port_enabled",
            GraphEvent::OmxPortSettings { .. } => "omx_port_settings",
            GraphEvent::OmxIndexSetting { .. } => "omx_index_setting",
            GraphEvent::OmxFormatDetected { .. } => "omx_format_detected",
            GraphEvent::OmxEos { .. } => "omx_eos",
            GraphEvent::OmxErr { .. } => "omx_err",
            GraphEvent::Omx { .. } => "omx",
            GraphEvent::Err { .. } => "err",
        }
    }
}

/// A command queued to a graph worker thread.
#[derive(Debug)]
pub enum GraphCmd {
    Event(GraphEvent),
    /// Drains the worker and exits its thread.
    KillThread,
}

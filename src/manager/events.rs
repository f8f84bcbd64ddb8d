//! Manager event vocabulary.
//!
//! User-facing requests and the feedback events graphs post back. The
//! [`FeedbackSender`] is the graphs' only channel to the manager: a clone of
//! the manager's own command queue, so feedback is serialized with user
//! requests and no graph ever holds a reference back into the manager.

use std::sync::mpsc::SyncSender;

use crate::omx::OmxError;
use crate::probe::TrackMetadata;

/// Events consumed by the manager state machine.
#[derive(Debug, Clone)]
pub enum MgrEvent {
    Start,
    Next,
    Prev,
    Position(i64),
    VolUp,
    VolDown,
    Vol(f64),
    Mute,
    Pause,
    Stop,
    Quit,
    GraphLoaded,
    GraphExecd,
    GraphStopped,
    GraphPaused,
    GraphUnpaused,
    GraphMetadata(TrackMetadata),
    GraphVolume(i32),
    GraphUnloaded,
    GraphEop,
    Err {
        error: OmxError,
        msg: String,
        /// Manager-internal failures are always fatal; graph-reported ones
        /// go through the error policy.
        is_internal: bool,
    },
}

impl MgrEvent {
    /// Whether this is a user request the submachines hold back until they
    /// exit.
    pub(crate) fn is_user_event(&self) -> bool {
        matches!(
            self,
            MgrEvent::Next
                | MgrEvent::Prev
                | MgrEvent::Position(_)
                | MgrEvent::VolUp
                | MgrEvent::VolDown
                | MgrEvent::Vol(_)
                | MgrEvent::Mute
                | MgrEvent::Pause
                | MgrEvent::Stop
                | MgrEvent::Quit
        )
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            MgrEvent::Start => "start",
            MgrEvent::Next => "next",
            MgrEvent::Prev => "prev",
            MgrEvent::Position(_) => "position",
            MgrEvent::VolUp => "vol_up",
            MgrEvent::VolDown => "vol_down",
            MgrEvent::Vol(_) => "vol",
            MgrEvent::Mute => "mute",
            MgrEvent::Pause => "pause",
            MgrEvent::Stop => "stop",
            MgrEvent::Quit => "quit",
            MgrEvent::GraphLoaded => "graph_loaded",
            MgrEvent::GraphExecd => "graph_execd",
            MgrEvent::GraphStopped => "graph_stopped",
            MgrEvent::GraphPaused => "graph_paused",
            MgrEvent::GraphUnpaused => "graph_unpaused",
            MgrEvent::GraphMetadata(_) => "graph_metadata",
            MgrEvent::GraphVolume(_) => "graph_volume",
            MgrEvent::GraphUnloaded => "graph_unloaded",
            MgrEvent::GraphEop => "graph_eop",
            MgrEvent::Err { .. } => "err",
        }
    }
}

/// A command queued to the manager thread.
#[derive(Debug)]
pub enum MgrCmd {
    Event(MgrEvent),
    /// Drains the manager and exits its thread.
    KillThread,
}

/// Graph → manager feedback surface (§ graph feedback events). Cloneable;
/// every graph gets one at creation.
#[derive(Clone)]
pub struct FeedbackSender {
    tx: SyncSender<MgrCmd>,
}

impl FeedbackSender {
    pub(crate) fn new(tx: SyncSender<MgrCmd>) -> FeedbackSender {
        FeedbackSender { tx }
    }

    fn post(&self, event: MgrEvent) {
        // The manager may already be gone during shutdown.
        let _ = self.tx.send(MgrCmd::Event(event));
    }

    pub fn graph_loaded(&self) {
        self.post(MgrEvent::GraphLoaded);
    }

    pub fn graph_execd(&self) {
        self.post(MgrEvent::GraphExecd);
    }

    pub fn graph_stopped(&self) {
        self.post(MgrEvent::GraphStopped);
    }

    pub fn graph_paused(&self) {
        self.post(MgrEvent::GraphPaused);
    }

    pub fn graph_unpaused(&self) {
        self.post(MgrEvent::GraphUnpaused);
    }

    pub fn graph_metadata(&self, metadata: TrackMetadata) {
        self.post(MgrEvent::GraphMetadata(metadata));
    }

    pub fn graph_volume(&self, volume: i32) {
        self.post(MgrEvent::GraphVolume(volume));
    }

    pub fn graph_unloaded(&self) {
        self.post(MgrEvent::GraphUnloaded);
    }

    pub fn graph_end_of_play(&self) {
        self.post(MgrEvent::GraphEop);
    }

    pub fn graph_error(&self, error: OmxError, msg: String) {
        self.post(MgrEvent::Err {
            error,
            msg,
            is_internal: false,
        });
    }
}

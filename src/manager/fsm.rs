//! Manager state machine.
//!
//! The upper tier: sequences one graph at a time over the whole playlist.
//! `starting`, `restarting` and `stopping` wait for graph feedback before
//! anything else may happen, so user requests arriving meanwhile are
//! deferred and re-presented in FIFO order once the wait is over;
//! `quitting` drops them. A terminated machine ignores everything.

use std::collections::VecDeque;

use log::{debug, info, trace, warn};

use crate::manager::events::MgrEvent;
use crate::manager::ops::{MgrOps, PlaybackStatus};
use crate::omx::OmxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartingState {
    LoadingGraph,
    ExecutingGraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MgrState {
    Inited,
    Starting(StartingState),
    Running,
    Restarting,
    Stopping,
    Stopped,
    Quitting,
    Quitted,
}

impl MgrState {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            MgrState::Inited => "inited",
            MgrState::Starting(StartingState::LoadingGraph) => "starting.loading_graph",
            MgrState::Starting(StartingState::ExecutingGraph) => "starting.executing_graph",
            MgrState::Running => "running",
            MgrState::Restarting => "restarting",
            MgrState::Stopping => "stopping",
            MgrState::Stopped => "stopped",
            MgrState::Quitting => "quitting",
            MgrState::Quitted => "quitted",
        }
    }

    /// States that hold user requests back until their graph feedback
    /// arrives.
    fn defers_user_events(&self) -> bool {
        matches!(
            self,
            MgrState::Starting(_) | MgrState::Restarting | MgrState::Stopping
        )
    }
}

pub(crate) struct MgrFsm {
    state: MgrState,
    deferred: VecDeque<MgrEvent>,
    terminated: bool,
}

impl MgrFsm {
    pub(crate) fn new() -> MgrFsm {
        MgrFsm {
            state: MgrState::Inited,
            deferred: VecDeque::new(),
            terminated: false,
        }
    }

    pub(crate) fn terminated(&self) -> bool {
        self.terminated
    }

    pub(crate) fn process(&mut self, ops: &mut MgrOps, event: MgrEvent) {
        self.dispatch(ops, event);
        // Re-present deferred requests once the machine stops deferring;
        // a request that re-enters a waiting state parks the rest again.
        while !self.terminated && !self.state.defers_user_events() {
            let Some(deferred) = self.deferred.pop_front() else {
                break;
            };
            trace!("re-presenting deferred {}", deferred.name());
            self.dispatch(ops, deferred);
        }
    }

    fn dispatch(&mut self, ops: &mut MgrOps, event: MgrEvent) {
        if self.terminated {
            trace!("terminated, ignoring {}", event.name());
            return;
        }
        if self.state.defers_user_events() && event.is_user_event() {
            debug!("deferring {} in {}", event.name(), self.state.name());
            self.deferred.push_back(event);
            return;
        }
        if self.state == MgrState::Quitting && event.is_user_event() {
            trace!("quitting, dropping {}", event.name());
            return;
        }

        debug!("mgr {} <- {}", self.state.name(), event.name());
        match (self.state, event) {
            (MgrState::Inited, MgrEvent::Start) => {
                ops.do_load();
                self.state = MgrState::Starting(StartingState::LoadingGraph);
            }
            (MgrState::Starting(StartingState::LoadingGraph), MgrEvent::GraphLoaded) => {
                ops.do_execute();
                self.state = MgrState::Starting(StartingState::ExecutingGraph);
            }
            (MgrState::Starting(_), MgrEvent::GraphExecd) => {
                ops.do_update_status(PlaybackStatus::Playing);
                self.state = MgrState::Running;
            }
            (MgrState::Starting(_), MgrEvent::GraphUnloaded) => {
                // Nothing left to play: either the playlist was empty or a
                // restart ran off its end.
                ops.do_end_of_play();
                self.terminate();
            }
            (MgrState::Starting(_), MgrEvent::Err { error, msg, is_internal }) => {
                self.on_error(ops, error, msg, is_internal);
            }
            (MgrState::Running, MgrEvent::Next) => ops.do_next(),
            (MgrState::Running, MgrEvent::Prev) => ops.do_prev(),
            (MgrState::Running, MgrEvent::Position(position)) => ops.do_position(position),
            (MgrState::Running, MgrEvent::VolUp) => ops.do_vol_up(),
            (MgrState::Running, MgrEvent::VolDown) => ops.do_vol_down(),
            (MgrState::Running, MgrEvent::Vol(vol)) => ops.do_vol(vol),
            (MgrState::Running, MgrEvent::Mute) => ops.do_mute(),
            (MgrState::Running, MgrEvent::Pause) => ops.do_pause(),
            // Start while playing toggles pause, the media-key convention.
            (MgrState::Running, MgrEvent::Start) => ops.do_pause(),
            (MgrState::Running, MgrEvent::GraphPaused) => {
                ops.do_update_status(PlaybackStatus::Paused);
            }
            (MgrState::Running, MgrEvent::GraphUnpaused) => {
                ops.do_update_status(PlaybackStatus::Playing);
            }
            (MgrState::Running, MgrEvent::GraphMetadata(metadata)) => {
                ops.do_update_metadata(metadata);
            }
            (MgrState::Running, MgrEvent::GraphVolume(volume)) => {
                ops.do_update_volume(volume);
            }
            (MgrState::Running, MgrEvent::Stop) => {
                ops.do_stop();
                self.state = MgrState::Stopping;
            }
            (MgrState::Running, MgrEvent::Quit) => {
                ops.do_unload();
                self.state = MgrState::Quitting;
            }
            (MgrState::Running, MgrEvent::GraphEop) => {
                self.state = MgrState::Restarting;
            }
            (MgrState::Running, MgrEvent::Err { error, msg, is_internal }) => {
                self.on_error(ops, error, msg, is_internal);
            }
            (MgrState::Restarting, MgrEvent::GraphUnloaded) => {
                ops.do_load();
                self.state = MgrState::Starting(StartingState::LoadingGraph);
            }
            (MgrState::Restarting, MgrEvent::Err { error, msg, .. }) => {
                ops.do_report_fatal_error(error, msg);
                self.terminate();
            }
            (MgrState::Stopping, MgrEvent::GraphStopped) => {
                ops.do_update_status(PlaybackStatus::Stopped);
                self.state = MgrState::Stopped;
            }
            (MgrState::Stopping, MgrEvent::Err { error, msg, .. }) => {
                ops.do_report_fatal_error(error, msg);
                self.terminate();
            }
            (MgrState::Stopped, MgrEvent::Start) => {
                ops.do_execute();
                self.state = MgrState::Starting(StartingState::LoadingGraph);
            }
            (MgrState::Stopped, MgrEvent::Quit) => {
                ops.do_unload();
                self.state = MgrState::Quitting;
            }
            (MgrState::Quitting, MgrEvent::GraphUnloaded) => {
                self.terminate();
            }
            (MgrState::Quitting, MgrEvent::Err { error, msg, .. }) => {
                ops.do_report_fatal_error(error, msg);
                self.terminate();
            }
            (state, event) => {
                trace!("no transition from {} on {}", state.name(), event.name());
            }
        }
    }

    fn on_error(&mut self, ops: &mut MgrOps, error: OmxError, msg: String, is_internal: bool) {
        // Manager-internal failures are always fatal; graph errors consult
        // the error policy.
        let fatal = is_internal || ops.is_fatal_error(&error);
        if fatal {
            warn!("fatal error: {} {}", error, msg);
            ops.do_report_fatal_error(error, msg);
            self.terminate();
        } else {
            info!("recoverable error, restarting: {} {}", error, msg);
            self.state = MgrState::Restarting;
        }
    }

    fn terminate(&mut self) {
        self.state = MgrState::Quitted;
        self.terminated = true;
        self.deferred.clear();
    }
}

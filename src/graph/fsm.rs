//! Pipeline state machine.
//!
//! Drives one pipeline through load → configure → execute and back down,
//! with two nested sequences: *configuring* (disable ports if the flavor
//! needs it, probe, wait for derived port settings, push the configuration)
//! and *skipping* (walk the pipeline back to Loaded, move the playlist
//! cursor, reconfigure or finish). States that wait on a batch transition
//! carry the OMX state they expect, and the expected-event set decides when
//! the batch is complete.
//!
//! Events that have no row in the current state are dropped with a trace
//! line, the way a hierarchical machine treats a no-transition.

use log::{debug, trace};

use crate::graph::events::GraphEvent;
use crate::graph::ops::GraphOps;
use crate::omx::{OmxError, OmxState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfiguringState {
    AwaitingPortDisabled,
    AwaitingPortSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkippingState {
    ToIdle,
    Idle2Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GraphState {
    Inited,
    Loaded,
    Configuring(ConfiguringState),
    Config2Idle,
    Idle2Exe,
    Executing,
    Skipping(SkippingState),
    Exe2Pause,
    Pause,
    Pause2Exe,
    Exe2Idle,
    Idle2Loaded,
    Unloaded,
}

impl GraphState {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            GraphState::Inited => "inited",
            GraphState::Loaded => "loaded",
            GraphState::Configuring(ConfiguringState::AwaitingPortDisabled) => {
                "configuring.awaiting_port_disabled"
            }
            GraphState::Configuring(ConfiguringState::AwaitingPortSettings) => {
                "configuring.awaiting_port_settings"
            }
            GraphState::Config2Idle => "config2idle",
            GraphState::Idle2Exe => "idle2exe",
            GraphState::Executing => "executing",
            GraphState::Skipping(SkippingState::ToIdle) => "skipping.to_idle",
            GraphState::Skipping(SkippingState::Idle2Loaded) => "skipping.idle2loaded",
            GraphState::Exe2Pause => "exe2pause",
            GraphState::Pause => "pause",
            GraphState::Pause2Exe => "pause2exe",
            GraphState::Exe2Idle => "exe2idle",
            GraphState::Idle2Loaded => "idle2loaded",
            GraphState::Unloaded => "unloaded",
        }
    }

    /// The OMX state this waiting state expects the pipeline to reach.
    fn target_omx_state(&self) -> Option<OmxState> {
        match self {
            GraphState::Config2Idle => Some(OmxState::Idle),
            GraphState::Idle2Exe => Some(OmxState::Executing),
            GraphState::Exe2Pause => Some(OmxState::Pause),
            GraphState::Pause2Exe => Some(OmxState::Executing),
            GraphState::Exe2Idle => Some(OmxState::Idle),
            GraphState::Idle2Loaded => Some(OmxState::Loaded),
            GraphState::Skipping(SkippingState::ToIdle) => Some(OmxState::Idle),
            GraphState::Skipping(SkippingState::Idle2Loaded) => Some(OmxState::Loaded),
            _ => None,
        }
    }
}

pub(crate) struct GraphFsm {
    state: GraphState,
    /// Set by a stop request: the downward walk halts at Loaded and acks
    /// `graph_stopped` instead of destroying the pipeline.
    stopping: bool,
    terminated: bool,
}

impl GraphFsm {
    pub(crate) fn new() -> GraphFsm {
        GraphFsm {
            state: GraphState::Inited,
            stopping: false,
            terminated: false,
        }
    }

    pub(crate) fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub(crate) fn terminated(&self) -> bool {
        self.terminated
    }

    /// Re-arms a terminated machine; the next `Load` replays the whole
    /// lifecycle on the same graph instance.
    pub(crate) fn reset(&mut self) {
        self.state = GraphState::Inited;
        self.stopping = false;
        self.terminated = false;
    }

    pub(crate) fn process(&mut self, ops: &mut GraphOps, event: GraphEvent) {
        if self.terminated {
            trace!("[{}] terminated, ignoring {}", ops.name(), event.name());
            return;
        }

        // PortUnpopulated is a secondary symptom of tunnels draining; never
        // a reason to act.
        if let GraphEvent::OmxErr {
            error: OmxError::PortUnpopulated,
            ..
        } = &event
        {
            trace!("[{}] ignoring PortUnpopulated", ops.name());
            return;
        }

        // A completed batch transition must land on the state the waiting
        // state expects; a mismatch is a stale event and is dropped.
        if let GraphEvent::OmxTrans {
            component, state, ..
        } = &event
        {
            let (component, state) = (*component, *state);
            let Some(target) = self.state.target_omx_state() else {
                trace!(
                    "[{}] no transition from {} on omx_trans",
                    ops.name(),
                    self.state.name()
                );
                return;
            };
            if state != target || !ops.is_trans_complete(component, state) {
                return;
            }
            self.on_trans_complete(ops);
            return;
        }

        match (self.state, event) {
            (GraphState::Inited, GraphEvent::Load) => {
                ops.do_load();
                ops.do_setup();
                ops.do_ack_loaded();
                self.state = GraphState::Loaded;
            }
            (GraphState::Inited, GraphEvent::Unload) => {
                self.enter_unloaded(ops);
            }
            (GraphState::Loaded, GraphEvent::Execute(config)) => {
                if ops.last_op_succeeded() {
                    self.stopping = false;
                    ops.do_store_config(config);
                    self.enter_configuring(ops);
                }
            }
            (GraphState::Loaded, GraphEvent::Unload) => {
                ops.do_tear_down_tunnels();
                ops.do_destroy_graph();
                self.enter_unloaded(ops);
            }
            (
                GraphState::Configuring(ConfiguringState::AwaitingPortDisabled),
                GraphEvent::OmxPortDisabled {
                    component, port, ..
                },
            ) => {
                if ops.is_port_disabling_complete(component, port) {
                    self.probe_then_configure(ops);
                }
            }
            (
                GraphState::Configuring(ConfiguringState::AwaitingPortSettings),
                GraphEvent::OmxPortSettings { .. },
            ) => {
                ops.do_configure();
                self.exit_configuring(ops);
            }
            (GraphState::Executing, GraphEvent::Skip { jump }) => {
                ops.do_store_skip(jump);
                ops.do_omx_exe2idle();
                self.state = GraphState::Skipping(SkippingState::ToIdle);
            }
            (GraphState::Executing, GraphEvent::Seek) => ops.do_seek(),
            (GraphState::Executing, GraphEvent::VolumeStep { step }) => ops.do_volume_step(step),
            (GraphState::Executing, GraphEvent::Volume(vol)) => ops.do_volume(vol),
            (GraphState::Executing, GraphEvent::Mute) => ops.do_mute(),
            (GraphState::Executing, GraphEvent::Pause) => {
                ops.do_omx_exe2pause();
                self.state = GraphState::Exe2Pause;
            }
            (GraphState::Executing, GraphEvent::Unload) => {
                ops.do_omx_exe2idle();
                self.state = GraphState::Exe2Idle;
            }
            (GraphState::Executing, GraphEvent::Stop) => {
                self.stopping = true;
                ops.do_omx_exe2idle();
                self.state = GraphState::Exe2Idle;
            }
            (GraphState::Executing, GraphEvent::OmxErr { error, .. }) => {
                // A component error mid-stream ends the track early; the
                // skipping walk moves on to the next item.
                debug!("[{}] component error while executing: {}", ops.name(), error);
                ops.do_omx_exe2idle();
                self.state = GraphState::Skipping(SkippingState::ToIdle);
            }
            (GraphState::Executing, GraphEvent::OmxEos { component, .. }) => {
                if ops.is_last_component(component) {
                    ops.do_omx_exe2idle();
                    self.state = GraphState::Skipping(SkippingState::ToIdle);
                } else {
                    trace!("[{}] eos from a non-terminal component", ops.name());
                }
            }
            (GraphState::Pause, GraphEvent::Pause) => {
                ops.do_omx_pause2exe();
                self.state = GraphState::Pause2Exe;
            }
            (GraphState::Pause, GraphEvent::Unload) => {
                ops.do_omx_pause2idle();
                self.state = GraphState::Exe2Idle;
            }
            (GraphState::Pause, GraphEvent::Stop) => {
                self.stopping = true;
                ops.do_omx_pause2idle();
                self.state = GraphState::Exe2Idle;
            }
            (_, GraphEvent::OmxErr {
                component,
                error,
                port,
            }) => {
                // Errors outside the executing state break the transition in
                // flight; record and let the injected error event unwind.
                ops.do_record_comp_error(component, error, port);
            }
            (_, GraphEvent::Err { .. }) => {
                ops.do_error();
                ops.do_tear_down_tunnels();
                ops.do_destroy_graph();
                self.enter_unloaded(ops);
            }
            (state, event) => {
                trace!(
                    "[{}] no transition from {} on {}",
                    ops.name(),
                    state.name(),
                    ops.describe_event(&event)
                );
            }
        }
    }

    /// A batch state transition finished; advance the waiting state.
    fn on_trans_complete(&mut self, ops: &mut GraphOps) {
        match self.state {
            GraphState::Config2Idle => {
                ops.do_omx_idle2exe();
                self.state = GraphState::Idle2Exe;
            }
            GraphState::Idle2Exe => {
                ops.do_ack_execd();
                self.state = GraphState::Executing;
            }
            GraphState::Exe2Pause => {
                ops.do_ack_paused();
                self.state = GraphState::Pause;
            }
            GraphState::Pause2Exe => {
                ops.do_ack_unpaused();
                self.state = GraphState::Executing;
            }
            GraphState::Exe2Idle => {
                ops.do_omx_idle2loaded();
                self.state = GraphState::Idle2Loaded;
            }
            GraphState::Idle2Loaded => {
                if self.stopping {
                    self.stopping = false;
                    ops.do_ack_stopped();
                    self.state = GraphState::Loaded;
                } else {
                    ops.do_tear_down_tunnels();
                    ops.do_destroy_graph();
                    self.enter_unloaded(ops);
                }
            }
            GraphState::Skipping(SkippingState::ToIdle) => {
                ops.do_omx_idle2loaded();
                self.state = GraphState::Skipping(SkippingState::Idle2Loaded);
            }
            GraphState::Skipping(SkippingState::Idle2Loaded) => {
                ops.do_skip();
                self.exit_skipping(ops);
            }
            _ => unreachable!("no target state recorded for {}", self.state.name()),
        }
    }

    fn enter_configuring(&mut self, ops: &mut GraphOps) {
        ops.do_disable_ports();
        if ops.is_disabled_evt_required() {
            self.state = GraphState::Configuring(ConfiguringState::AwaitingPortDisabled);
        } else {
            self.probe_then_configure(ops);
        }
    }

    fn probe_then_configure(&mut self, ops: &mut GraphOps) {
        ops.do_probe();
        if ops.is_port_settings_evt_required() {
            self.state = GraphState::Configuring(ConfiguringState::AwaitingPortSettings);
        } else {
            ops.do_configure();
            self.exit_configuring(ops);
        }
    }

    fn exit_configuring(&mut self, ops: &mut GraphOps) {
        ops.do_omx_loaded2idle();
        self.state = GraphState::Config2Idle;
    }

    /// Skipping finished: a fatal error unwinds, an exhausted playlist ends
    /// the graph, anything else configures the next item.
    fn exit_skipping(&mut self, ops: &mut GraphOps) {
        if !ops.last_op_succeeded() {
            ops.do_error();
            ops.do_tear_down_tunnels();
            ops.do_destroy_graph();
            self.enter_unloaded(ops);
        } else if ops.is_end_of_play() {
            ops.do_end_of_play();
            ops.do_tear_down_tunnels();
            ops.do_destroy_graph();
            self.enter_unloaded(ops);
        } else {
            self.enter_configuring(ops);
        }
    }

    fn enter_unloaded(&mut self, ops: &mut GraphOps) {
        debug!("[{}] unloaded, terminating the machine", ops.name());
        ops.do_ack_unloaded();
        self.terminated = true;
        self.state = GraphState::Unloaded;
    }
}

//! Pipeline operations.
//!
//! The vocabulary of actions a graph's state machine invokes. Operations
//! are best-effort with a recorded error: a failure is stored as
//! `(OmxError, message)` and the machine's guards branch on
//! [`GraphOps::last_op_succeeded`] at the next step. Most operations are
//! silently skipped while an error is recorded, so a failed step drains the
//! rest of its action sequence harmlessly.

use std::sync::Arc;

use log::{debug, info, trace, warn};

use crate::graph::events::GraphEvent;
use crate::graph::factory::GraphFlavor;
use crate::graph::pending::{PendingTransitions, PortTransition};
use crate::graph::{GraphConfig, PlaylistRef};
use crate::manager::events::FeedbackSender;
use crate::omx::{BufferSupplier, ComponentId, EventSink, OmxCommand, OmxCore, OmxError, OmxState};
use crate::probe::{MediaProbe, PortDomain, StreamInfo};

/// Volume percentage points moved per step.
const VOLUME_STEP_PCT: i32 = 5;

/// Default jump applied when the pipeline skips on its own (renderer EOS).
const SKIP_DEFAULT: i64 = 1;

pub(crate) struct GraphOps {
    flavor: Box<dyn GraphFlavor>,
    core: Arc<dyn OmxCore>,
    probe: Arc<dyn MediaProbe>,
    feedback: FeedbackSender,
    sink: Arc<dyn EventSink>,
    handles: Vec<ComponentId>,
    names: Vec<String>,
    playlist: Option<PlaylistRef>,
    pending: PendingTransitions,
    jump: i64,
    volume: i32,
    need_port_settings_evt: bool,
    stream_info: Option<StreamInfo>,
    last_error: Option<(OmxError, String)>,
}

impl GraphOps {
    pub(crate) fn new(
        flavor: Box<dyn GraphFlavor>,
        core: Arc<dyn OmxCore>,
        probe: Arc<dyn MediaProbe>,
        feedback: FeedbackSender,
        sink: Arc<dyn EventSink>,
    ) -> GraphOps {
        GraphOps {
            flavor,
            core,
            probe,
            feedback,
            sink,
            handles: Vec::new(),
            names: Vec::new(),
            playlist: None,
            pending: PendingTransitions::new(),
            jump: SKIP_DEFAULT,
            volume: 80,
            need_port_settings_evt: false,
            stream_info: None,
            last_error: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.flavor.name()
    }

    //
    // Error bookkeeping
    //

    pub(crate) fn record_error(&mut self, error: OmxError, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("[{}] op failed: {} {}", self.name(), error, msg);
        self.last_error = Some((error, msg));
    }

    pub(crate) fn last_op_succeeded(&self) -> bool {
        self.last_error.is_none()
    }

    pub(crate) fn internal_error(&self) -> Option<(OmxError, String)> {
        self.last_error.clone()
    }

    pub(crate) fn do_reset_internal_error(&mut self) {
        self.last_error = None;
    }

    fn check(&mut self, result: Result<(), OmxError>, msg: &str) -> bool {
        match result {
            Ok(()) => true,
            Err(error) => {
                self.record_error(error, msg.to_string());
                false
            }
        }
    }

    //
    // Handle table
    //

    pub(crate) fn handle2name(&self, component: ComponentId) -> &str {
        self.handles
            .iter()
            .position(|h| *h == component)
            .map(|i| self.names[i].as_str())
            .unwrap_or("Unknown handle")
    }

    pub(crate) fn is_last_component(&self, component: ComponentId) -> bool {
        self.handles.last() == Some(&component)
    }

    fn renderer(&self) -> Option<ComponentId> {
        self.handles.last().copied()
    }

    fn decoder(&self) -> Option<ComponentId> {
        self.handles.get(1).copied().or_else(|| self.handles.first().copied())
    }

    //
    // Load / setup
    //

    pub(crate) fn do_load(&mut self) {
        let components = self.flavor.components();
        let roles = self.flavor.roles();
        assert_eq!(components.len(), roles.len());

        for name in &components {
            if let Err(error) = self.core.verify_component(name) {
                self.record_error(error, format!("Unable to verify component [{}]", name));
                return;
            }
        }
        for (name, role) in components.iter().zip(&roles) {
            if let Err(error) = self.core.verify_role(name, role) {
                self.record_error(error, format!("Unable to verify role [{}]", role));
                return;
            }
        }

        for (name, role) in components.iter().zip(&roles) {
            let component = match self.core.instantiate(name, self.sink.clone()) {
                Ok(component) => component,
                Err(error) => {
                    self.record_error(error, format!("Unable to instantiate [{}]", name));
                    return;
                }
            };
            self.handles.push(component);
            self.names.push(name.to_string());
            if let Err(error) = self.core.set_role(component, role) {
                self.record_error(error, format!("Unable to set role [{}]", role));
                return;
            }
        }
        info!("[{}] {} components instantiated", self.name(), self.handles.len());
    }

    pub(crate) fn do_setup(&mut self) {
        if !self.last_op_succeeded() {
            return;
        }
        // Input ports supply their tunnel's buffers.
        for i in 0..self.handles.len().saturating_sub(1) {
            let out_port = if i == 0 { 0 } else { 1 };
            let supplied = self
                .core
                .set_buffer_supplier(self.handles[i], out_port, BufferSupplier::Input)
                .and_then(|_| {
                    self.core
                        .set_buffer_supplier(self.handles[i + 1], 0, BufferSupplier::Input)
                });
            if !self.check(supplied, "Unable to setup suppliers") {
                return;
            }
        }
        for i in 0..self.handles.len().saturating_sub(1) {
            let out_port = if i == 0 { 0 } else { 1 };
            let tunneled =
                self.core
                    .setup_tunnel(self.handles[i], out_port, self.handles[i + 1], 0);
            if !self.check(tunneled, "Unable to setup the tunnels") {
                return;
            }
        }
    }

    pub(crate) fn do_store_config(&mut self, config: GraphConfig) {
        self.playlist = Some(config.playlist);
    }

    //
    // Configure sequence
    //

    pub(crate) fn do_disable_ports(&mut self) {
        if !self.last_op_succeeded() {
            return;
        }
        self.pending.clear_port_transitions();
        for (handle_index, port) in self.flavor.ports_to_disable() {
            let Some(component) = self.handles.get(handle_index).copied() else {
                continue;
            };
            let sent = self
                .core
                .send_command(component, OmxCommand::PortDisable(port));
            if self.check(sent, "Unable to disable port") {
                self.pending
                    .add_port_transition(component, port, PortTransition::Disable);
            }
        }
    }

    pub(crate) fn is_disabled_evt_required(&self) -> bool {
        self.pending.port_transitions_pending() > 0
    }

    pub(crate) fn is_port_disabling_complete(&mut self, component: ComponentId, port: u32) -> bool {
        self.pending
            .complete_port_transition(component, port, PortTransition::Disable)
    }

    pub(crate) fn do_probe(&mut self) {
        self.need_port_settings_evt = false;
        if !self.last_op_succeeded() {
            return;
        }
        let Some(playlist) = self.playlist.clone() else {
            self.record_error(OmxError::BadParameter, "No playlist configured");
            return;
        };
        let uri = {
            let list = playlist.lock().unwrap();
            if list.before_begin() || list.past_end() {
                self.record_error(OmxError::ContentUri, "Playlist cursor outside the list");
                return;
            }
            list.current_uri().to_string()
        };

        let info = match self.probe.probe(&uri) {
            Ok(info) => info,
            Err(error) => {
                drop_current_uri(&playlist);
                self.record_error(error, format!("Unable to probe [{}]", uri));
                return;
            }
        };

        if info.domain != PortDomain::Audio || info.coding != self.flavor.coding() {
            info!("[{}] unknown/unexpected format, skipping [{}]", self.name(), uri);
            drop_current_uri(&playlist);
            self.record_error(OmxError::ContentUri, format!("Unexpected format [{}]", uri));
            return;
        }

        if !self.flavor.probe_stream_hook(&info) {
            // The hook vetoed the stream; drop the entry without a word.
            drop_current_uri(&playlist);
            self.record_error(OmxError::ContentUri, String::new());
            return;
        }

        let Some(decoder) = self.decoder() else {
            self.record_error(OmxError::NotReady, "No decoder instantiated");
            return;
        };
        match self.flavor.apply_decoder_settings(self.core.as_ref(), decoder, &info) {
            Ok(settings_changed) => self.need_port_settings_evt = settings_changed,
            Err(error) => {
                self.record_error(error, format!("Unable to configure decoder for [{}]", uri));
                return;
            }
        }

        info!("[{}] probed [{}]", self.name(), uri);
        self.feedback.graph_metadata(info.metadata.clone());
        self.stream_info = Some(info);
    }

    pub(crate) fn is_port_settings_evt_required(&self) -> bool {
        self.need_port_settings_evt
    }

    pub(crate) fn do_configure(&mut self) {
        if !self.last_op_succeeded() {
            return;
        }
        let Some(playlist) = self.playlist.clone() else {
            return;
        };
        let uri = { playlist.lock().unwrap().current_uri().to_string() };
        let Some(source) = self.handles.first().copied() else {
            self.record_error(OmxError::NotReady, "No source instantiated");
            return;
        };
        let set = self.core.set_content_uri(source, &uri);
        if !self.check(set, "Unable to set the content uri") {
            return;
        }
        if let (Some(renderer), Some(info)) = (self.renderer(), self.stream_info.clone()) {
            let set = self.core.set_pcm_params(renderer, 0, &info.pcm);
            let _ = self.check(set, "Unable to set the renderer pcm settings");
        }
    }

    //
    // Batch state transitions
    //

    fn transition_all(&mut self, to: OmxState, from: OmxState, msg: &str) {
        if !self.last_op_succeeded() {
            return;
        }
        // Suppliers allocate first and release last: upward batches run in
        // reverse pipeline order (renderer first), downward batches in
        // pipeline order (source first).
        let upward = to.rank() > from.rank();
        let order: Vec<ComponentId> = if upward {
            self.handles.iter().rev().copied().collect()
        } else {
            self.handles.clone()
        };
        for component in order {
            let sent = self.core.send_command(component, OmxCommand::StateSet(to));
            if !self.check(sent, msg) {
                return;
            }
        }
        self.pending.record_transitions(&self.handles, to);
    }

    fn transition_one(&mut self, component: ComponentId, to: OmxState, msg: &str) {
        if !self.last_op_succeeded() {
            return;
        }
        let sent = self.core.send_command(component, OmxCommand::StateSet(to));
        if self.check(sent, msg) {
            self.pending.clear_transitions();
            self.pending.add_transition(component, to);
        }
    }

    pub(crate) fn do_omx_loaded2idle(&mut self) {
        self.transition_all(
            OmxState::Idle,
            OmxState::Loaded,
            "Unable to transition from Loaded->Idle",
        );
    }

    pub(crate) fn do_omx_idle2exe(&mut self) {
        self.transition_all(
            OmxState::Executing,
            OmxState::Idle,
            "Unable to transition from Idle->Exe",
        );
    }

    pub(crate) fn do_omx_exe2idle(&mut self) {
        self.transition_all(
            OmxState::Idle,
            OmxState::Executing,
            "Unable to transition from Exe->Idle",
        );
    }

    pub(crate) fn do_omx_idle2loaded(&mut self) {
        self.transition_all(
            OmxState::Loaded,
            OmxState::Idle,
            "Unable to transition from Idle->Loaded",
        );
    }

    pub(crate) fn do_omx_exe2pause(&mut self) {
        if let Some(renderer) = self.renderer() {
            self.transition_one(
                renderer,
                OmxState::Pause,
                "Unable to transition renderer from Exe->Pause",
            );
        }
    }

    pub(crate) fn do_omx_pause2exe(&mut self) {
        if let Some(renderer) = self.renderer() {
            self.transition_one(
                renderer,
                OmxState::Executing,
                "Unable to transition renderer from Pause->Exe",
            );
        }
    }

    /// Renderer first, remaining handles after; used when teardown starts
    /// from the paused state.
    pub(crate) fn do_omx_pause2idle(&mut self) {
        if !self.last_op_succeeded() {
            return;
        }
        let Some(renderer) = self.renderer() else {
            return;
        };
        let sent = self
            .core
            .send_command(renderer, OmxCommand::StateSet(OmxState::Idle));
        if !self.check(sent, "Unable to transition renderer from Pause->Idle") {
            return;
        }
        self.pending.clear_transitions();
        self.pending.add_transition(renderer, OmxState::Idle);
        for i in (0..self.handles.len().saturating_sub(1)).rev() {
            let component = self.handles[i];
            let sent = self
                .core
                .send_command(component, OmxCommand::StateSet(OmxState::Idle));
            if !self.check(sent, "Unable to transition from Exe->Idle") {
                return;
            }
            self.pending.add_transition(component, OmxState::Idle);
        }
    }

    pub(crate) fn is_trans_complete(&mut self, component: ComponentId, to_state: OmxState) -> bool {
        trace!(
            "[{}] {} -> {} ({} expected)",
            self.name(),
            self.handle2name(component),
            to_state,
            self.pending.transitions_pending()
        );
        self.pending.complete_transition(component, to_state)
    }

    //
    // Skip / seek / volume
    //

    pub(crate) fn do_store_skip(&mut self, jump: i64) {
        self.jump = jump;
    }

    pub(crate) fn do_skip(&mut self) {
        if self.last_op_succeeded() && self.jump != 0 && !self.is_end_of_play() {
            if let Some(playlist) = &self.playlist {
                playlist.lock().unwrap().skip(self.jump);
            }
            self.jump = SKIP_DEFAULT;
        }
    }

    pub(crate) fn do_seek(&mut self) {
        // TODO: requires OMX_IndexConfigTimePosition support in the renderer
        debug!("[{}] seek not available", self.name());
    }

    pub(crate) fn do_volume_step(&mut self, step: i32) {
        if !self.last_op_succeeded() {
            return;
        }
        let Some(renderer) = self.renderer() else {
            return;
        };
        let current = match self.core.get_volume(renderer, 0) {
            Ok(volume) => volume,
            Err(error) => {
                self.record_error(error, "Unable to read the volume");
                return;
            }
        };
        let target = (current + step * VOLUME_STEP_PCT).clamp(0, 100);
        if target != current {
            let set = self.core.set_volume(renderer, 0, target);
            if !self.check(set, "Unable to apply volume step") {
                return;
            }
        }
        self.volume = target;
        self.do_ack_volume();
    }

    pub(crate) fn do_volume(&mut self, vol: f64) {
        if !self.last_op_succeeded() {
            return;
        }
        let Some(renderer) = self.renderer() else {
            return;
        };
        let target = (vol.clamp(0.0, 1.0) * 100.0).round() as i32;
        let set = self.core.set_volume(renderer, 0, target);
        if !self.check(set, "Unable to apply volume") {
            return;
        }
        self.volume = target;
        self.do_ack_volume();
    }

    pub(crate) fn do_mute(&mut self) {
        if !self.last_op_succeeded() {
            return;
        }
        let Some(renderer) = self.renderer() else {
            return;
        };
        let muted = match self.core.get_mute(renderer, 0) {
            Ok(muted) => muted,
            Err(error) => {
                self.record_error(error, "Unable to read the mute state");
                return;
            }
        };
        let set = self.core.set_mute(renderer, 0, !muted);
        let _ = self.check(set, "Unable to apply mute");
    }

    //
    // Teardown
    //

    pub(crate) fn do_tear_down_tunnels(&mut self) {
        for i in 0..self.handles.len().saturating_sub(1) {
            let out_port = if i == 0 { 0 } else { 1 };
            if let Err(error) =
                self.core
                    .tear_down_tunnel(self.handles[i], out_port, self.handles[i + 1], 0)
            {
                // Best effort; a half-built pipeline has fewer tunnels than
                // handles.
                debug!("[{}] tunnel {} teardown: {}", self.name(), i, error);
            }
        }
    }

    pub(crate) fn do_destroy_graph(&mut self) {
        for component in self.handles.drain(..) {
            if let Err(error) = self.core.free(component) {
                debug!("free failed: {}", error);
            }
        }
        self.names.clear();
        self.pending.clear_transitions();
        self.pending.clear_port_transitions();
        self.stream_info = None;
    }

    //
    // Upward feedback
    //

    pub(crate) fn do_ack_loaded(&mut self) {
        if self.last_op_succeeded() {
            self.feedback.graph_loaded();
        }
    }

    pub(crate) fn do_ack_execd(&mut self) {
        if self.last_op_succeeded() {
            self.feedback.graph_execd();
        }
    }

    pub(crate) fn do_ack_stopped(&mut self) {
        if self.last_op_succeeded() {
            self.feedback.graph_stopped();
        }
    }

    pub(crate) fn do_ack_paused(&mut self) {
        if self.last_op_succeeded() {
            self.feedback.graph_paused();
        }
    }

    pub(crate) fn do_ack_unpaused(&mut self) {
        if self.last_op_succeeded() {
            self.feedback.graph_unpaused();
        }
    }

    pub(crate) fn do_ack_volume(&mut self) {
        if self.last_op_succeeded() {
            self.feedback.graph_volume(self.volume);
        }
    }

    pub(crate) fn do_ack_unloaded(&mut self) {
        self.feedback.graph_unloaded();
    }

    pub(crate) fn do_error(&mut self) {
        let (error, msg) = self
            .last_error
            .clone()
            .unwrap_or((OmxError::Undefined, String::new()));
        self.feedback.graph_error(error, msg);
    }

    pub(crate) fn do_end_of_play(&mut self) {
        self.feedback.graph_end_of_play();
    }

    //
    // Guards
    //

    pub(crate) fn is_end_of_play(&self) -> bool {
        let Some(playlist) = &self.playlist else {
            return true;
        };
        let list = playlist.lock().unwrap();
        if list.is_empty() {
            return true;
        }
        !list.loop_playback() && (list.before_begin() || list.past_end())
    }

    /// Folds a component-reported error into the recorded-error slot.
    pub(crate) fn do_record_comp_error(
        &mut self,
        component: ComponentId,
        error: OmxError,
        port: Option<u32>,
    ) {
        let mut msg = format!("[{}", self.handle2name(component));
        if let Some(port) = port {
            msg.push_str(&format!(":port:{}", port));
        }
        msg.push(']');
        self.record_error(error, msg);
    }

    /// Renders an event with the component name resolved, for dispatch
    /// logging.
    pub(crate) fn describe_event(&self, event: &GraphEvent) -> String {
        match event {
            GraphEvent::OmxTrans { component, state, .. } => {
                format!("omx_trans[{} -> {}]", self.handle2name(*component), state)
            }
            other => other.name().to_string(),
        }
    }
}

/// Erases the cursor's URI and retreats the cursor so the next skip lands on
/// the following entry.
fn drop_current_uri(playlist: &PlaylistRef) {
    let mut list = playlist.lock().unwrap();
    let position = list.position();
    list.erase_uri(position);
    list.set_position(position - 1);
}

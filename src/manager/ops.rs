//! Manager operations.
//!
//! Sequences sub-playlists out of the main playlist, owns the registry of
//! reusable graphs keyed by encoding label, and proxies user commands to
//! whichever graph currently owns the pipeline. Like the graph ops,
//! failures are recorded and surfaced through guards; a recorded manager
//! error is always fatal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, trace, warn};

use crate::graph::factory;
use crate::graph::{Graph, GraphConfig, PlaylistRef};
use crate::manager::events::FeedbackSender;
use crate::manager::TerminationCallback;
use crate::omx::{OmxCore, OmxError};
use crate::playlist::{ListDirection, Playlist};
use crate::probe::{MediaProbe, TrackMetadata};

/// Reported playback state, fed by graph feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

pub(crate) struct MgrOps {
    core: Arc<dyn OmxCore>,
    probe: Arc<dyn MediaProbe>,
    feedback: FeedbackSender,
    playlist: Playlist,
    active: Option<PlaylistRef>,
    registry: HashMap<String, Graph>,
    current_label: Option<String>,
    termination: Option<TerminationCallback>,
    status: PlaybackStatus,
    volume: i32,
    metadata: TrackMetadata,
    last_error: Option<(OmxError, String)>,
    deinited: bool,
}

impl MgrOps {
    pub(crate) fn new(
        playlist: Playlist,
        core: Arc<dyn OmxCore>,
        probe: Arc<dyn MediaProbe>,
        feedback: FeedbackSender,
        termination: TerminationCallback,
    ) -> MgrOps {
        MgrOps {
            core,
            probe,
            feedback,
            playlist,
            active: None,
            registry: HashMap::new(),
            current_label: None,
            termination: Some(termination),
            status: PlaybackStatus::Stopped,
            volume: 80,
            metadata: TrackMetadata::new(),
            last_error: None,
            deinited: false,
        }
    }

    //
    // Error bookkeeping
    //

    fn record_error(&mut self, error: OmxError, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("manager op failed: {} {}", error, msg);
        self.last_error = Some((error, msg));
    }

    pub(crate) fn internal_error(&self) -> Option<(OmxError, String)> {
        self.last_error.clone()
    }

    pub(crate) fn is_fatal_error(&self, error: &OmxError) -> bool {
        error.is_fatal()
    }

    //
    // Graph registry
    //

    fn managed_graph(&self) -> Option<&Graph> {
        self.current_label
            .as_ref()
            .and_then(|label| self.registry.get(label))
    }

    /// Looks up or lazily creates the graph for a URI's encoding. At most
    /// one graph per label ever exists in the registry.
    fn get_graph(&mut self, uri: &str) -> Option<&Graph> {
        let label = factory::coding_type(uri);
        if !self.registry.contains_key(&label) {
            let Some(flavor) = factory::create_flavor(&label) else {
                self.record_error(
                    OmxError::InsufficientResources,
                    format!("Unable to create a graph for [{}].", label),
                );
                return None;
            };
            info!("registering a [{}] graph", label);
            let graph = Graph::new(
                flavor,
                self.core.clone(),
                self.probe.clone(),
                self.feedback.clone(),
            );
            self.registry.insert(label.clone(), graph);
        }
        self.current_label = Some(label.clone());
        self.registry.get(&label)
    }

    //
    // Playlist sequencing
    //

    /// Loads the graph for the next playable sub-playlist. When the whole
    /// playlist is exhausted (or empty), posts a synthetic `graph_unloaded`
    /// so the machine falls into its end-of-play row.
    pub(crate) fn do_load(&mut self) {
        if self.playlist.is_empty() {
            debug!("empty playlist, nothing to load");
            self.feedback.graph_unloaded();
            return;
        }

        if !self.active_sub_is_playable() {
            let direction = self.next_direction();
            if self.playlist_exhausted(direction) {
                info!("playlist exhausted");
                self.feedback.graph_unloaded();
                return;
            }
            let sub = self.playlist.obtain_next_sub_playlist(direction);
            if sub.is_empty() {
                self.feedback.graph_unloaded();
                return;
            }
            debug!("next sub-playlist: {} tracks", sub.len());
            self.active = Some(Arc::new(Mutex::new(sub)));
        }

        let uri = {
            let active = self.active.as_ref().expect("active sub-playlist");
            active.lock().unwrap().current_uri().to_string()
        };
        if let Some(graph) = self.get_graph(&uri) {
            graph.load();
        }
    }

    /// The active sub-playlist can be reloaded in place as long as its
    /// cursor still points inside it — this is what replays a repaired
    /// sub-playlist after a content error instead of re-copying the bad
    /// entry out of the main list.
    fn active_sub_is_playable(&self) -> bool {
        match &self.active {
            Some(active) => {
                let sub = active.lock().unwrap();
                !sub.is_empty() && !sub.before_begin() && !sub.past_end()
            }
            None => false,
        }
    }

    fn next_direction(&self) -> ListDirection {
        match &self.active {
            Some(active) if active.lock().unwrap().before_begin() => ListDirection::Down,
            _ => ListDirection::Up,
        }
    }

    fn playlist_exhausted(&self, direction: ListDirection) -> bool {
        let Some(active) = &self.active else {
            // First load; there is always a first sub-playlist.
            return false;
        };
        let sub = active.lock().unwrap();
        let out_of_range = sub.is_empty() || sub.before_begin() || sub.past_end();
        out_of_range
            && !self.playlist.loop_playback()
            && !self.playlist.has_next_sub_playlist(direction)
    }

    pub(crate) fn do_execute(&mut self) {
        let Some(active) = self.active.clone() else {
            self.record_error(
                OmxError::InsufficientResources,
                "Unable to allocate the next playlist.",
            );
            return;
        };
        {
            let mut sub = active.lock().unwrap();
            // A sub-playlist loops on its own only when it spans the whole
            // list; a looping multi-format list cycles across sub-playlists
            // up here instead.
            sub.set_loop_playback(
                self.playlist.loop_playback() && self.playlist.single_format(),
            );
        }
        if self.managed_graph().is_none() {
            self.record_error(OmxError::InsufficientResources, "No managed graph.");
            return;
        }
        if let Some(graph) = self.managed_graph() {
            graph.execute(GraphConfig { playlist: active });
        }
    }

    //
    // User command proxies
    //

    pub(crate) fn do_next(&mut self) {
        if let Some(graph) = self.managed_graph() {
            graph.skip(1);
        }
    }

    pub(crate) fn do_prev(&mut self) {
        if let Some(graph) = self.managed_graph() {
            graph.skip(-1);
        }
    }

    pub(crate) fn do_position(&mut self, position: i64) {
        let Some(active) = &self.active else {
            return;
        };
        let jump = {
            let sub = active.lock().unwrap();
            position - sub.position()
        };
        if jump != 0 {
            if let Some(graph) = self.managed_graph() {
                graph.skip(jump);
            }
        }
    }

    pub(crate) fn do_stop(&mut self) {
        if let Some(graph) = self.managed_graph() {
            graph.stop();
        }
    }

    pub(crate) fn do_unload(&mut self) {
        if let Some(graph) = self.managed_graph() {
            graph.unload();
        }
    }

    pub(crate) fn do_pause(&mut self) {
        if let Some(graph) = self.managed_graph() {
            graph.pause();
        }
    }

    pub(crate) fn do_vol_up(&mut self) {
        if let Some(graph) = self.managed_graph() {
            graph.volume_step(1);
        }
    }

    pub(crate) fn do_vol_down(&mut self) {
        if let Some(graph) = self.managed_graph() {
            graph.volume_step(-1);
        }
    }

    pub(crate) fn do_vol(&mut self, vol: f64) {
        if let Some(graph) = self.managed_graph() {
            graph.volume(vol);
        }
    }

    pub(crate) fn do_mute(&mut self) {
        if let Some(graph) = self.managed_graph() {
            graph.mute();
        }
    }

    //
    // Feedback bookkeeping
    //

    pub(crate) fn do_update_status(&mut self, status: PlaybackStatus) {
        if status != self.status {
            debug!("playback status {:?} -> {:?}", self.status, status);
        }
        self.status = status;
    }

    pub(crate) fn do_update_metadata(&mut self, metadata: TrackMetadata) {
        if metadata != self.metadata {
            trace!("track metadata updated ({} entries)", metadata.len());
        }
        self.metadata = metadata;
    }

    pub(crate) fn do_update_volume(&mut self, volume: i32) {
        if volume != self.volume {
            trace!("volume {}% -> {}%", self.volume, volume);
        }
        self.volume = volume;
    }

    //
    // Termination
    //

    pub(crate) fn do_report_fatal_error(&mut self, error: OmxError, msg: String) {
        warn!("fatal: {} {}", error, msg);
        self.report_termination(Some(error), msg);
    }

    pub(crate) fn do_end_of_play(&mut self) {
        self.report_termination(None, "End of playlist.".to_string());
    }

    /// The termination callback fires at most once per manager lifetime.
    fn report_termination(&mut self, error: Option<OmxError>, msg: String) {
        if let Some(termination) = self.termination.take() {
            termination(error, msg);
        }
    }

    /// Stops every registered graph thread, clears the registry and shuts
    /// the component library down. A clean quit that reported nothing else
    /// reports success here.
    pub(crate) fn deinit(&mut self) {
        if self.deinited {
            return;
        }
        self.deinited = true;
        for (label, mut graph) in self.registry.drain() {
            debug!("stopping the [{}] graph", label);
            graph.deinit();
        }
        self.current_label = None;
        self.core.deinit();
        self.report_termination(None, String::new());
    }
}

//! Manager: the player's public entry point.
//!
//! Owns one worker thread, one bounded command queue, the manager state
//! machine, the main playlist and the graph registry. Public operations
//! enqueue and return immediately; outcomes surface through the termination
//! callback, which fires exactly once per manager lifetime — with
//! "End of playlist." when playback runs off the list, with an empty
//! message on a clean quit, or with an error code on a fatal failure.

pub mod events;
mod fsm;
mod ops;

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::debug;

use crate::omx::{OmxCore, OmxError};
use crate::playlist::Playlist;
use crate::probe::MediaProbe;

use events::{FeedbackSender, MgrCmd, MgrEvent};
use fsm::MgrFsm;
use ops::MgrOps;

/// Depth of the manager's command queue.
const MGR_QUEUE_MAX_ITEMS: usize = 30;

/// Invoked exactly once when the manager is done: `(None, "End of
/// playlist.")`, `(None, "")` for a clean quit, or an error and its
/// description.
pub type TerminationCallback = Box<dyn FnOnce(Option<OmxError>, String) + Send + 'static>;

pub struct Manager {
    tx: SyncSender<MgrCmd>,
    worker: Option<JoinHandle<()>>,
}

impl Manager {
    /// Initializes the component library, spawns the manager thread and
    /// hands it the playlist. Playback does not begin until
    /// [`Manager::start`].
    pub fn new(
        playlist: Playlist,
        core: Arc<dyn OmxCore>,
        probe: Arc<dyn MediaProbe>,
        termination: TerminationCallback,
    ) -> Result<Manager, OmxError> {
        core.init()?;
        let (tx, rx) = sync_channel(MGR_QUEUE_MAX_ITEMS);
        let feedback = FeedbackSender::new(tx.clone());
        let ops = MgrOps::new(playlist, core, probe, feedback, termination);
        let worker = thread::Builder::new()
            .name("graphmgr".to_string())
            .spawn(move || run_worker(rx, ops))
            .expect("Failed to spawn the manager thread");
        Ok(Manager {
            tx,
            worker: Some(worker),
        })
    }

    fn post(&self, event: MgrEvent) {
        // A terminated manager ignores everything; a dead one can't hear us.
        let _ = self.tx.send(MgrCmd::Event(event));
    }

    pub fn start(&self) {
        self.post(MgrEvent::Start);
    }

    pub fn next(&self) {
        self.post(MgrEvent::Next);
    }

    pub fn prev(&self) {
        self.post(MgrEvent::Prev);
    }

    pub fn position(&self, position: i64) {
        self.post(MgrEvent::Position(position));
    }

    pub fn volume_step(&self, step: i32) {
        if step == 0 {
            return;
        }
        if step > 0 {
            self.post(MgrEvent::VolUp);
        } else {
            self.post(MgrEvent::VolDown);
        }
    }

    /// Absolute volume, 1.0 is full scale.
    pub fn volume(&self, vol: f64) {
        self.post(MgrEvent::Vol(vol));
    }

    pub fn mute(&self) {
        self.post(MgrEvent::Mute);
    }

    pub fn pause(&self) {
        self.post(MgrEvent::Pause);
    }

    pub fn stop(&self) {
        self.post(MgrEvent::Stop);
    }

    pub fn quit(&self) {
        self.post(MgrEvent::Quit);
    }

    /// Shuts the manager down and joins its thread. If the machine never
    /// quit, the registry is still torn down and the termination callback
    /// reports a clean exit.
    pub fn deinit(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(MgrCmd::KillThread);
            let _ = worker.join();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.deinit();
    }
}

fn run_worker(rx: Receiver<MgrCmd>, mut ops: MgrOps) {
    let mut fsm = MgrFsm::new();
    while let Ok(cmd) = rx.recv() {
        match cmd {
            MgrCmd::KillThread => break,
            MgrCmd::Event(event) => {
                fsm.process(&mut ops, event);
                // A manager-ops failure is always fatal: inject it as an
                // internal error so the machine reports and terminates.
                if !fsm.terminated() {
                    if let Some((error, msg)) = ops.internal_error() {
                        debug!("manager internal error: {}", error);
                        fsm.process(
                            &mut ops,
                            MgrEvent::Err {
                                error,
                                msg,
                                is_internal: true,
                            },
                        );
                    }
                }
                if fsm.terminated() {
                    ops.deinit();
                }
            }
        }
    }
    // Kill without quit: tear the registry down and report the clean exit.
    ops.deinit();
    debug!("manager worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omx::mock::{MockCore, MockProbe};
    use crate::omx::OmxState;
    use std::sync::mpsc::{channel, Receiver};
    use std::time::Duration;

    const RENDERER: &str = "OMX.Aratelia.audio_renderer.pcm";

    struct MgrHarness {
        manager: Manager,
        core: Arc<MockCore>,
        term_rx: Receiver<(Option<OmxError>, String)>,
    }

    impl MgrHarness {
        fn new(uris: &[&str], loop_playback: bool, auto_eos: bool) -> MgrHarness {
            Self::build(uris, loop_playback, auto_eos, MockProbe::new())
        }

        fn build(
            uris: &[&str],
            loop_playback: bool,
            auto_eos: bool,
            probe: MockProbe,
        ) -> MgrHarness {
            let mut playlist =
                Playlist::new(uris.iter().map(|u| u.to_string()).collect(), false);
            playlist.set_loop_playback(loop_playback);
            let core = Arc::new(MockCore::new());
            core.set_auto_eos(auto_eos);
            let (term_tx, term_rx) = channel();
            let termination: TerminationCallback = Box::new(move |error, msg| {
                let _ = term_tx.send((error, msg));
            });
            let manager = Manager::new(playlist, core.clone(), Arc::new(probe), termination)
                .expect("manager init");
            MgrHarness {
                manager,
                core,
                term_rx,
            }
        }

        fn wait_termination(&self) -> (Option<OmxError>, String) {
            self.term_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("timed out waiting for the termination callback")
        }
    }

    #[test]
    fn happy_path_single_mp3() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3"], false, true);
        harness.manager.start();
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "End of playlist.");
        assert_eq!(harness.core.content_uris(), ["/tmp/a.mp3"]);
        harness.manager.deinit();
        assert_eq!(harness.core.live_components(), 0);
        assert_eq!(harness.core.init_calls(), 1);
        assert_eq!(harness.core.deinit_calls(), 1);
    }

    #[test]
    fn skip_forward_mid_track() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3", "/tmp/b.mp3"], false, false);
        harness.manager.start();
        harness.core.wait_executing(RENDERER, 1);
        harness.manager.next();
        harness.core.wait_executing(RENDERER, 2);
        harness.core.emit_eos(RENDERER);
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "End of playlist.");
        assert_eq!(harness.core.content_uris(), ["/tmp/a.mp3", "/tmp/b.mp3"]);
        harness.manager.deinit();
    }

    #[test]
    fn pause_then_resume() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3"], false, false);
        harness.manager.start();
        harness.core.wait_executing(RENDERER, 1);
        harness.manager.pause();
        harness.core.wait_state(RENDERER, OmxState::Pause);
        harness.manager.pause();
        harness.core.wait_executing(RENDERER, 2);
        harness.core.emit_eos(RENDERER);
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "End of playlist.");
        harness.manager.deinit();
    }

    #[test]
    fn unplayable_item_is_skipped() {
        let probe = MockProbe::new();
        probe.fail("/tmp/bad.mp3", OmxError::ContentUri);
        let mut harness = MgrHarness::build(&["/tmp/bad.mp3", "/tmp/b.mp3"], false, true, probe);
        harness.manager.start();
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "End of playlist.");
        // The bad entry never reached the pipeline.
        assert_eq!(harness.core.content_uris(), ["/tmp/b.mp3"]);
        harness.manager.deinit();
    }

    #[test]
    fn mixed_format_playlist_uses_one_graph_per_encoding() {
        let uris = ["/a.mp3", "/b.mp3", "/c.flac", "/d.flac"];
        let mut harness = MgrHarness::new(&uris, false, false);
        harness.manager.start();
        for played in 1..=4 {
            harness.core.wait_executing(RENDERER, played);
            harness.core.emit_eos(RENDERER);
        }
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "End of playlist.");
        assert_eq!(harness.core.content_uris(), uris);
        // 3 components per pipeline, one pipeline per encoding.
        assert_eq!(harness.core.instantiated_total(), 6);
        let names = harness.core.instantiated_names();
        assert!(names.iter().any(|n| n.contains("decoder.mp3")));
        assert!(names.iter().any(|n| n.contains("decoder.flac")));
        harness.manager.deinit();
    }

    #[test]
    fn fatal_error_when_no_graph_exists_for_the_encoding() {
        let mut harness = MgrHarness::new(&["rtsp://example"], false, false);
        harness.manager.start();
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, Some(OmxError::InsufficientResources));
        assert!(msg.starts_with("Unable to create"), "got: {}", msg);
        harness.manager.deinit();
    }

    #[test]
    fn empty_playlist_terminates_cleanly() {
        let mut harness = MgrHarness::new(&[], false, false);
        harness.manager.start();
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "End of playlist.");
        harness.manager.deinit();
    }

    #[test]
    fn looped_single_item_restarts_indefinitely() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3"], true, false);
        harness.manager.start();
        for replay in 1..=3 {
            harness.core.wait_executing(RENDERER, replay);
            harness.core.emit_eos(RENDERER);
        }
        // Still alive after three replays; only quit ends it.
        harness.core.wait_executing(RENDERER, 4);
        harness.manager.quit();
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "");
        harness.manager.deinit();
    }

    #[test]
    fn stop_then_start_resumes_the_same_pipeline() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3"], false, false);
        harness.manager.start();
        harness.core.wait_executing(RENDERER, 1);
        harness.manager.stop();
        harness.core.wait_state(RENDERER, OmxState::Loaded);
        // Stop keeps the pipeline instantiated for a quick restart.
        assert_eq!(harness.core.live_components(), 3);
        // Let the stopped acknowledgement drain before restarting; a start
        // racing the stopping wait would be dropped, not deferred.
        std::thread::sleep(Duration::from_millis(100));
        harness.manager.start();
        harness.core.wait_executing(RENDERER, 2);
        harness.manager.quit();
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "");
        harness.manager.deinit();
        assert_eq!(harness.core.live_components(), 0);
    }

    #[test]
    fn quit_while_paused_unwinds_the_pipeline() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3"], false, false);
        harness.manager.start();
        harness.core.wait_executing(RENDERER, 1);
        harness.manager.pause();
        harness.core.wait_state(RENDERER, OmxState::Pause);
        harness.manager.quit();
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "");
        harness.manager.deinit();
        assert_eq!(harness.core.live_components(), 0);
    }

    #[test]
    fn volume_commands_reach_the_renderer() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3"], false, false);
        harness.manager.start();
        harness.core.wait_executing(RENDERER, 1);
        harness.manager.volume_step(1);
        harness.core.wait_volume(RENDERER, 85);
        harness.manager.volume(0.5);
        harness.core.wait_volume(RENDERER, 50);
        harness.manager.quit();
        let _ = harness.wait_termination();
        harness.manager.deinit();
    }

    #[test]
    fn deinit_without_quit_still_reports_cleanly() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3"], false, false);
        harness.manager.start();
        harness.core.wait_executing(RENDERER, 1);
        harness.manager.deinit();
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "");
    }

    #[test]
    fn commands_sent_while_starting_are_deferred() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3", "/tmp/b.mp3"], false, false);
        harness.manager.start();
        // Queued behind start: held until the graph reports it is playing,
        // then re-presented and applied.
        harness.manager.next();
        harness.core.wait_executing(RENDERER, 2);
        harness.core.emit_eos(RENDERER);
        let (error, msg) = harness.wait_termination();
        assert_eq!(error, None);
        assert_eq!(msg, "End of playlist.");
        assert_eq!(harness.core.content_uris(), ["/tmp/a.mp3", "/tmp/b.mp3"]);
        harness.manager.deinit();
    }

    #[test]
    fn terminated_manager_ignores_further_commands() {
        let mut harness = MgrHarness::new(&["/tmp/a.mp3"], false, true);
        harness.manager.start();
        let _ = harness.wait_termination();
        // All of these land on a terminated machine.
        harness.manager.next();
        harness.manager.pause();
        harness.manager.start();
        harness.manager.quit();
        harness.manager.deinit();
        assert!(harness
            .term_rx
            .recv_timeout(Duration::from_millis(200))
            .is_err());
    }
}

//! Graph: one pipeline, one thread, one queue.
//!
//! A graph owns a worker thread and a bounded command queue. Public
//! operations and OMX callbacks alike only enqueue; the worker injects each
//! event into the pipeline state machine in arrival order, so no two
//! actions on the same pipeline ever run concurrently. Completion is
//! observed upward through the manager feedback events, never through
//! return values.

pub mod events;
pub mod factory;
mod fsm;
mod ops;
mod pending;

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, trace};

use crate::manager::events::FeedbackSender;
use crate::omx::{EventSink, OmxCore, RawEvent};
use crate::playlist::Playlist;
use crate::probe::MediaProbe;

use events::{GraphCmd, GraphEvent};
use factory::GraphFlavor;
use fsm::GraphFsm;
use ops::GraphOps;

/// Depth of a graph's command queue.
const GRAPH_QUEUE_MAX_ITEMS: usize = 30;

/// Playlist shared between the manager and the graph that plays it.
pub type PlaylistRef = Arc<Mutex<Playlist>>;

/// Everything a graph needs to start executing: the sub-playlist it will
/// walk.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub playlist: PlaylistRef,
}

/// Marshals raw OMX callbacks into the graph's queue. Callbacks may arrive
/// on component-internal threads; the queue is the synchronization point.
struct QueueSink {
    name: &'static str,
    tx: SyncSender<GraphCmd>,
}

impl EventSink for QueueSink {
    fn deliver(&self, event: RawEvent) {
        trace!("[{}] omx callback: {:?}", self.name, event);
        // The graph may be shutting down; late callbacks are dropped.
        let _ = self.tx.send(GraphCmd::Event(GraphEvent::from_omx(event)));
    }
}

/// A reusable pipeline driver, registered per encoding in the manager's
/// graph registry.
pub struct Graph {
    name: &'static str,
    tx: SyncSender<GraphCmd>,
    worker: Option<JoinHandle<()>>,
}

impl Graph {
    /// Builds the graph and spawns its worker thread.
    pub(crate) fn new(
        flavor: Box<dyn GraphFlavor>,
        core: Arc<dyn OmxCore>,
        probe: Arc<dyn MediaProbe>,
        feedback: FeedbackSender,
    ) -> Graph {
        let name = flavor.name();
        let (tx, rx) = sync_channel(GRAPH_QUEUE_MAX_ITEMS);
        let sink = Arc::new(QueueSink {
            name,
            tx: tx.clone(),
        });
        let ops = GraphOps::new(flavor, core, probe, feedback, sink);
        let worker = thread::Builder::new()
            .name(format!("graph-{}", name))
            .spawn(move || run_worker(rx, ops))
            .expect("Failed to spawn a graph thread");
        Graph {
            name,
            tx,
            worker: Some(worker),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn post(&self, event: GraphEvent) {
        let _ = self.tx.send(GraphCmd::Event(event));
    }

    pub fn load(&self) {
        self.post(GraphEvent::Load);
    }

    pub fn execute(&self, config: GraphConfig) {
        self.post(GraphEvent::Execute(config));
    }

    pub fn pause(&self) {
        self.post(GraphEvent::Pause);
    }

    pub fn seek(&self) {
        self.post(GraphEvent::Seek);
    }

    pub fn skip(&self, jump: i64) {
        self.post(GraphEvent::Skip { jump });
    }

    pub fn volume_step(&self, step: i32) {
        self.post(GraphEvent::VolumeStep { step });
    }

    pub fn volume(&self, vol: f64) {
        self.post(GraphEvent::Volume(vol));
    }

    pub fn mute(&self) {
        self.post(GraphEvent::Mute);
    }

    pub fn stop(&self) {
        self.post(GraphEvent::Stop);
    }

    pub fn unload(&self) {
        self.post(GraphEvent::Unload);
    }

    /// Stops the worker thread and joins it. The queue is drained up to the
    /// kill sentinel; anything after it is dropped.
    pub fn deinit(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(GraphCmd::KillThread);
            let _ = worker.join();
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.deinit();
    }
}

fn run_worker(rx: Receiver<GraphCmd>, mut ops: GraphOps) {
    let mut fsm = GraphFsm::new();
    while let Ok(cmd) = rx.recv() {
        match cmd {
            GraphCmd::KillThread => break,
            GraphCmd::Event(event) => dispatch(&mut fsm, &mut ops, event),
        }
    }
    debug!("[{}] worker exiting", ops.name());
}

fn dispatch(fsm: &mut GraphFsm, ops: &mut GraphOps, event: GraphEvent) {
    // A load on a terminated machine replays the whole lifecycle; this is
    // how a registry graph is revived for the next run of its encoding.
    if matches!(event, GraphEvent::Load) {
        fsm.reset();
        ops.do_reset_internal_error();
    }
    debug!(
        "[{}] {} <- {}",
        ops.name(),
        fsm.state_name(),
        ops.describe_event(&event)
    );
    fsm.process(ops, event);

    // A failed operation surfaces here, once the triggering event has been
    // fully handled. The injected error is fatal and unwinds the pipeline.
    if !fsm.terminated() {
        if let Some((error, msg)) = ops.internal_error() {
            debug!("[{}] internal error detected: {}", ops.name(), error);
            fsm.process(ops, GraphEvent::Err { error, msg });
        }
    }
}

//! OpenMAX IL graph orchestration core.
//!
//! This crate drives linear pipelines of OMX components (source → decoder →
//! renderer) through their mandated state transitions and sequences a whole
//! playlist of them. Two tiers cooperate: a per-pipeline [`graph::Graph`]
//! owns one worker thread and one state machine that walks a single pipeline
//! Loaded → Idle → Executing and back, and a playlist-level
//! [`manager::Manager`] owns the playlist, a registry of reusable graphs
//! keyed by encoding, and its own state machine handling skips, pause, stop
//! and recoverable errors.
//!
//! The OMX component library itself and the stream prober are external
//! collaborators, abstracted behind [`omx::OmxCore`] and
//! [`probe::MediaProbe`].

pub mod graph;
pub mod manager;
pub mod omx;
pub mod playlist;
pub mod probe;

pub use manager::Manager;
pub use omx::{OmxCore, OmxError};
pub use playlist::Playlist;
pub use probe::MediaProbe;

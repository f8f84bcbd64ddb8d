//! Expected-event bookkeeping.
//!
//! When a batch command is issued to the pipeline (a state set across all
//! handles, a port disable on some handles) one entry per expected
//! completion is recorded here. Completion events drain the sets as they
//! arrive, in any order; a batch is complete when its set is empty. The
//! match predicate uses (component, payload) only — the error field some
//! components attach to otherwise successful completions is ignored.

use log::trace;

use crate::omx::{ComponentId, OmxState};

/// Port transition direction expected from a `CmdComplete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortTransition {
    Disable,
    Enable,
}

/// The two parallel expected-completion sets of one pipeline.
#[derive(Debug, Default)]
pub struct PendingTransitions {
    state_transitions: Vec<(ComponentId, OmxState)>,
    port_transitions: Vec<(ComponentId, u32, PortTransition)>,
}

impl PendingTransitions {
    pub fn new() -> PendingTransitions {
        PendingTransitions::default()
    }

    pub fn clear_transitions(&mut self) {
        self.state_transitions.clear();
    }

    /// Replaces the expected set with one entry per component, all toward
    /// the same state.
    pub fn record_transitions(&mut self, components: &[ComponentId], to_state: OmxState) {
        self.clear_transitions();
        for component in components {
            self.state_transitions.push((*component, to_state));
        }
    }

    pub fn add_transition(&mut self, component: ComponentId, to_state: OmxState) {
        self.state_transitions.push((component, to_state));
    }

    /// Drains a matching entry and reports whether the whole batch is now
    /// complete. A stale event that matches nothing does not grow the set.
    pub fn complete_transition(&mut self, component: ComponentId, to_state: OmxState) -> bool {
        if let Some(index) = self
            .state_transitions
            .iter()
            .position(|entry| *entry == (component, to_state))
        {
            self.state_transitions.remove(index);
        }
        trace!(
            "complete_transition: {} expected transitions left",
            self.state_transitions.len()
        );
        self.state_transitions.is_empty()
    }

    pub fn transitions_pending(&self) -> usize {
        self.state_transitions.len()
    }

    pub fn clear_port_transitions(&mut self) {
        self.port_transitions.clear();
    }

    pub fn add_port_transition(
        &mut self,
        component: ComponentId,
        port: u32,
        transition: PortTransition,
    ) {
        self.port_transitions.push((component, port, transition));
    }

    /// Drains a matching port entry; complete only when a match was found
    /// and the set is now empty.
    pub fn complete_port_transition(
        &mut self,
        component: ComponentId,
        port: u32,
        transition: PortTransition,
    ) -> bool {
        let Some(index) = self
            .port_transitions
            .iter()
            .position(|entry| *entry == (component, port, transition))
        else {
            return false;
        };
        self.port_transitions.remove(index);
        self.port_transitions.is_empty()
    }

    pub fn port_transitions_pending(&self) -> usize {
        self.port_transitions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ComponentId = ComponentId(1);
    const B: ComponentId = ComponentId(2);
    const C: ComponentId = ComponentId(3);

    #[test]
    fn batch_completes_when_all_events_arrive() {
        let mut pending = PendingTransitions::new();
        pending.record_transitions(&[A, B, C], OmxState::Idle);
        assert!(!pending.complete_transition(B, OmxState::Idle));
        assert!(!pending.complete_transition(A, OmxState::Idle));
        assert!(pending.complete_transition(C, OmxState::Idle));
    }

    #[test]
    fn set_drains_monotonically() {
        let mut pending = PendingTransitions::new();
        pending.record_transitions(&[A, B], OmxState::Executing);
        let before = pending.transitions_pending();
        pending.complete_transition(A, OmxState::Executing);
        assert!(pending.transitions_pending() < before);
        // An unmatched event never grows the set back.
        pending.complete_transition(A, OmxState::Executing);
        assert_eq!(pending.transitions_pending(), 1);
    }

    #[test]
    fn mismatched_state_does_not_drain() {
        let mut pending = PendingTransitions::new();
        pending.record_transitions(&[A], OmxState::Idle);
        assert!(!pending.complete_transition(A, OmxState::Executing));
        assert_eq!(pending.transitions_pending(), 1);
    }

    #[test]
    fn record_replaces_previous_batch() {
        let mut pending = PendingTransitions::new();
        pending.record_transitions(&[A, B], OmxState::Idle);
        pending.record_transitions(&[A], OmxState::Executing);
        assert_eq!(pending.transitions_pending(), 1);
        assert!(pending.complete_transition(A, OmxState::Executing));
    }

    #[test]
    fn full_lifecycle_drains_at_each_stage() {
        let mut pending = PendingTransitions::new();
        let all = [A, B, C];
        for state in [
            OmxState::Idle,
            OmxState::Executing,
            OmxState::Idle,
            OmxState::Loaded,
        ] {
            pending.record_transitions(&all, state);
            assert!(!pending.complete_transition(C, state));
            assert!(!pending.complete_transition(B, state));
            assert!(pending.complete_transition(A, state));
        }
    }

    #[test]
    fn port_transitions_require_a_match() {
        let mut pending = PendingTransitions::new();
        pending.add_port_transition(A, 1, PortTransition::Disable);
        pending.add_port_transition(B, 0, PortTransition::Disable);
        assert!(!pending.complete_port_transition(A, 0, PortTransition::Disable));
        assert!(!pending.complete_port_transition(A, 1, PortTransition::Disable));
        assert!(pending.complete_port_transition(B, 0, PortTransition::Disable));
    }
}

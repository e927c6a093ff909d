//! Presentation sink that records everything it is told.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tandem_core::{Notice, Presentation, PresentationEvent, RemovalReason};
use tandem_proto::{GameState, Participant};

/// Records presentation events. Clones share the same log, so a test can keep
/// one clone while the runtime owns another.
#[derive(Clone, Default)]
pub struct RecordingPresentation {
    events: Arc<Mutex<Vec<PresentationEvent>>>,
}

impl RecordingPresentation {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<PresentationEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event as if it had been dispatched.
    pub fn record(&self, event: PresentationEvent) {
        self.log().push(event);
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<PresentationEvent> {
        self.log().clone()
    }

    /// Recorded notices, in order.
    pub fn notices(&self) -> Vec<Notice> {
        self.log()
            .iter()
            .filter_map(|e| match e {
                PresentationEvent::Notice(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    /// How many times `notice` was shown.
    pub fn count(&self, notice: &Notice) -> usize {
        self.log().iter().filter(|e| matches!(e, PresentationEvent::Notice(n) if n == notice)).count()
    }

    /// Recorded removals, in order.
    pub fn removals(&self) -> Vec<RemovalReason> {
        self.log()
            .iter()
            .filter_map(|e| match e {
                PresentationEvent::Removed(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    /// Most recent state shown.
    pub fn latest_state(&self) -> Option<GameState> {
        self.log().iter().rev().find_map(|e| match e {
            PresentationEvent::StateChanged(s) => Some(s.clone()),
            _ => None,
        })
    }

    /// Most recent player list shown.
    pub fn latest_players(&self) -> Option<Vec<Participant>> {
        self.log().iter().rev().find_map(|e| match e {
            PresentationEvent::MembershipChanged(p) => Some(p.clone()),
            _ => None,
        })
    }
}

impl Presentation for RecordingPresentation {
    fn on_state_changed(&mut self, state: &GameState) {
        self.record(PresentationEvent::StateChanged(state.clone()));
    }

    fn on_membership_changed(&mut self, players: &[Participant]) {
        self.record(PresentationEvent::MembershipChanged(players.to_vec()));
    }

    fn on_notice(&mut self, notice: &Notice) {
        self.record(PresentationEvent::Notice(notice.clone()));
    }

    fn on_removed(&mut self, reason: RemovalReason) {
        self.record(PresentationEvent::Removed(reason));
    }
}

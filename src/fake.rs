//! The shared context every resource client funnels through

use crate::action::{Action, ActionHistory, ActionRequest};
use crate::reactor::{default_reaction, Reactor, ReactorChain, Reply};
use crate::tracker::ObjectTracker;
use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

struct FakeState {
    history: ActionHistory,
    reactors: ReactorChain,
}

/// One fake API server: an object tracker plus the reactor chain and the
/// action history that front it
///
/// Recording and reacting happen under a single lock, so concurrent callers
/// are serialized into history order and never observe each other's partial
/// effects. Reactions run while that lock is held: they must reach the store
/// through [`ReactionContext::tracker`](crate::ReactionContext) rather than
/// by calling back into the fake.
pub struct Fake {
    tracker: Arc<ObjectTracker>,
    state: Mutex<FakeState>,
    default_reactor: bool,
}

impl Fake {
    pub fn new(tracker: Arc<ObjectTracker>) -> Self {
        Self::with_reactors(tracker, ReactorChain::new(), true)
    }

    pub(crate) fn with_reactors(
        tracker: Arc<ObjectTracker>,
        reactors: ReactorChain,
        default_reactor: bool,
    ) -> Self {
        Self {
            tracker,
            state: Mutex::new(FakeState {
                history: ActionHistory::new(),
                reactors,
            }),
            default_reactor,
        }
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        &self.tracker
    }

    /// Register a reactor at the back of the chain
    pub fn add_reactor(&self, reactor: Reactor) {
        self.append_reactor(reactor);
    }

    pub fn append_reactor(&self, reactor: Reactor) {
        debug!("appending {:?}", reactor);
        self.lock().reactors.append(reactor);
    }

    /// Register a reactor ahead of every reactor already in the chain
    pub fn prepend_reactor(&self, reactor: Reactor) {
        debug!("prepending {:?}", reactor);
        self.lock().reactors.prepend(reactor);
    }

    /// Record the action, then answer it from the reactor chain or the tracker
    pub fn invoke(&self, request: ActionRequest) -> Result<Reply> {
        // Held until the reaction completes
        let mut state = self.lock();
        let action = state.history.record(request);
        trace!("invoking {}", action);

        if let Some(outcome) = state.reactors.react(&action, &self.tracker) {
            return outcome;
        }
        if self.default_reactor {
            return default_reaction(&self.tracker, &action);
        }
        Err(Error::Unsupported(format!(
            "no reactor handled {} and the default reactor is disabled",
            action
        )))
    }

    /// Snapshot of the recorded actions in invocation order
    pub fn actions(&self) -> Vec<Action> {
        self.lock().history.snapshot()
    }

    pub fn clear_actions(&self) {
        self.lock().history.clear();
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Fake {
    fn default() -> Self {
        Self::new(Arc::new(ObjectTracker::new()))
    }
}

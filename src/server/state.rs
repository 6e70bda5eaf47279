use std::sync::Mutex;

use crate::{
    common::data::{Answer, Capture, Query, Registration},
    matchers::Match,
};

/// Everything the dispatcher and the retrieval API share: the ordered
/// registration table, the capture log, the capture sequence counter, and the
/// inbound request counter.
///
/// The request counter counts every inbound request; the capture log only grows
/// for matched ones, so the two deliberately diverge when requests fall through
/// to the fallback.
pub(crate) struct ServerState {
    registrations: Vec<Registration>,
    captures: Vec<Capture>,
    next_sequence: usize,
    request_count: usize,
}

impl ServerState {
    pub(crate) fn new() -> Self {
        ServerState {
            registrations: Vec::new(),
            captures: Vec::new(),
            next_sequence: 0,
            request_count: 0,
        }
    }
}

pub(crate) trait StateManager {
    fn add_registration(&self, registration: Registration);

    /// Serves one inbound query: counts it, finds the oldest eligible
    /// registration, consumes one use and records the capture. Returns `None`
    /// when nothing matches (the caller then emits the fallback).
    fn serve(&self, query: Query) -> Option<Answer>;

    fn take_oldest(&self) -> Option<Capture>;
    fn take_matching(&self, predicate: &dyn Match<Answer>) -> Option<Capture>;
    fn take_all_matching(&self, predicate: &dyn Match<Answer>) -> Vec<Capture>;

    fn request_count(&self) -> usize;

    fn reset(&self);
}

/// The single coarse lock guarding all shared state. Matching, use-count
/// decrement, capture append and counter bump execute as one critical section,
/// so concurrent dispatches can never both consume the last use of a
/// registration, and capture sequence numbers are gap-free.
pub(crate) struct StubStateManager {
    state: Mutex<ServerState>,
}

impl StubStateManager {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::new()),
        }
    }
}

impl StateManager for StubStateManager {
    fn add_registration(&self, registration: Registration) {
        let mut state = self.state.lock().unwrap();

        tracing::debug!(
            "registering answer with status {} and uses {:?} at position {}",
            registration.answer().status(),
            registration.remaining(),
            state.registrations.len()
        );

        state.registrations.push(registration);
    }

    fn serve(&self, query: Query) -> Option<Answer> {
        let mut state = self.state.lock().unwrap();

        state.request_count += 1;

        let found = state
            .registrations
            .iter()
            .position(|registration| registration.matches(&query));

        let idx = match found {
            Some(idx) => idx,
            None => {
                tracing::debug!(
                    "no registered answer matches {} {}",
                    query.method(),
                    query.target()
                );
                return None;
            }
        };

        let answer = state.registrations[idx].consume();

        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let capture = Capture::new(query, answer.clone(), sequence);
        tracing::debug!(
            "registration {} answers {} {} with status {} (capture #{})",
            idx,
            capture.query().method(),
            capture.query().target(),
            answer.status(),
            capture.sequence()
        );
        state.captures.push(capture);

        Some(answer)
    }

    fn take_oldest(&self) -> Option<Capture> {
        let mut state = self.state.lock().unwrap();

        if state.captures.is_empty() {
            return None;
        }

        Some(state.captures.remove(0))
    }

    fn take_matching(&self, predicate: &dyn Match<Answer>) -> Option<Capture> {
        let mut state = self.state.lock().unwrap();

        let idx = state
            .captures
            .iter()
            .position(|capture| predicate.matches(capture.answer()))?;

        Some(state.captures.remove(idx))
    }

    fn take_all_matching(&self, predicate: &dyn Match<Answer>) -> Vec<Capture> {
        let mut state = self.state.lock().unwrap();

        let captures = std::mem::take(&mut state.captures);
        let (taken, kept) = captures
            .into_iter()
            .partition(|capture| predicate.matches(capture.answer()));
        state.captures = kept;

        taken
    }

    fn request_count(&self) -> usize {
        self.state.lock().unwrap().request_count
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        *state = ServerState::new();

        tracing::trace!("discarded registrations, captures and counters");
    }
}

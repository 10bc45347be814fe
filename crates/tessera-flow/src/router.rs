//! Routing of inbound session messages to flow inboxes
//!
//! Events for a bound session go straight to its inbox. Events that arrive
//! before a checkpointed session is restored are held, up to
//! [`PENDING_PER_ROUTE`] per session; anything else is dropped, so the router
//! holds state only for live sessions and checkpointed ones.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tessera_core::PartyName;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::session::{SessionId, SessionRole};

/// Events held for one unrestored session at most
pub(crate) const PENDING_PER_ROUTE: usize = 64;

/// A session message as seen by the receiving flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEvent {
    Data(Vec<u8>),
    Error(String),
    Rejected(String),
    End,
}

/// Identifies one local end of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RouteKey {
    pub(crate) peer: PartyName,
    pub(crate) session: SessionId,
    /// Our role in the session
    pub(crate) role: SessionRole,
}

#[derive(Debug, Default)]
struct RouterState {
    routes: HashMap<RouteKey, mpsc::UnboundedSender<SessionEvent>>,
    /// Checkpointed sessions not restored yet
    expected: HashSet<RouteKey>,
    /// Events held for expected sessions
    pending: HashMap<RouteKey, Vec<SessionEvent>>,
}

#[derive(Debug, Default)]
pub(crate) struct Router {
    state: Mutex<RouterState>,
}

impl Router {
    /// Hold events for `keys` until they are opened
    pub(crate) fn expect(&self, keys: impl IntoIterator<Item = RouteKey>) {
        let mut state = self.state.lock();
        for key in keys {
            if !state.routes.contains_key(&key) {
                state.expected.insert(key);
            }
        }
    }

    /// Bind a session end, returning its inbox with any held events queued
    pub(crate) fn open(&self, key: RouteKey) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.expected.remove(&key);
        for event in state.pending.remove(&key).unwrap_or_default() {
            let _ = tx.send(event);
        }
        state.routes.insert(key, tx);
        rx
    }

    pub(crate) fn is_open(&self, key: &RouteKey) -> bool {
        self.state.lock().routes.contains_key(key)
    }

    pub(crate) fn close(&self, key: &RouteKey) {
        let mut state = self.state.lock();
        state.routes.remove(key);
        state.expected.remove(key);
        state.pending.remove(key);
    }

    /// Deliver an event, holding it if its session awaits restore
    pub(crate) fn deliver(&self, key: RouteKey, event: SessionEvent) {
        let mut state = self.state.lock();
        if state.routes.contains_key(&key) {
            let delivered = state.routes.get(&key).is_some_and(|tx| tx.send(event).is_ok());
            if !delivered {
                // The flow is gone without closing its end.
                state.routes.remove(&key);
                trace!(peer = %key.peer, session = %key.session, "Dropping event for abandoned session");
            }
            return;
        }
        if !state.expected.contains(&key) {
            trace!(peer = %key.peer, session = %key.session, "Dropping event for unknown session");
            return;
        }
        let held = state.pending.entry(key.clone()).or_default();
        if held.len() >= PENDING_PER_ROUTE {
            warn!(peer = %key.peer, session = %key.session, "Too many events held for unrestored session");
            return;
        }
        trace!(peer = %key.peer, session = %key.session, "Holding event for unrestored session");
        held.push(event);
    }

    #[cfg(test)]
    fn footprint(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (state.routes.len(), state.expected.len(), state.pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RouteKey {
        RouteKey {
            peer: PartyName::new("Bob").unwrap(),
            session: SessionId::new(),
            role: SessionRole::Initiator,
        }
    }

    #[tokio::test]
    async fn test_events_for_checkpointed_session_are_held() {
        let router = Router::default();
        let key = key();
        router.expect([key.clone()]);
        router.deliver(key.clone(), SessionEvent::Data(vec![1]));
        router.deliver(key.clone(), SessionEvent::End);

        let mut inbox = router.open(key.clone());
        router.deliver(key, SessionEvent::Data(vec![2]));
        assert_eq!(inbox.recv().await, Some(SessionEvent::Data(vec![1])));
        assert_eq!(inbox.recv().await, Some(SessionEvent::End));
        assert_eq!(inbox.recv().await, Some(SessionEvent::Data(vec![2])));
        assert_eq!(router.footprint(), (1, 0, 0));
    }

    #[test]
    fn test_events_for_unknown_sessions_are_dropped() {
        let router = Router::default();
        for _ in 0..1_000 {
            router.deliver(key(), SessionEvent::Data(vec![0]));
            router.deliver(key(), SessionEvent::End);
        }
        assert_eq!(router.footprint(), (0, 0, 0));
    }

    #[test]
    fn test_closed_sessions_leave_nothing_behind() {
        let router = Router::default();
        for _ in 0..10_000 {
            let key = key();
            let _inbox = router.open(key.clone());
            router.close(&key);
            router.deliver(key, SessionEvent::End);
        }
        assert_eq!(router.footprint(), (0, 0, 0));
    }

    #[test]
    fn test_held_events_are_capped() {
        let router = Router::default();
        let key = key();
        router.expect([key.clone()]);
        for i in 0..PENDING_PER_ROUTE + 10 {
            router.deliver(key.clone(), SessionEvent::Data(vec![i as u8]));
        }
        let state = router.state.lock();
        assert_eq!(state.pending[&key].len(), PENDING_PER_ROUTE);
    }

    #[test]
    fn test_abandoned_route_is_released() {
        let router = Router::default();
        let key = key();
        drop(router.open(key.clone()));
        router.deliver(key.clone(), SessionEvent::Data(vec![1]));
        assert!(!router.is_open(&key));
        assert_eq!(router.footprint(), (0, 0, 0));
    }
}

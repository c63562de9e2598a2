//! The typed event bus: per-kind listener registration and panic-safe dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::RouterError;
use crate::state::{NavigationOptions, State};

/// A lifecycle event emitted by the router or its transition engine.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    RouterStart,
    RouterStop,
    TransitionStart {
        to: State,
        from: Option<State>,
    },
    TransitionSuccess {
        to: State,
        from: Option<State>,
        options: NavigationOptions,
    },
    TransitionError {
        to: State,
        from: Option<State>,
        error: RouterError,
    },
    TransitionCancel {
        to: State,
        from: Option<State>,
    },
}

/// Discriminant used to key listener registrations, independent of event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RouterStart,
    RouterStop,
    TransitionStart,
    TransitionSuccess,
    TransitionError,
    TransitionCancel,
}

impl RouterEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RouterEvent::RouterStart => EventKind::RouterStart,
            RouterEvent::RouterStop => EventKind::RouterStop,
            RouterEvent::TransitionStart { .. } => EventKind::TransitionStart,
            RouterEvent::TransitionSuccess { .. } => EventKind::TransitionSuccess,
            RouterEvent::TransitionError { .. } => EventKind::TransitionError,
            RouterEvent::TransitionCancel { .. } => EventKind::TransitionCancel,
        }
    }
}

type Listener = Arc<dyn Fn(&RouterEvent) + Send + Sync>;

/// A handle returned from [`EventBus::on`]; dropping it does *not* unsubscribe — call
/// [`Unsubscribe::unsubscribe`] explicitly, matching the design's "unsubscribe handle" contract.
#[derive(Clone)]
pub struct Unsubscribe {
    bus: Arc<EventBusInner>,
    kind: EventKind,
    id: u64,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        self.bus.remove(self.kind, self.id);
    }
}

struct EventBusInner {
    listeners: RwLock<std::collections::HashMap<EventKind, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl EventBusInner {
    fn remove(&self, kind: EventKind, id: u64) {
        if let Ok(mut map) = self.listeners.write() {
            if let Some(list) = map.get_mut(&kind) {
                list.retain(|(entry_id, _)| *entry_id != id);
            }
        }
    }
}

/// Typed fan-out of lifecycle events to listeners. Dispatch is to a snapshot of the listener set
/// taken at emit time, so a listener registering/unsubscribing mid-dispatch is safe and never
/// observed by the in-flight emit. A panicking listener is caught and logged; it never aborts
/// dispatch or propagates into the transition pipeline.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(EventKind, usize)> = self
            .inner
            .listeners
            .read()
            .map(|m| m.iter().map(|(k, v)| (*k, v.len())).collect())
            .unwrap_or_default();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                listeners: RwLock::new(std::collections::HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a listener for `kind`, returning an unsubscribe handle.
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&RouterEvent) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut map = self.inner.listeners.write().expect("event bus lock poisoned");
        map.entry(kind).or_default().push((id, Arc::new(listener)));
        Unsubscribe {
            bus: self.inner.clone(),
            kind,
            id,
        }
    }

    /// Dispatches `event` to every listener registered for its kind, cloning the listener vector
    /// (behind the shared `Arc`s) before iterating.
    pub fn emit(&self, event: RouterEvent) {
        let snapshot: Vec<Listener> = {
            let map = self.inner.listeners.read().expect("event bus lock poisoned");
            map.get(&event.kind())
                .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };

        for listener in snapshot {
            let event_ref = &event;
            if catch_unwind(AssertUnwindSafe(|| listener(event_ref))).is_err() {
                tracing::error!(kind = ?event.kind(), "event listener panicked; ignoring");
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .read()
            .ok()
            .and_then(|m| m.get(&kind).map(Vec::len))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn home() -> State {
        State::new("home", Default::default(), "/")
    }

    #[test]
    fn dispatches_to_registered_listeners() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        bus.on(EventKind::TransitionStart, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(RouterEvent::TransitionStart { to: home(), from: None });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_future_dispatch() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handle = bus.on(EventKind::RouterStart, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(RouterEvent::RouterStart);
        handle.unsubscribe();
        bus.emit(RouterEvent::RouterStart);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_stop_dispatch_to_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        bus.on(EventKind::RouterStop, |_| panic!("boom"));
        bus.on(EventKind::RouterStop, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(RouterEvent::RouterStop);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_count_reflects_registrations() {
        let bus = EventBus::new();
        assert_eq!(bus.listener_count(EventKind::RouterStart), 0);
        bus.on(EventKind::RouterStart, |_| {});
        assert_eq!(bus.listener_count(EventKind::RouterStart), 1);
    }
}

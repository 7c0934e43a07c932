// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.


//! [`Observer`]s of lifecycle [`Event`]s and their [`Dispatcher`].

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use derive_more::with_trait::{Debug, Display};
use parking_lot::{Mutex, RwLock};

use crate::{
    event::{Event, EventKind},
    plan::PlanNode,
};

/// Receiver of [`Event`]s.
///
/// Delivery is synchronous, on the thread publishing the [`Event`].
pub trait Observer: Send + Sync {
    /// Indicates whether this [`Observer`] wants events of the given kind.
    fn accepts(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }

    /// Handles the given [`Event`].
    fn on_event(&self, event: &Event);
}

/// Handle of a subscribed [`Observer`].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[display("observer#{_0}")]
pub struct Subscription(u64);

type Observers = Arc<Vec<(Subscription, Arc<dyn Observer>)>>;

/// Publisher of [`Event`]s to subscribed [`Observer`]s.
///
/// Subscribing and unsubscribing replace the list of observers, while
/// [`Dispatcher::publish()`] iterates the list taken when it started, so
/// both can happen concurrently.
#[derive(Debug, Default)]
pub struct Dispatcher {
    #[debug("{}", observers.read().len())]
    observers: RwLock<Observers>,
    next_id: AtomicU64,
    seq: AtomicU64,
}

impl Dispatcher {
    /// Creates a [`Dispatcher`] without observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes the given [`Observer`], delivered after the already
    /// subscribed ones.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription {
        let id = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut observers = self.observers.write();
        let mut updated = (**observers).clone();
        updated.push((id, observer));
        *observers = Arc::new(updated);
        tracing::trace!(%id, "observer subscribed");
        id
    }

    /// Unsubscribes an [`Observer`], returning whether it was subscribed.
    pub fn unsubscribe(&self, id: Subscription) -> bool {
        let mut observers = self.observers.write();
        if !observers.iter().any(|(s, _)| *s == id) {
            return false;
        }
        let updated =
            observers.iter().filter(|(s, _)| *s != id).cloned().collect();
        *observers = Arc::new(updated);
        tracing::trace!(%id, "observer unsubscribed");
        true
    }

    /// Returns the number of subscribed [`Observer`]s.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Indicates whether no [`Observer`] is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publishes an [`Event`] to every accepting [`Observer`], in
    /// subscription order.
    pub fn publish(&self, kind: EventKind, payload: Arc<PlanNode>) -> Event {
        let event =
            Event::new(kind, self.seq.fetch_add(1, Ordering::Relaxed), payload);
        let observers = Arc::clone(&*self.observers.read());
        for (_, observer) in observers.iter() {
            if observer.accepts(kind) {
                observer.on_event(&event);
            }
        }
        event
    }
}

/// [`Observer`] recording the kind and node id of every [`Event`].
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<(EventKind, String)>>,
}

impl Recorder {
    /// Creates an empty [`Recorder`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded `(kind, node id)` pairs.
    #[must_use]
    pub fn events(&self) -> Vec<(EventKind, String)> {
        self.events.lock().clone()
    }
}

impl Observer for Recorder {
    fn on_event(&self, event: &Event) {
        self.events.lock().push((event.kind, event.payload.id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::NodeType;

    struct Only(EventKind, Recorder);

    impl Observer for Only {
        fn accepts(&self, kind: EventKind) -> bool {
            kind == self.0
        }

        fn on_event(&self, event: &Event) {
            self.1.on_event(event);
        }
    }

    fn node(id: &str) -> Arc<PlanNode> {
        Arc::new(PlanNode::new(id, NodeType::TestCase, id))
    }

    #[test]
    fn delivers_in_subscription_order() {
        struct Named(&'static str, Arc<Mutex<Vec<&'static str>>>);

        impl Observer for Named {
            fn on_event(&self, _: &Event) {
                self.1.lock().push(self.0);
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        for name in ["first", "second", "third"] {
            let _ = dispatcher.subscribe(Arc::new(Named(name, Arc::clone(&log))));
        }

        let _ = dispatcher.publish(EventKind::PlanCreated, node("plan"));

        assert_eq!(*log.lock(), ["first", "second", "third"]);
    }

    #[test]
    fn filters_by_kind() {
        let dispatcher = Dispatcher::new();
        let only = Arc::new(Only(EventKind::NodeRunFinished, Recorder::new()));
        let _ = dispatcher.subscribe(Arc::clone(&only) as Arc<dyn Observer>);

        let _ = dispatcher.publish(EventKind::NodeRunStarted, node("a"));
        let _ = dispatcher.publish(EventKind::NodeRunFinished, node("a"));

        assert_eq!(
            only.1.events(),
            [(EventKind::NodeRunFinished, "a".to_owned())],
        );
    }

    #[test]
    fn unsubscribed_observers_stop_receiving() {
        let dispatcher = Dispatcher::new();
        let recorder = Arc::new(Recorder::new());
        let id = dispatcher.subscribe(Arc::clone(&recorder) as Arc<dyn Observer>);

        let first = dispatcher.publish(EventKind::PlanRunStarted, node("plan"));
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        let second = dispatcher.publish(EventKind::PlanRunFinished, node("plan"));

        assert_eq!(recorder.events().len(), 1);
        assert!(dispatcher.is_empty());
        assert!(first.seq < second.seq);
        assert!(first.at <= second.at);
    }

    #[test]
    fn observers_may_subscribe_while_publishing() {
        struct Subscriber(Arc<Dispatcher>, Arc<Recorder>);

        impl Observer for Subscriber {
            fn on_event(&self, _: &Event) {
                let _ = self
                    .0
                    .subscribe(Arc::clone(&self.1) as Arc<dyn Observer>);
            }
        }

        let dispatcher = Arc::new(Dispatcher::new());
        let late = Arc::new(Recorder::new());
        let _ = dispatcher.subscribe(Arc::new(Subscriber(
            Arc::clone(&dispatcher),
            Arc::clone(&late),
        )));

        let _ = dispatcher.publish(EventKind::PlanCreated, node("plan"));

        // Not delivered to observers subscribed during the publication.
        assert!(late.events().is_empty());
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn publishes_across_threads() {
        let dispatcher = Arc::new(Dispatcher::new());
        let recorder = Arc::new(Recorder::new());
        let _ = dispatcher.subscribe(Arc::clone(&recorder) as Arc<dyn Observer>);

        let handles = (0..4)
            .map(|n| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let _ = dispatcher
                            .publish(EventKind::NodeRunStarted, node(&n.to_string()));
                        let _ = dispatcher.subscribe(Arc::new(Recorder::new()));
                    }
                })
            })
            .collect::<Vec<_>>();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(recorder.events().len(), 100);
        assert_eq!(dispatcher.len(), 101);
    }
}

//! Change listeners.
//!
//! Listeners are registered per element and called after a remote
//! operation (or an ownership cleanup) has mutated the tree, so a listener
//! that reads the tree sees the new state. Listeners on one element are
//! called in registration order.
//!
//! # Usage
//!
//! ```rust,ignore
//! let events = ctx.subscribe(score_id)?;
//! // ... after receiving remote operations:
//! while let Ok(event) = events.try_recv() {
//!     println!("{event:?}");
//! }
//! ```

use crate::element::Element;
use crate::tree::ElementTree;
use sharetree_codec::TypedValue;
use sharetree_protocol::ElementId;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// Callbacks for changes to one element. Every method defaults to doing
/// nothing.
pub trait ElementListener: Send {
    /// A scalar value (or an object's type) changed.
    fn on_value_changed(&mut self, _tree: &ElementTree, _id: ElementId, _new_value: &TypedValue) {}

    /// A child was added to the object.
    fn on_child_added(&mut self, _tree: &ElementTree, _parent: ElementId, _child: &Element) {}

    /// A child was removed from the object. Also delivered to listeners on
    /// the removed element itself, which are then unregistered.
    fn on_child_removed(
        &mut self,
        _tree: &ElementTree,
        _parent: ElementId,
        _id: ElementId,
        _removed: &Element,
    ) {
    }

    /// An item was inserted into the array.
    fn on_array_inserted(&mut self, _tree: &ElementTree, _id: ElementId, _index: usize, _value: &TypedValue) {}

    /// An array item was overwritten.
    fn on_array_updated(&mut self, _tree: &ElementTree, _id: ElementId, _index: usize, _value: &TypedValue) {}

    /// An array item was removed; `value` is the removed item.
    fn on_array_removed(&mut self, _tree: &ElementTree, _id: ElementId, _index: usize, _value: &TypedValue) {}
}

/// Handle returned by listener registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Owned description of one change, as delivered through
/// [`SyncContext::subscribe`](crate::SyncContext::subscribe).
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    /// A value changed.
    ValueChanged {
        /// The element.
        id: ElementId,
        /// The new value.
        new_value: TypedValue,
    },
    /// A child was added.
    ChildAdded {
        /// The object.
        parent: ElementId,
        /// The new child.
        child: ElementId,
    },
    /// A child was removed.
    ChildRemoved {
        /// The object.
        parent: ElementId,
        /// The removed child.
        id: ElementId,
        /// Value of the removed child, if it was a scalar.
        removed_value: Option<TypedValue>,
    },
    /// An array item was inserted.
    ArrayInserted {
        /// The array.
        id: ElementId,
        /// Item position.
        index: usize,
        /// The item.
        value: TypedValue,
    },
    /// An array item was overwritten.
    ArrayUpdated {
        /// The array.
        id: ElementId,
        /// Item position.
        index: usize,
        /// The new item.
        value: TypedValue,
    },
    /// An array item was removed.
    ArrayRemoved {
        /// The array.
        id: ElementId,
        /// Item position.
        index: usize,
        /// The removed item.
        value: TypedValue,
    },
}

/// Forwards every callback as an [`ElementEvent`] over a channel.
/// Dropping the receiver silently disables the listener.
pub(crate) struct ChannelListener {
    tx: Sender<ElementEvent>,
}

impl ChannelListener {
    pub(crate) fn new() -> (Self, Receiver<ElementEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ElementEvent) {
        let _ = self.tx.send(event);
    }
}

impl ElementListener for ChannelListener {
    fn on_value_changed(&mut self, _: &ElementTree, id: ElementId, new_value: &TypedValue) {
        self.send(ElementEvent::ValueChanged {
            id,
            new_value: new_value.clone(),
        });
    }

    fn on_child_added(&mut self, _: &ElementTree, parent: ElementId, child: &Element) {
        self.send(ElementEvent::ChildAdded {
            parent,
            child: child.id(),
        });
    }

    fn on_child_removed(&mut self, _: &ElementTree, parent: ElementId, id: ElementId, removed: &Element) {
        self.send(ElementEvent::ChildRemoved {
            parent,
            id,
            removed_value: removed.value().cloned(),
        });
    }

    fn on_array_inserted(&mut self, _: &ElementTree, id: ElementId, index: usize, value: &TypedValue) {
        self.send(ElementEvent::ArrayInserted {
            id,
            index,
            value: value.clone(),
        });
    }

    fn on_array_updated(&mut self, _: &ElementTree, id: ElementId, index: usize, value: &TypedValue) {
        self.send(ElementEvent::ArrayUpdated {
            id,
            index,
            value: value.clone(),
        });
    }

    fn on_array_removed(&mut self, _: &ElementTree, id: ElementId, index: usize, value: &TypedValue) {
        self.send(ElementEvent::ArrayRemoved {
            id,
            index,
            value: value.clone(),
        });
    }
}

/// Listeners keyed by the element they watch.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    by_element: HashMap<ElementId, Vec<(ListenerId, Box<dyn ElementListener>)>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, element: ElementId, listener: Box<dyn ElementListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_element.entry(element).or_default().push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        for listeners in self.by_element.values_mut() {
            if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(pos);
                return true;
            }
        }
        false
    }

    pub(crate) fn drop_element(&mut self, element: ElementId) {
        self.by_element.remove(&element);
    }

    pub(crate) fn count(&self, element: ElementId) -> usize {
        self.by_element.get(&element).map_or(0, Vec::len)
    }

    pub(crate) fn notify(&mut self, element: ElementId, mut f: impl FnMut(&mut dyn ElementListener)) {
        if let Some(listeners) = self.by_element.get_mut(&element) {
            for (_, listener) in listeners.iter_mut() {
                f(listener.as_mut());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(std::sync::Arc<parking_lot::Mutex<Vec<&'static str>>>, &'static str);

    impl ElementListener for Recorder {
        fn on_value_changed(&mut self, _: &ElementTree, _: ElementId, _: &TypedValue) {
            self.0.lock().push(self.1);
        }
    }

    #[test]
    fn notified_in_registration_order() {
        let log = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::default();
        let tree = ElementTree::new();
        registry.add(ElementId::ROOT, Box::new(Recorder(log.clone(), "first")));
        registry.add(ElementId::ROOT, Box::new(Recorder(log.clone(), "second")));

        registry.notify(ElementId::ROOT, |l| {
            l.on_value_changed(&tree, ElementId::ROOT, &TypedValue::Int32(1))
        });
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn removal_by_id() {
        let mut registry = ListenerRegistry::default();
        let (listener, _rx) = ChannelListener::new();
        let id = registry.add(ElementId::ROOT, Box::new(listener));
        assert_eq!(registry.count(ElementId::ROOT), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.count(ElementId::ROOT), 0);
    }

    #[test]
    fn channel_listener_forwards_events() {
        let tree = ElementTree::new();
        let (mut listener, rx) = ChannelListener::new();
        listener.on_array_inserted(&tree, ElementId::ROOT, 2, &TypedValue::from("x"));
        assert_eq!(
            rx.try_recv().unwrap(),
            ElementEvent::ArrayInserted {
                id: ElementId::ROOT,
                index: 2,
                value: TypedValue::from("x"),
            }
        );
    }

    #[test]
    fn dropped_receiver_is_harmless() {
        let tree = ElementTree::new();
        let (mut listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_value_changed(&tree, ElementId::ROOT, &TypedValue::Bool(true));
    }
}

/// Handle returned by [`EventBus::listen`], used to unregister.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerKey(u64);

type Listener<E> = Box<dyn FnMut(&E)>;

/// Typed observer list.
///
/// Ordering contract:
/// - Listeners run in registration order.
/// - Each `emit` delivers to every listener before returning.
pub struct EventBus<E> {
    next_key: u64,
    listeners: Vec<(ListenerKey, Listener<E>)>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_key: 0,
            listeners: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&mut self, listener: impl FnMut(&E) + 'static) -> ListenerKey {
        let key = ListenerKey(self.next_key);
        self.next_key = self.next_key.wrapping_add(1);
        self.listeners.push((key, Box::new(listener)));
        key
    }

    pub fn unlisten(&mut self, key: ListenerKey) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(k, _)| *k != key);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn emit(&mut self, event: &E) {
        for (_key, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn delivers_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus: EventBus<u32> = EventBus::new();
        let a = Rc::clone(&log);
        bus.listen(move |e| a.borrow_mut().push(("a", *e)));
        let b = Rc::clone(&log);
        bus.listen(move |e| b.borrow_mut().push(("b", *e)));

        bus.emit(&7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn unlisten_stops_delivery() {
        let count = Rc::new(RefCell::new(0));
        let mut bus: EventBus<()> = EventBus::new();
        let c = Rc::clone(&count);
        let key = bus.listen(move |_| *c.borrow_mut() += 1);
        bus.emit(&());
        assert!(bus.unlisten(key));
        assert!(!bus.unlisten(key));
        bus.emit(&());
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}

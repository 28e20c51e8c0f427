use std::collections::VecDeque;

/// Recorded diagnostic event.
///
/// The bus is the error/log surface of the engine core: anything that is
/// logged-and-dropped (unroutable traffic, abandoned commands) is also pushed
/// here with a stable `kind`, so it can be asserted on without a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Monotonic sequence number, starting at 0.
    pub seq: u64,
    pub kind: &'static str,
    pub message: String,
}

/// Keeps the most recent `capacity` events; older ones are evicted and
/// counted in [`EventBus::evicted`].
#[derive(Debug)]
pub struct EventBus {
    capacity: usize,
    next_seq: u64,
    evicted: u64,
    events: VecDeque<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_seq: 0,
            evicted: 0,
            events: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
        }
    }

    pub fn emit(&mut self, kind: &'static str, message: impl Into<String>) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push_back(Event {
            seq,
            kind,
            message: message.into(),
        });
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Retained events of `kind`.
    pub fn count(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Events pushed out by newer ones since the bus was created.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;

    #[test]
    fn sequence_numbers_survive_drain() {
        let mut bus = EventBus::new();
        bus.emit("a", "one");
        assert_eq!(bus.drain().len(), 1);
        assert!(bus.is_empty());

        bus.emit("b", "two");
        assert_eq!(bus.events().map(|e| e.seq).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn counts_by_kind() {
        let mut bus = EventBus::new();
        bus.emit("timeout", "x");
        bus.emit("unroutable", "y");
        bus.emit("timeout", "z");
        assert_eq!(bus.count("timeout"), 2);
        assert_eq!(bus.count("missing"), 0);
    }

    #[test]
    fn oldest_events_are_evicted_at_capacity() {
        let mut bus = EventBus::with_capacity(2);
        for message in ["a", "b", "c"] {
            bus.emit("unroutable", message);
        }
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.evicted(), 1);
        let kept: Vec<_> = bus.events().map(|e| (e.seq, e.message.as_str())).collect();
        assert_eq!(kept, vec![(1, "b"), (2, "c")]);
    }
}

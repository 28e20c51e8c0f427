//! Deterministic timer queue.
//!
//! Replaces wall-clock `setTimeout`-style callbacks with explicit data: callers
//! schedule a payload for a due [`Time`] and later drain everything that has
//! come due for the current frame.
//!
//! Ordering is total on `(due, id)`, so timers that share a due time fire in
//! the order they were scheduled.

use core::cmp::Ordering;

use foundation::time::Time;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Copy, Clone)]
struct Key {
    due: Time,
    id: TimerId,
}

impl Key {
    fn order(&self, other: &Self) -> Ordering {
        self.due
            .0
            .total_cmp(&other.due.0)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug)]
struct Entry<T> {
    key: Key,
    payload: T,
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn schedule(&mut self, due: Time, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push(Entry {
            key: Key { due, id },
            payload,
        });
        id
    }

    /// Earliest due time, if anything is scheduled.
    pub fn next_due(&self) -> Option<Time> {
        self.earliest().map(|idx| self.entries[idx].key.due)
    }

    /// Pops the earliest timer whose due time is `<= now`.
    pub fn pop_due(&mut self, now: Time) -> Option<(TimerId, T)> {
        let idx = self.earliest()?;
        if self.entries[idx].key.due.0 > now.0 {
            return None;
        }
        let entry = self.entries.swap_remove(idx);
        Some((entry.key.id, entry.payload))
    }

    /// Drains every timer due at `now`, earliest first.
    pub fn drain_due(&mut self, now: Time) -> Vec<(TimerId, T)> {
        let mut out = Vec::new();
        while let Some(item) = self.pop_due(now) {
            out.push(item);
        }
        out
    }

    /// Removes every timer regardless of due time, earliest first.
    pub fn drain_all(&mut self) -> Vec<(TimerId, T)> {
        self.entries.sort_by(|a, b| a.key.order(&b.key));
        self.entries
            .drain(..)
            .map(|e| (e.key.id, e.payload))
            .collect()
    }

    fn earliest(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            match best {
                None => best = Some(idx),
                Some(b) => {
                    if entry.key.order(&self.entries[b].key) == Ordering::Less {
                        best = Some(idx);
                    }
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::TimerQueue;
    use foundation::time::Time;

    #[test]
    fn nothing_fires_before_due() {
        let mut q = TimerQueue::new();
        q.schedule(Time(1.0), "a");
        assert!(q.pop_due(Time(0.99)).is_none());
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due(), Some(Time(1.0)));
    }

    #[test]
    fn fires_earliest_first_then_insertion_order() {
        let mut q = TimerQueue::new();
        q.schedule(Time(2.0), "late");
        q.schedule(Time(1.0), "first");
        q.schedule(Time(1.0), "second");

        let fired: Vec<_> = q.drain_due(Time(5.0)).into_iter().map(|(_, v)| v).collect();
        assert_eq!(fired, vec!["first", "second", "late"]);
        assert!(q.is_empty());
    }

    #[test]
    fn drain_all_ignores_due_time() {
        let mut q = TimerQueue::new();
        q.schedule(Time(9.0), "b");
        q.schedule(Time(3.0), "a");
        let all: Vec<_> = q.drain_all().into_iter().map(|(_, v)| v).collect();
        assert_eq!(all, vec!["a", "b"]);
    }
}

//! Cooperative scheduler: callouts, heartbeats, and resets
//!
//! Callouts are one-shot deferred calls ordered by `(deadline,
//! insertion_seq)`. Heartbeats fire every tick for enabled objects in a
//! stable order (the `BTreeSet` iteration order of their refs). Resets
//! are per-object periodic callbacks with individual intervals. All three
//! are owned by the single driver loop; nothing here is shared across
//! threads.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::object::ObjRef;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Callout {
    pub deadline: u64,
    pub seq: u64,
    pub obj: ObjRef,
    pub func: String,
    pub args: Vec<Value>,
}

impl PartialEq for Callout {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Callout {}

impl PartialOrd for Callout {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Callout {
    /// Reversed so the `BinaryHeap` pops the earliest deadline first,
    /// ties broken by insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

#[derive(Default)]
pub struct Scheduler {
    queue: BinaryHeap<Callout>,
    heartbeats: BTreeSet<ObjRef>,
    /// obj -> (next deadline, interval seconds)
    resets: BTreeMap<ObjRef, (u64, u64)>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    /// Register a one-shot callout. Delays are whole seconds; a
    /// non-positive delay fires on the next tick.
    pub fn schedule(&mut self, obj: ObjRef, func: String, delay: i64, args: Vec<Value>, now: u64) {
        let deadline = now.saturating_add(delay.max(0) as u64);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Callout {
            deadline,
            seq,
            obj,
            func,
            args,
        });
    }

    /// Pop every callout whose deadline has passed, in firing order.
    pub fn due(&mut self, now: u64) -> Vec<Callout> {
        let mut fired = Vec::new();
        while let Some(head) = self.queue.peek() {
            if head.deadline > now {
                break;
            }
            fired.push(self.queue.pop().unwrap());
        }
        fired
    }

    pub fn set_heart_beat(&mut self, obj: ObjRef, on: bool) {
        if on {
            self.heartbeats.insert(obj);
        } else {
            self.heartbeats.remove(&obj);
        }
    }

    pub fn has_heart_beat(&self, obj: ObjRef) -> bool {
        self.heartbeats.contains(&obj)
    }

    /// Heartbeat-enabled objects in stable iteration order.
    pub fn heartbeat_members(&self) -> Vec<ObjRef> {
        self.heartbeats.iter().copied().collect()
    }

    pub fn set_reset(&mut self, obj: ObjRef, interval: i64, now: u64) {
        if interval <= 0 {
            self.resets.remove(&obj);
        } else {
            self.resets
                .insert(obj, (now + interval as u64, interval as u64));
        }
    }

    /// Objects whose reset is due; each is rescheduled by its interval.
    pub fn due_resets(&mut self, now: u64) -> Vec<ObjRef> {
        let due: Vec<ObjRef> = self
            .resets
            .iter()
            .filter(|(_, (next, _))| *next <= now)
            .map(|(r, _)| *r)
            .collect();
        for r in &due {
            if let Some((next, interval)) = self.resets.get_mut(r) {
                *next = now + *interval;
            }
        }
        due
    }

    /// Destruct-time cleanup: cancel callouts, heartbeat, and reset.
    pub fn remove_object(&mut self, obj: ObjRef) {
        self.heartbeats.remove(&obj);
        self.resets.remove(&obj);
        let kept: Vec<Callout> = self
            .queue
            .drain()
            .filter(|c| c.obj != obj)
            .collect();
        self.queue = kept.into();
    }

    pub fn pending_callouts(&self, obj: ObjRef) -> usize {
        self.queue.iter().filter(|c| c.obj == obj).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(n: u32) -> ObjRef {
        ObjRef::new(n, 0)
    }

    #[test]
    fn test_deadline_order_with_insertion_ties() {
        let mut s = Scheduler::new();
        s.schedule(obj(1), "a".into(), 1, vec![], 0);
        s.schedule(obj(1), "b".into(), 1, vec![], 0);
        s.schedule(obj(1), "c".into(), 2, vec![], 0);

        assert!(s.due(0).is_empty());
        let at1: Vec<String> = s.due(1).into_iter().map(|c| c.func).collect();
        assert_eq!(at1, vec!["a", "b"]);
        let at2: Vec<String> = s.due(2).into_iter().map(|c| c.func).collect();
        assert_eq!(at2, vec!["c"]);
    }

    #[test]
    fn test_deadline_never_after_fire_time() {
        let mut s = Scheduler::new();
        s.schedule(obj(1), "late".into(), 3, vec![], 10);
        for fired in s.due(20) {
            assert!(fired.deadline <= 20);
        }
    }

    #[test]
    fn test_negative_delay_fires_immediately() {
        let mut s = Scheduler::new();
        s.schedule(obj(1), "now".into(), -5, vec![], 100);
        assert_eq!(s.due(100).len(), 1);
    }

    #[test]
    fn test_heartbeat_set_is_stable() {
        let mut s = Scheduler::new();
        s.set_heart_beat(obj(3), true);
        s.set_heart_beat(obj(1), true);
        s.set_heart_beat(obj(2), true);
        let order1 = s.heartbeat_members();
        let order2 = s.heartbeat_members();
        assert_eq!(order1, order2);
        s.set_heart_beat(obj(2), false);
        assert_eq!(s.heartbeat_members().len(), 2);
        assert!(!s.has_heart_beat(obj(2)));
    }

    #[test]
    fn test_remove_object_cancels_everything() {
        let mut s = Scheduler::new();
        s.schedule(obj(1), "a".into(), 1, vec![], 0);
        s.schedule(obj(2), "b".into(), 1, vec![], 0);
        s.set_heart_beat(obj(1), true);
        s.set_reset(obj(1), 30, 0);

        s.remove_object(obj(1));
        assert_eq!(s.pending_callouts(obj(1)), 0);
        assert_eq!(s.pending_callouts(obj(2)), 1);
        assert!(!s.has_heart_beat(obj(1)));
        // order among survivors preserved
        let fired = s.due(1);
        assert_eq!(fired[0].func, "b");
    }

    #[test]
    fn test_resets_reschedule() {
        let mut s = Scheduler::new();
        s.set_reset(obj(1), 30, 0);
        assert!(s.due_resets(29).is_empty());
        assert_eq!(s.due_resets(30), vec![obj(1)]);
        // rescheduled for t=60
        assert!(s.due_resets(59).is_empty());
        assert_eq!(s.due_resets(60), vec![obj(1)]);
        s.set_reset(obj(1), 0, 60);
        assert!(s.due_resets(120).is_empty());
    }
}

//! BinaryHeap timer queue used by the poll backend
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Cancel: O(1) (lazy)
//! - Poll expired: O(k log n) where k = number of expired timers
//! - Next deadline: O(1) amortized
//!
//! # Cancellation Strategy
//!
//! Every arming of a token gets a fresh generation recorded in `live`.
//! Cancelling (or re-arming) just replaces/removes that record; stale heap
//! entries are discarded when they reach the front. The heap is cleared
//! outright once nothing is live, and rebuilt from the live entries once
//! stale ones outnumber them.
//!
//! # Repeat policy
//!
//! Fixed-rate: the next deadline is the previous scheduled deadline plus
//! the interval. If the queue is polled more than one interval late, the
//! missed periods are coalesced into a single expiry and the next deadline
//! is the first grid point after `now` (the same behaviour `timerfd` has).

use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use crate::backend::Token;

/// Below this size stale entries are left for `poll_expired`
const COMPACT_MIN: usize = 64;

/// Heap slot (min-heap by deadline)
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    deadline: Instant,
    /// Insertion order, tie-break for equal deadlines
    seq: u64,
    token: Token,
    generation: u64,
    interval: Duration,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: earliest deadline on top, FIFO among equal deadlines
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deadline-ordered timer queue keyed by loop token
#[derive(Debug, Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<HeapEntry>,
    /// token -> generation of its current arming
    live: HashMap<Token, u64>,
    next_seq: u64,
    next_generation: u64,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `token` to expire at `deadline`, replacing any previous arming
    ///
    /// A zero `interval` makes it one-shot.
    pub fn insert(&mut self, token: Token, deadline: Instant, interval: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.live.insert(token, generation);
        self.push(HeapEntry {
            deadline,
            seq: 0,
            token,
            generation,
            interval,
        });
    }

    fn push(&mut self, mut entry: HeapEntry) {
        self.next_seq += 1;
        entry.seq = self.next_seq;
        self.heap.push(entry);
        self.compact_if_sparse();
    }

    /// Drop stale entries once they are more than half the heap
    fn compact_if_sparse(&mut self) {
        if self.heap.len() < COMPACT_MIN || self.heap.len() <= 2 * self.live.len() {
            return;
        }
        let live = &self.live;
        self.heap
            .retain(|e| live.get(&e.token) == Some(&e.generation));
    }

    /// Disarm `token`; returns false if it was not armed
    pub fn cancel(&mut self, token: Token) -> bool {
        let removed = self.live.remove(&token).is_some();
        if self.live.is_empty() {
            self.heap.clear();
        }
        removed
    }

    #[inline]
    fn is_live(&self, entry: &HeapEntry) -> bool {
        self.live.get(&entry.token) == Some(&entry.generation)
    }

    /// Pop every timer due at `now`, rescheduling repeating ones
    ///
    /// Each token appears at most once per call.
    pub fn poll_expired(&mut self, now: Instant, expired: &mut Vec<Token>) {
        let mut rearm = Vec::new();

        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(entry) = self.heap.pop() else { break };

            if !self.is_live(&entry) {
                continue;
            }

            expired.push(entry.token);

            if entry.interval.is_zero() {
                self.live.remove(&entry.token);
            } else {
                rearm.push(HeapEntry {
                    deadline: next_deadline(entry.deadline, entry.interval, now),
                    ..entry
                });
            }
        }

        for entry in rearm {
            self.push(entry);
        }

        if self.live.is_empty() {
            self.heap.clear();
        }
    }

    /// Earliest live deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        // Drop stale entries sitting at the front
        while let Some(top) = self.heap.peek() {
            if self.is_live(top) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    #[cfg(test)]
    fn is_armed(&self, token: Token) -> bool {
        self.live.contains_key(&token)
    }

    /// Number of armed timers
    #[cfg(test)]
    fn len(&self) -> usize {
        self.live.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// First grid point `deadline + k * interval` (k >= 1) strictly after `now`
fn next_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next > now {
        return next;
    }
    let behind = now.duration_since(deadline).as_nanos();
    let step = interval.as_nanos();
    let periods = behind / step + 1;
    let offset = step.saturating_mul(periods).min(u64::MAX as u128) as u64;
    deadline + Duration::from_nanos(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_insert_and_poll() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        heap.insert(7, now, Duration::ZERO);
        assert_eq!(heap.len(), 1);

        let mut expired = Vec::new();
        heap.poll_expired(now + ms(1), &mut expired);
        assert_eq!(expired, vec![7]);
        assert!(heap.is_empty());
        assert!(heap.next_deadline().is_none());
    }

    #[test]
    fn test_ordering() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        heap.insert(3, now + ms(30), Duration::ZERO);
        heap.insert(1, now + ms(10), Duration::ZERO);
        heap.insert(2, now + ms(20), Duration::ZERO);
        heap.insert(4, now + ms(20), Duration::ZERO);

        let mut expired = Vec::new();
        heap.poll_expired(now + ms(50), &mut expired);
        assert_eq!(expired, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_cancel_and_rearm() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        heap.insert(1, now + ms(10), Duration::ZERO);
        heap.insert(2, now + ms(10), Duration::ZERO);

        assert!(heap.cancel(1));
        assert!(!heap.cancel(1));
        assert!(!heap.is_armed(1));

        // Re-arming token 2 supersedes its first deadline
        heap.insert(2, now + ms(40), Duration::ZERO);
        let mut expired = Vec::new();
        heap.poll_expired(now + ms(20), &mut expired);
        assert!(expired.is_empty());

        assert_eq!(heap.next_deadline(), Some(now + ms(40)));
        heap.poll_expired(now + ms(40), &mut expired);
        assert_eq!(expired, vec![2]);
    }

    #[test]
    fn test_repeat_is_fixed_rate() {
        let mut heap = TimerHeap::new();
        let start = Instant::now();
        heap.insert(9, start + ms(5), ms(5));

        let mut expired = Vec::new();
        // Polled 1ms late: next deadline stays on the 5ms grid
        heap.poll_expired(start + ms(6), &mut expired);
        assert_eq!(expired, vec![9]);
        assert_eq!(heap.next_deadline(), Some(start + ms(10)));
        assert!(heap.is_armed(9));
    }

    #[test]
    fn test_repeat_coalesces_missed_periods() {
        let mut heap = TimerHeap::new();
        let start = Instant::now();
        heap.insert(9, start + ms(5), ms(5));

        let mut expired = Vec::new();
        heap.poll_expired(start + ms(23), &mut expired);
        assert_eq!(expired, vec![9]);
        assert_eq!(heap.next_deadline(), Some(start + ms(25)));
    }

    #[test]
    fn test_rearming_long_timer_stays_compact() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        heap.insert(1, now + ms(1), Duration::ZERO);
        for i in 0..1000 {
            heap.insert(2, now + Duration::from_secs(60) + ms(i), Duration::ZERO);
        }
        // Token 1 stays at the front, so token 2's stale entries never surface
        assert!(heap.heap.len() < COMPACT_MIN);
        assert_eq!(heap.len(), 2);

        let mut expired = Vec::new();
        heap.poll_expired(now + ms(1), &mut expired);
        assert_eq!(expired, vec![1]);
        assert_eq!(heap.next_deadline(), Some(now + Duration::from_secs(60) + ms(999)));
    }

    #[test]
    fn test_next_deadline_skips_stale() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        heap.insert(1, now + ms(1), Duration::ZERO);
        heap.insert(2, now + ms(2), Duration::ZERO);
        heap.cancel(1);
        assert_eq!(heap.next_deadline(), Some(now + ms(2)));
    }
}

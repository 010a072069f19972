//! Window-minimum ("winnowing") minimiser producer (spec C2).

use crate::shape::Shape;
use std::collections::VecDeque;

struct Candidate {
    pos: usize,
    hash: u64,
}

/// Monotonic-deque window minimum. `capacity` is `w - s + 1`, the number of
/// candidate hashes a window holds.
struct MinimumWindow {
    queue: VecDeque<Candidate>,
    capacity: usize,
    count: usize,
    last_emitted: Option<u64>,
}

impl MinimumWindow {
    fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            count: 0,
            last_emitted: None,
        }
    }

    /// Feeds one candidate hash; returns `Some(min)` only when the leading
    /// minimum differs from the last value emitted (winnowing suppresses
    /// repeats of the same minimum across overlapping windows).
    #[inline]
    fn push(&mut self, hash: u64) -> Option<u64> {
        if self.capacity == 1 {
            self.count += 1;
            return self.emit(hash);
        }

        let candidate = Candidate { pos: self.count, hash };

        while let Some(back) = self.queue.back() {
            if back.hash > hash {
                self.queue.pop_back();
            } else {
                break;
            }
        }
        self.queue.push_back(candidate);

        while let Some(front) = self.queue.front() {
            if self.count >= self.capacity && front.pos < self.count + 1 - self.capacity {
                self.queue.pop_front();
            } else {
                break;
            }
        }

        self.count += 1;
        if self.count < self.capacity {
            return None;
        }
        let min = self.queue.front().expect("non-empty once filled").hash;
        self.emit(min)
    }

    #[inline]
    fn emit(&mut self, min: u64) -> Option<u64> {
        if self.last_emitted == Some(min) {
            None
        } else {
            self.last_emitted = Some(min);
            Some(min)
        }
    }

    fn clear(&mut self) {
        self.count = 0;
        self.queue.clear();
        self.last_emitted = None;
    }
}

/// Emits the minimiser stream of a sequence: for each window of `w`
/// consecutive shape hashes, the lexicographic minimum, suppressing
/// repeats. An invalid base resets both the shape's rolling k-mer and the
/// window minimum (no minimiser spans it).
pub struct MinimiserIter<'a> {
    hashes: crate::shape::ShapeHashIter<'a>,
    window: MinimumWindow,
    current_run: u64,
    seq: &'a [u8],
    pub emitted: usize,
}

impl<'a> MinimiserIter<'a> {
    pub fn new(seq: &'a [u8], shape: &'a Shape, window_size: usize) -> Self {
        assert!(window_size >= shape.size() as usize, "window must be >= shape size");
        let capacity = window_size - shape.size() as usize + 1;
        Self {
            hashes: shape.hash_stream(seq),
            window: MinimumWindow::new(capacity),
            current_run: 0,
            seq,
            emitted: 0,
        }
    }

    pub fn seq_len(&self) -> usize {
        self.seq.len()
    }
}

impl<'a> Iterator for MinimiserIter<'a> {
    /// `(ordinal, hash)` — `ordinal` is the 1-based index of this minimiser
    /// among the ones emitted so far for this sequence.
    type Item = (usize, u64);

    fn next(&mut self) -> Option<Self::Item> {
        for (_, hash, run) in self.hashes.by_ref() {
            if run != self.current_run {
                // A gap (invalid base) just ended a run; the window must not
                // mix candidates from before and after it (spec: "no
                // minimiser spans it").
                self.window.clear();
                self.current_run = run;
            }
            if let Some(min) = self.window.push(hash) {
                self.emitted += 1;
                return Some((self.emitted, min));
            }
        }
        None
    }
}

/// Convenience: collect the distinct minimiser hashes of one sequence.
pub fn scan_minimisers(seq: &[u8], shape: &Shape, window_size: usize) -> Vec<u64> {
    MinimiserIter::new(seq, shape, window_size).map(|(_, h)| h).collect()
}

// src/ring.rs
//
// Bounded lock-free MPMC ring (Vyukov sequence protocol). Each slot carries
// a monotone sequence number initialised to its index; `head` is the next
// enqueue position, `tail` the next dequeue position. seq == pos marks a
// slot free for the producer claiming pos, seq == pos + 1 marks it full for
// the consumer, and the dequeue recycle store of pos + capacity hands the
// slot to the producer of the next revolution. Ordering is carried entirely
// by the acquire loads / release stores on the sequence numbers; the
// head/tail CAS is relaxed on both edges.

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Slot<T> {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

pub struct MpmcRing<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for MpmcRing<T> {}
unsafe impl<T: Send> Sync for MpmcRing<T> {}

impl<T> MpmcRing<T> {
    /// Capacity must be a power of two >= 2.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity >= 2 && capacity.is_power_of_two(),
            "ring capacity must be a power of two >= 2"
        );
        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Copy `item` into the next free slot. Returns it back on a full ring.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;
            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(item) };
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return Err(item);
            } else {
                // Another producer claimed this position; chase head.
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Copy the oldest item out. `None` on an empty ring.
    pub fn pop(&self) -> Option<T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - pos.wrapping_add(1) as isize;
            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let item = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.seq
                            .store(pos.wrapping_add(self.capacity()), Ordering::Release);
                        return Some(item);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Approximate occupancy: enqueue index minus dequeue index.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for MpmcRing<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fill_then_drain_at_capacity() {
        let q: MpmcRing<u32> = MpmcRing::with_capacity(4);
        assert!(q.is_empty());
        for v in 1..=4 {
            assert!(q.push(v).is_ok());
        }
        assert_eq!(q.push(5), Err(5));
        assert_eq!(q.len(), 4);
        for v in 1..=4 {
            assert_eq!(q.pop(), Some(v));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn fifo_survives_wrap_around() {
        let q: MpmcRing<usize> = MpmcRing::with_capacity(8);
        for round in 0..5 {
            for i in 0..8 {
                assert!(q.push(round * 8 + i).is_ok());
            }
            for i in 0..8 {
                assert_eq!(q.pop(), Some(round * 8 + i));
            }
        }
        assert!(q.is_empty());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_capacity() {
        let _ = MpmcRing::<u8>::with_capacity(6);
    }

    #[test]
    fn spsc_preserves_order() {
        const N: usize = 1000;
        let q: Arc<MpmcRing<usize>> = Arc::new(MpmcRing::with_capacity(1024));

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..N {
                    let mut v = i;
                    while let Err(back) = q.push(v) {
                        v = back;
                        thread::yield_now();
                    }
                }
            })
        };
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut seen = Vec::with_capacity(N);
                while seen.len() < N {
                    match q.pop() {
                        Some(v) => seen.push(v),
                        None => thread::yield_now(),
                    }
                }
                seen
            })
        };

        producer.join().unwrap();
        let seen = consumer.join().unwrap();
        assert_eq!(seen, (0..N).collect::<Vec<_>>());
    }

    #[test]
    fn mpmc_loses_and_duplicates_nothing() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 2;
        const PER_PRODUCER: usize = 10_000;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let q: Arc<MpmcRing<usize>> = Arc::new(MpmcRing::with_capacity(256));
        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let q = q.clone();
            producers.push(thread::spawn(move || {
                // Disjoint value range per producer.
                for i in 0..PER_PRODUCER {
                    let mut v = p * PER_PRODUCER + i;
                    while let Err(back) = q.push(v) {
                        v = back;
                        thread::yield_now();
                    }
                }
            }));
        }

        let drained = Arc::new(AtomicUsize::new(0));
        let mut consumers = Vec::new();
        for _ in 0..CONSUMERS {
            let q = q.clone();
            let drained = drained.clone();
            consumers.push(thread::spawn(move || {
                let mut got = Vec::new();
                loop {
                    match q.pop() {
                        Some(v) => {
                            got.push(v);
                            drained.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {
                            if drained.load(Ordering::Relaxed) >= TOTAL {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                }
                got
            }));
        }

        for p in producers {
            p.join().unwrap();
        }
        let mut all: Vec<usize> = Vec::with_capacity(TOTAL);
        for c in consumers {
            all.extend(c.join().unwrap());
        }
        assert_eq!(all.len(), TOTAL);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), TOTAL, "duplicate or lost values");
        assert_eq!(all[0], 0);
        assert_eq!(all[TOTAL - 1], TOTAL - 1);
    }
}

//! Monotonic frame numbering for the screen stream.

use std::sync::atomic::{AtomicU32, Ordering};

/// Thread-safe counter producing frame ids for outgoing screen frames.
///
/// Ids start at 1 and wrap on `u32` overflow. They are correlation tags for
/// acknowledgements, not a delivery guarantee; wrap-around is harmless.
#[derive(Debug, Default)]
pub struct FrameSequence {
    counter: AtomicU32,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next frame id.
    pub fn next(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns the most recently issued id without advancing, 0 if none yet.
    pub fn current(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ids_start_at_one_and_increment() {
        let seq = FrameSequence::new();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
        assert_eq!(seq.current(), 3);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let seq = Arc::new(FrameSequence::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let seq = Arc::clone(&seq);
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| seq.next()).collect::<Vec<u32>>()
            }));
        }

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8000, "duplicate frame ids were issued");
    }

    #[test]
    fn test_wraps_on_overflow() {
        let seq = FrameSequence::new();
        seq.counter.store(u32::MAX - 1, Ordering::Relaxed);
        assert_eq!(seq.next(), u32::MAX);
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
    }
}

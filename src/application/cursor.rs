//! Start-index / max-features windowing over a feature sequence.

use crate::application::pagination::PaginationState;

/// Lazy window over an iterator: skips `start` items, then yields at most `max`.
///
/// The underlying sequence is only pulled as far as the window needs, so the
/// remainder past the window is never materialised. A cursor cannot be rewound;
/// a new one must be built over a fresh sequence.
#[derive(Debug)]
pub struct FeatureCursor<I> {
    inner: I,
    start: u64,
    max: Option<u64>,
    skipped: bool,
    yielded: u64,
}

impl<I: Iterator> FeatureCursor<I> {
    pub fn new(inner: I, start: Option<u64>, max: Option<u64>) -> Self {
        Self {
            inner,
            start: start.unwrap_or(0),
            max,
            skipped: false,
            yielded: 0,
        }
    }

    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// A bounded window that yielded exactly `max` items. More items may
    /// follow; the cursor does not look ahead to find out.
    pub fn window_filled(&self) -> bool {
        matches!(self.max, Some(max) if self.yielded >= max)
    }

    /// Pagination state of the window consumed so far.
    pub fn pagination(&self) -> PaginationState {
        PaginationState::new(self.start, self.max, self.window_filled())
    }

    fn skip_to_start(&mut self) {
        if self.skipped {
            return;
        }
        self.skipped = true;
        if self.start > 0 {
            let skip = usize::try_from(self.start - 1).unwrap_or(usize::MAX);
            self.inner.nth(skip);
        }
    }
}

impl<I: Iterator> Iterator for FeatureCursor<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_to_start();
        if self.window_filled() {
            return None;
        }
        let item = self.inner.next()?;
        self.yielded += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_window_yields_everything() {
        let mut cursor = FeatureCursor::new(1..=3, None, None);
        let items: Vec<_> = cursor.by_ref().collect();
        assert_eq!(items, vec![1, 2, 3]);
        assert!(!cursor.window_filled());
    }

    #[test]
    fn window_skips_start_and_caps_at_max() {
        let mut cursor = FeatureCursor::new(1..=5, Some(1), Some(2));
        let items: Vec<_> = cursor.by_ref().collect();
        assert_eq!(items, vec![2, 3]);
        assert!(cursor.window_filled());
        let state = cursor.pagination();
        assert!(state.has_prev());
        assert!(state.has_next());
    }

    #[test]
    fn does_not_pull_past_the_window() {
        let mut pulled = 0;
        let source = (0..100).inspect(|_| pulled += 1);
        let items: Vec<_> = FeatureCursor::new(source, Some(2), Some(3)).collect();
        assert_eq!(items, vec![2, 3, 4]);
        assert_eq!(pulled, 5);
    }

    #[test]
    fn start_past_the_end_is_empty() {
        let mut cursor = FeatureCursor::new(0..2, Some(10), Some(1));
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.yielded(), 0);
        assert!(!cursor.pagination().has_next());
    }
}

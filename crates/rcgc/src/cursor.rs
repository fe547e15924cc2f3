//! Bounds-carrying traversal over a tracked region.

use std::fmt;
use std::iter::FusedIterator;

use crate::error::TrackError;

/// A position inside a tracked region, with the region's bounds.
///
/// The lower bound is always 0 and the upper bound is the region length.
/// A cursor may sit on the upper bound (the end position) but never
/// beyond it, and reading at the end position is an error.
///
/// As an [`Iterator`] it yields the elements from the current position to
/// the end. Restart by asking the handle for a fresh [`begin`] cursor.
///
/// [`begin`]: crate::Tracked::begin
pub struct Cursor<'a, T> {
    region: &'a [T],
    position: usize,
}

impl<'a, T> Cursor<'a, T> {
    pub(crate) fn begin(region: &'a [T]) -> Self {
        Self {
            region,
            position: 0,
        }
    }

    pub(crate) fn end(region: &'a [T]) -> Self {
        Self {
            region,
            position: region.len(),
        }
    }

    /// Current offset from the start of the region.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Always 0.
    pub fn lower_bound(&self) -> usize {
        0
    }

    /// Number of elements in the region; the end position.
    pub fn upper_bound(&self) -> usize {
        self.region.len()
    }

    /// Elements left between the current position and the end.
    pub fn remaining(&self) -> usize {
        self.region.len() - self.position
    }

    /// Whether the cursor sits on the end position.
    pub fn is_at_end(&self) -> bool {
        self.position == self.region.len()
    }

    /// The element at the current position.
    ///
    /// # Errors
    ///
    /// [`TrackError::CursorOutOfRange`] at the end position.
    pub fn get(&self) -> Result<&'a T, TrackError> {
        self.region
            .get(self.position)
            .ok_or_else(|| self.out_of_range(self.position))
    }

    /// Step one element forward.
    ///
    /// # Errors
    ///
    /// [`TrackError::CursorOutOfRange`] if already at the end; the position
    /// is unchanged.
    pub fn advance(&mut self) -> Result<(), TrackError> {
        self.advance_by(1)
    }

    /// Step `n` elements forward. Landing exactly on the end is allowed.
    pub fn advance_by(&mut self, n: usize) -> Result<(), TrackError> {
        match self.position.checked_add(n) {
            Some(target) if target <= self.region.len() => {
                self.position = target;
                Ok(())
            }
            _ => Err(self.out_of_range(self.position.saturating_add(n))),
        }
    }

    /// Step one element back.
    ///
    /// # Errors
    ///
    /// [`TrackError::CursorBeforeStart`] at the lower bound.
    pub fn retreat(&mut self) -> Result<(), TrackError> {
        match self.position.checked_sub(1) {
            Some(target) => {
                self.position = target;
                Ok(())
            }
            None => Err(self.before_start(-1)),
        }
    }

    /// The element `offset` steps away from the current position, without
    /// moving.
    ///
    /// # Errors
    ///
    /// [`TrackError::CursorBeforeStart`] if the target precedes the region,
    /// [`TrackError::CursorOutOfRange`] if it is at or past the end.
    pub fn peek_at(&self, offset: isize) -> Result<&'a T, TrackError> {
        let Some(target) = self.position.checked_add_signed(offset) else {
            return Err(self.before_start(offset));
        };
        self.region
            .get(target)
            .ok_or_else(|| self.out_of_range(target))
    }

    fn before_start(&self, offset: isize) -> TrackError {
        TrackError::CursorBeforeStart {
            position: self.position,
            offset,
        }
    }

    fn out_of_range(&self, position: usize) -> TrackError {
        TrackError::CursorOutOfRange {
            position,
            len: self.region.len(),
        }
    }
}

impl<'a, T> Iterator for Cursor<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let item = self.region.get(self.position)?;
        self.position += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Cursor<'_, T> {}

impl<T> FusedIterator for Cursor<'_, T> {}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        Self {
            region: self.region,
            position: self.position,
        }
    }
}

/// Cursors are equal when they walk the same region and sit at the same
/// position.
impl<T> PartialEq for Cursor<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.region, other.region) && self.position == other.position
    }
}

impl<T> Eq for Cursor<'_, T> {}

impl<T> fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.position)
            .field("upper_bound", &self.region.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_every_element_then_stops() {
        let data = [1, 2, 3];
        let cursor = Cursor::begin(&data);
        assert_eq!(cursor.len(), 3);
        let seen: Vec<_> = cursor.copied().collect();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn get_at_end_is_out_of_range() {
        let data = [1, 2];
        let end = Cursor::end(&data);
        assert!(end.is_at_end());
        assert_eq!(
            end.get(),
            Err(TrackError::CursorOutOfRange {
                position: 2,
                len: 2
            })
        );
    }

    #[test]
    fn advancing_past_end_fails_without_moving() {
        let data = [7];
        let mut cursor = Cursor::begin(&data);
        assert_eq!(cursor.get(), Ok(&7));
        cursor.advance().unwrap();
        assert!(cursor.is_at_end());
        assert!(cursor.advance().is_err());
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor, Cursor::end(&data));
    }

    #[test]
    fn advance_by_allows_landing_on_end() {
        let data = [0u8; 4];
        let mut cursor = Cursor::begin(&data);
        cursor.advance_by(4).unwrap();
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(
            cursor.advance_by(usize::MAX),
            Err(TrackError::CursorOutOfRange {
                position: usize::MAX,
                len: 4
            })
        );
    }

    #[test]
    fn retreat_stops_at_lower_bound() {
        let data = [1, 2];
        let mut cursor = Cursor::end(&data);
        cursor.retreat().unwrap();
        assert_eq!(cursor.get(), Ok(&2));
        cursor.retreat().unwrap();
        assert_eq!(cursor.position(), cursor.lower_bound());
        assert_eq!(
            cursor.retreat(),
            Err(TrackError::CursorBeforeStart {
                position: 0,
                offset: -1
            })
        );
    }

    #[test]
    fn peek_at_is_relative_and_checked() {
        let data = [10, 20, 30];
        let mut cursor = Cursor::begin(&data);
        cursor.advance().unwrap();
        assert_eq!(cursor.peek_at(-1), Ok(&10));
        assert_eq!(cursor.peek_at(1), Ok(&30));
        assert_eq!(
            cursor.peek_at(2),
            Err(TrackError::CursorOutOfRange {
                position: 3,
                len: 3
            })
        );
        assert_eq!(
            cursor.peek_at(-2),
            Err(TrackError::CursorBeforeStart {
                position: 1,
                offset: -2
            })
        );
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn cursors_over_different_regions_differ() {
        let a = [1];
        let b = [1];
        assert_ne!(Cursor::begin(&a), Cursor::begin(&b));
        assert_eq!(Cursor::begin(&a), Cursor::begin(&a).clone());
    }
}

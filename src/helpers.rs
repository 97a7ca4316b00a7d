//! Range arithmetic shared by the mirror buffer, the register schema and the
//! slave image.

use crate::Error;

/// Calculates the byte range for an offset and length inside a buffer of
/// `size` bytes.
///
/// Returns `(start, end)` where end is exclusive.
///
/// # Errors
/// * [`Error::ZeroLength`] - if `len` is 0
/// * [`Error::OutOfBounds`] - if the range exceeds `size`
///
/// # Example
/// ```
/// use twi_module::helpers::range_span;
///
/// assert_eq!(range_span(16, 12, 4), Ok((12, 16)));
/// assert!(range_span(16, 14, 4).is_err());
/// ```
pub fn range_span(size: usize, offset: usize, len: usize) -> Result<(usize, usize), Error> {
    if len == 0 {
        return Err(Error::ZeroLength);
    }

    let end = offset.checked_add(len).ok_or(Error::OutOfBounds)?;

    if end > size {
        return Err(Error::OutOfBounds);
    }

    Ok((offset, end))
}

/// Returns true if the half-open ranges `[a, a + a_len)` and `[b, b + b_len)`
/// share at least one byte.
#[inline]
pub fn overlaps(a: usize, a_len: usize, b: usize, b_len: usize) -> bool {
    a_len > 0 && b_len > 0 && a < b + b_len && b < a + a_len
}

/// Extends an optional half-open range so it also covers `[start, end)`.
pub(crate) fn union_range(
    range: Option<(usize, usize)>,
    start: usize,
    end: usize,
) -> Option<(usize, usize)> {
    if start >= end {
        return range;
    }
    Some(match range {
        Some((s, e)) => (s.min(start), e.max(end)),
        None => (start, end),
    })
}

#[test]
fn range_span_edge_cases() {
    // Zero length
    assert_eq!(range_span(16, 0, 0), Err(Error::ZeroLength));

    // Out of bounds
    assert_eq!(range_span(16, 15, 2), Err(Error::OutOfBounds));
    assert_eq!(range_span(16, usize::MAX, 2), Err(Error::OutOfBounds));

    // Last byte
    assert_eq!(range_span(16, 15, 1), Ok((15, 16)));

    // Whole buffer
    assert_eq!(range_span(16, 0, 16), Ok((0, 16)));
}

#[test]
fn overlap_cases() {
    assert!(overlaps(12, 2, 13, 1));
    assert!(overlaps(13, 1, 12, 2));
    // Touching is not overlapping
    assert!(!overlaps(12, 1, 13, 1));
    assert!(!overlaps(13, 1, 12, 1));
    // Empty ranges never overlap
    assert!(!overlaps(12, 0, 12, 4));
}

#[test]
fn union_range_grows() {
    let r = union_range(None, 4, 6);
    assert_eq!(r, Some((4, 6)));
    let r = union_range(r, 1, 2);
    assert_eq!(r, Some((1, 6)));
    // Empty input leaves range untouched
    assert_eq!(union_range(r, 9, 9), Some((1, 6)));
}

use std::ops::Range;

/// Widen `range` to multiples of `align` without exceeding `limit`.
/// Native flush ranges must be atom aligned or end at the memory object size.
pub(crate) fn align_range(range: Range<u64>, align: u64, limit: u64) -> Range<u64> {
    debug_assert!(range.start <= range.end && range.end <= limit);
    if align <= 1 {
        return range;
    }
    let start = range.start - range.start % align;
    let end = if range.end % align == 0 {
        range.end
    } else {
        range.end - range.end % align + align
    };
    start..end.min(limit)
}

/// Round `size` up to multiple of `align`, which need not be power of two.
pub(crate) fn align_size(size: u64, align: u64) -> u64 {
    if align <= 1 || size == 0 {
        size
    } else {
        ((size - 1) / align + 1) * align
    }
}

/// Check that `offset..offset + size` lies within `0..limit`.
pub(crate) fn fits(offset: u64, size: u64, limit: u64) -> bool {
    offset
        .checked_add(size)
        .map_or(false, |end| end <= limit)
}

pub(crate) fn to_usize(value: u64) -> usize {
    assert!(
        value <= usize::max_value() as u64,
        "Value {} doesn't fit in usize",
        value
    );
    value as usize
}

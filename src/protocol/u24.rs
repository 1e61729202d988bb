//! 24-bit modular arithmetic for datagram sequence ids, reliable indexes and
//! order indexes.
//!
//! Every id that travels over the wire as a `u24` lives in `[0, 2^24)`, and once
//! the counter passes `0xFFFFFF` it wraps back to `0`. Comparing two ids by their
//! raw magnitude is therefore meaningless around the wrap point, instead ids are
//! compared by their signed distance in the ring.
//!
//! ```rust
//! use rak_server::protocol::u24;
//!
//! assert_eq!(u24::plus_one(u24::MAX), 0);
//! assert_eq!(u24::minus_wrap(1, u24::MAX), 2);
//! assert_eq!(u24::minus_wrap(u24::MAX, 1), -2);
//! ```

/// The largest value a `u24` can hold.
pub const MAX: u32 = 0x00FF_FFFF;

/// The size of the id space, `2^24`.
pub const SPACE: u32 = MAX + 1;

const HALF_SPACE: i32 = (SPACE / 2) as i32;

/// Masks any value into the 24-bit id space.
#[inline]
pub fn wrap(value: u32) -> u32 {
    value & MAX
}

/// `a + b` modulo `2^24`.
#[inline]
pub fn add(a: u32, b: u32) -> u32 {
    wrap(a.wrapping_add(b))
}

/// `a - b` modulo `2^24`, as an unsigned id.
#[inline]
pub fn minus(a: u32, b: u32) -> u32 {
    wrap(a.wrapping_sub(b))
}

/// The id that follows `a`.
#[inline]
pub fn plus_one(a: u32) -> u32 {
    add(a, 1)
}

/// Signed distance from `b` to `a`, in `(-2^23, 2^23]`.
///
/// A positive result means `a` is ahead of `b`.
pub fn minus_wrap(a: u32, b: u32) -> i32 {
    let diff = minus(a, b) as i32;
    if diff > HALF_SPACE {
        diff - SPACE as i32
    } else {
        diff
    }
}

/// Whether `candidate` is strictly closer than `half_window` ids to `reference`,
/// in either direction.
#[inline]
pub fn in_window(candidate: u32, reference: u32, half_window: u32) -> bool {
    minus_wrap(candidate, reference).unsigned_abs() < half_window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_the_top_of_the_space() {
        assert_eq!(add(MAX, 1), 0);
        assert_eq!(add(MAX, 5), 4);
        assert_eq!(minus(0, 1), MAX);
        assert_eq!(plus_one(MAX - 1), MAX);
    }

    #[test]
    fn distance_is_signed() {
        assert_eq!(minus_wrap(10, 7), 3);
        assert_eq!(minus_wrap(7, 10), -3);
        assert_eq!(minus_wrap(2, MAX - 1), 4);
        assert_eq!(minus_wrap(SPACE / 2, 0), HALF_SPACE);
        assert_eq!(minus_wrap(0, SPACE / 2), HALF_SPACE);
    }

    #[test]
    fn window_is_exclusive() {
        assert!(in_window(2047, 0, 2048));
        assert!(!in_window(2048, 0, 2048));
        assert!(in_window(MAX, 0, 2048));
        assert!(!in_window(MAX - 2047, 0, 2048));
    }
}

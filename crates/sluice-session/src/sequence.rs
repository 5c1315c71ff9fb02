//! Modular arithmetic on 16-bit sequence numbers.
//!
//! Sequences wrap at 2^16, so "later" means "less than half the ring ahead".

/// Half of the sequence space. Distances at or beyond this are "behind".
pub const HALF_RANGE: u16 = 0x8000;

/// Returns `true` if `seq` is strictly ahead of `reference` on the ring.
pub fn is_ahead(seq: u16, reference: u16) -> bool {
    let diff = seq.wrapping_sub(reference);
    diff != 0 && diff < HALF_RANGE
}

/// How far `to` is ahead of `from`.
pub fn distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ahead_simple() {
        assert!(is_ahead(6, 5));
        assert!(!is_ahead(5, 5));
        assert!(!is_ahead(4, 5));
    }

    #[test]
    fn test_is_ahead_across_wrap() {
        assert!(is_ahead(0, u16::MAX));
        assert!(is_ahead(3, 65_530));
        assert!(!is_ahead(65_530, 3));
    }

    #[test]
    fn test_half_range_counts_as_behind() {
        assert!(!is_ahead(HALF_RANGE, 0));
        assert!(is_ahead(HALF_RANGE - 1, 0));
    }

    #[test]
    fn test_distance() {
        assert_eq!(distance(5, 8), 3);
        assert_eq!(distance(u16::MAX, 1), 2);
    }
}

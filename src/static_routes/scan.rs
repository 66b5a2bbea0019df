//! Equality scan over area-number spans, sixteen lanes at a time.
//!
//! Spans are padded with area 0, which never matches a valid goal, so the
//! vector paths never need a scalar tail. All paths return the same index.

/// Span lengths are multiples of this.
pub const LANES: usize = 16;

/// Reference implementation.
pub fn find_scalar(haystack: &[u16], needle: u16) -> Option<usize> {
    haystack.iter().position(|&area| area == needle)
}

/// Portable sixteen-lane scan: builds a lane mask per block and takes the
/// lowest set lane.
pub fn find_chunked(haystack: &[u16], needle: u16) -> Option<usize> {
    let mut blocks = haystack.chunks_exact(LANES);
    for (block_index, block) in blocks.by_ref().enumerate() {
        let mut lanes = 0u32;
        for (lane, &area) in block.iter().enumerate() {
            lanes |= ((area == needle) as u32) << lane;
        }
        if lanes != 0 {
            return Some(block_index * LANES + lanes.trailing_zeros() as usize);
        }
    }
    let tail_start = haystack.len() - blocks.remainder().len();
    find_scalar(blocks.remainder(), needle).map(|i| tail_start + i)
}

/// SSE2 scan, two 8-lane compares per block.
#[cfg(target_arch = "x86_64")]
pub fn find_sse2(haystack: &[u16], needle: u16) -> Option<usize> {
    use std::arch::x86_64::{__m128i, _mm_cmpeq_epi16, _mm_loadu_si128, _mm_movemask_epi8, _mm_set1_epi16};

    let mut blocks = haystack.chunks_exact(LANES);
    // SAFETY: SSE2 is part of the x86_64 baseline, and every load reads eight
    // u16 from a block of sixteen.
    unsafe {
        let wanted = _mm_set1_epi16(needle as i16);
        for (block_index, block) in blocks.by_ref().enumerate() {
            let ptr = block.as_ptr() as *const __m128i;
            let low = _mm_movemask_epi8(_mm_cmpeq_epi16(_mm_loadu_si128(ptr), wanted)) as u32;
            let high = _mm_movemask_epi8(_mm_cmpeq_epi16(_mm_loadu_si128(ptr.add(1)), wanted)) as u32;
            // Two mask bits per u16 lane.
            let bytes = low | (high << 16);
            if bytes != 0 {
                return Some(block_index * LANES + bytes.trailing_zeros() as usize / 2);
            }
        }
    }
    let tail_start = haystack.len() - blocks.remainder().len();
    find_scalar(blocks.remainder(), needle).map(|i| tail_start + i)
}

/// Best scan for the target.
#[inline]
pub fn find(haystack: &[u16], needle: u16) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        find_sse2(haystack, needle)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        find_chunked(haystack, needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(areas: &[u16]) -> Vec<u16> {
        let mut span = areas.to_vec();
        span.resize(areas.len().div_ceil(LANES) * LANES, 0);
        span
    }

    #[test]
    fn test_vector_paths_agree_with_scalar() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..200 {
            let len = rng.usize(0..100);
            let areas: Vec<u16> = (0..len).map(|_| rng.u16(1..60)).collect();
            let span = padded(&areas);
            for needle in 1..64u16 {
                let expected = find_scalar(&span, needle);
                assert_eq!(find_chunked(&span, needle), expected, "chunked, needle {needle}");
                assert_eq!(find(&span, needle), expected, "dispatch, needle {needle}");
                #[cfg(target_arch = "x86_64")]
                assert_eq!(find_sse2(&span, needle), expected, "sse2, needle {needle}");
            }
        }
    }

    #[test]
    fn test_first_match_wins_across_blocks() {
        let mut span = vec![0u16; 48];
        span[17] = 9;
        span[40] = 9;
        assert_eq!(find(&span, 9), Some(17));
        assert_eq!(find_chunked(&span, 9), Some(17));
    }

    #[test]
    fn test_last_lane_of_block() {
        let mut span = vec![1u16; 32];
        span[31] = 5;
        span[15] = 4;
        assert_eq!(find(&span, 5), Some(31));
        assert_eq!(find(&span, 4), Some(15));
        assert_eq!(find(&span, 6), None);
    }

    #[test]
    fn test_unpadded_tail_is_scanned() {
        let span = [3u16, 4, 5];
        assert_eq!(find(&span, 5), Some(2));
        assert_eq!(find_chunked(&span, 5), Some(2));
        assert_eq!(find(&[], 5), None);
    }
}

//! Scratch bit-vectors shared by graph walks.
//!
//! One bit per area and one bit per face, plus a reusable index queue. Every flood fill, visibility pass and routing-table
//! computation borrows the mask mutably for its whole duration, so only one
//! of them can be in flight at a time.

use fixedbitset::FixedBitSet;
use std::collections::VecDeque;

#[derive(Debug, Default, Clone)]
pub struct ElementsMask {
    areas: FixedBitSet,
    faces: FixedBitSet,
    queue: VecDeque<u16>,
}

impl ElementsMask {
    pub fn new(num_areas: usize, num_faces: usize) -> Self {
        Self {
            areas: FixedBitSet::with_capacity(num_areas),
            faces: FixedBitSet::with_capacity(num_faces),
            queue: VecDeque::with_capacity(num_areas.min(4096)),
        }
    }

    /// Grow the scratch space if a world with more elements was loaded.
    pub fn ensure_capacity(&mut self, num_areas: usize, num_faces: usize) {
        if self.areas.len() < num_areas {
            self.areas.grow(num_areas);
        }
        if self.faces.len() < num_faces {
            self.faces.grow(num_faces);
        }
    }

    /// Reset the area bits and hand them out.
    pub fn clear_areas(&mut self) -> AreaBits<'_> {
        self.areas.clear();
        AreaBits { bits: &mut self.areas }
    }

    /// Reset the face bits and hand them out.
    pub fn clear_faces(&mut self) -> &mut FixedBitSet {
        self.faces.clear();
        &mut self.faces
    }

    /// Cleared area bits and the empty queue at once, for flood fills.
    pub fn flood_scratch(&mut self) -> FloodScratch<'_> {
        self.areas.clear();
        self.queue.clear();
        FloodScratch { visited: AreaBits { bits: &mut self.areas }, queue: &mut self.queue }
    }

    pub fn num_areas(&self) -> usize {
        self.areas.len()
    }
}

/// Exclusive view over the area bits.
pub struct AreaBits<'a> {
    bits: &'a mut FixedBitSet,
}

impl AreaBits<'_> {
    /// Set the bit and report whether it was already set.
    #[inline]
    pub fn test_and_set(&mut self, area: usize) -> bool {
        self.bits.put(area)
    }

    #[inline]
    pub fn is_set(&self, area: usize) -> bool {
        self.bits.contains(area)
    }

    #[inline]
    pub fn set(&mut self, area: usize) {
        self.bits.insert(area);
    }

    #[inline]
    pub fn unset(&mut self, area: usize) {
        self.bits.set(area, false);
    }

    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.ones()
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones(..)
    }
}

pub struct FloodScratch<'a> {
    pub visited: AreaBits<'a>,
    pub queue: &'a mut VecDeque<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_bits_reset_between_uses() {
        let mut mask = ElementsMask::new(16, 8);
        {
            let mut bits = mask.clear_areas();
            assert!(!bits.test_and_set(3));
            assert!(bits.test_and_set(3), "second set must report the bit as present");
            bits.set(7);
            assert_eq!(bits.count(), 2);
        }
        let bits = mask.clear_areas();
        assert_eq!(bits.count(), 0, "clear_areas must hand out zeroed bits");
    }

    #[test]
    fn test_flood_scratch_clears_bits_and_queue() {
        let mut mask = ElementsMask::new(4, 0);
        {
            let mut scratch = mask.flood_scratch();
            scratch.visited.set(2);
            scratch.queue.push_back(2);
        }
        let scratch = mask.flood_scratch();
        assert_eq!(scratch.visited.count(), 0);
        assert!(scratch.queue.is_empty());
    }

    #[test]
    fn test_ensure_capacity_grows() {
        let mut mask = ElementsMask::new(4, 4);
        mask.ensure_capacity(100, 50);
        assert_eq!(mask.num_areas(), 100);
        let mut bits = mask.clear_areas();
        bits.set(99);
        assert!(bits.is_set(99));
        assert!(mask.clear_faces().len() >= 50);
    }
}

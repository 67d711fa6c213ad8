// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single-cursor ring allocator for transient per-frame constants.
//!
//! The [`FrameConstantAllocator`] hands out aligned byte ranges inside one
//! fixed-capacity buffer shared by every frame in flight. It keeps no per-allocation
//! bookkeeping: a cursor advances on every allocation and resets to zero when the
//! next aligned range would run past the end. Old data is invalidated en masse by
//! that wraparound.
//!
//! # Frame scoping
//!
//! A naive ring can overlap live frames of different sizes because wraparound wastes
//! the tail of the buffer, and it assumes frames retire oldest first. To rule both out,
//! the buffer is cut into F slots of the per-frame budget `B = capacity / F` (aligned
//! down) and every frame is opened in the slot its caller holds:
//!
//! ```text
//! capacity C, F = 3
//! |  slot 0 (B)  |  slot 1 (B)  |  slot 2 (B)  | tail |
//!   frame n        frame n+1      frame n+2
//!   frame n+3 reuses whichever slot's frame completed first
//! ```
//!
//! The caller hands out slots so that no two live frames share one; the in-flight
//! throttle does exactly that. A frame whose demand, padding included, exceeds `B` is a
//! [`CapacityError`].

use crate::math::{align_down, align_up, lcm};
use crate::renderer::api::scene_constants::CONSTANT_NATURAL_ALIGNMENT;
use crate::renderer::error::CapacityError;

/// The byte range a closed frame occupied, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    /// Offset of the frame's first byte.
    pub start: u64,
    /// One past the end of the frame's last allocation.
    pub end: u64,
}

impl FrameRange {
    /// Number of bytes the frame used, padding included.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the frame allocated nothing.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Whether two ranges share at least one byte.
    pub fn overlaps(&self, other: &FrameRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameScope {
    start: u64,
    end: u64,
}

/// A cursor-based ring allocator over a fixed-capacity constant buffer.
#[derive(Debug)]
pub struct FrameConstantAllocator {
    capacity: u64,
    frames_in_flight: u64,
    min_alignment: u64,
    budget: u64,
    cursor: u64,
    frame: Option<FrameScope>,
    wrap_count: u64,
}

impl FrameConstantAllocator {
    /// Creates an allocator over `capacity` bytes shared by `frames_in_flight` frames.
    ///
    /// `min_alignment` is the hardware minimum offset alignment.
    ///
    /// # Errors
    /// Returns a [`CapacityError`] when the capacity cannot hold one aligned constant
    /// block per frame in flight.
    pub fn new(
        capacity: u64,
        frames_in_flight: usize,
        min_alignment: u64,
    ) -> Result<Self, CapacityError> {
        let min_alignment = min_alignment.max(1);
        let frames = frames_in_flight.max(1) as u64;
        let slot_alignment = lcm(CONSTANT_NATURAL_ALIGNMENT, min_alignment);
        let budget = align_down(capacity / frames, slot_alignment);
        if budget == 0 {
            return Err(CapacityError {
                requested: slot_alignment,
                budget,
            });
        }
        Ok(Self {
            capacity,
            frames_in_flight: frames,
            min_alignment,
            budget,
            cursor: 0,
            frame: None,
            wrap_count: 0,
        })
    }

    /// The total capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// The per-frame budget in bytes.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// The number of frames sharing the buffer.
    pub fn frames_in_flight(&self) -> u64 {
        self.frames_in_flight
    }

    /// The current cursor position.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// How many times the cursor wrapped back to zero.
    pub fn wrap_count(&self) -> u64 {
        self.wrap_count
    }

    /// The alignment actually applied for a caller's natural alignment.
    pub fn effective_alignment(&self, natural_alignment: u64) -> u64 {
        lcm(natural_alignment.max(1), self.min_alignment)
    }

    /// Whether a frame is currently open.
    pub fn in_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Opens a frame scope in `slot` (taken modulo the frame count) and returns its
    /// start offset, `slot * budget`.
    ///
    /// The slot must not be held by another frame that is still in flight.
    pub fn begin_frame(&mut self, slot: usize) -> u64 {
        if let Some(open) = self.frame.take() {
            log::warn!(
                "FrameConstantAllocator: frame starting at {} was never closed",
                open.start
            );
        }
        let start = (slot as u64 % self.frames_in_flight) * self.budget;
        if start < self.cursor {
            self.wrap_count += 1;
            log::debug!("FrameConstantAllocator: cursor moved back to slot {slot} at {start}");
        }
        self.cursor = start;
        self.frame = Some(FrameScope { start, end: start });
        start
    }

    /// Allocates `size` bytes aligned to `lcm(natural_alignment, min_alignment)` and
    /// returns the offset.
    ///
    /// Outside of a frame scope this is the plain ring contract: if the aligned range
    /// would exceed the capacity, the cursor resets to zero.
    ///
    /// # Errors
    /// Inside a frame scope, returns a [`CapacityError`] if the frame's usage would
    /// exceed the per-frame budget. The cursor is left untouched in that case.
    pub fn allocate(&mut self, size: u64, natural_alignment: u64) -> Result<u64, CapacityError> {
        let alignment = self.effective_alignment(natural_alignment);
        let mut offset = align_up(self.cursor, alignment);
        let wrapped = offset + size > self.capacity;
        if wrapped {
            offset = 0;
        }

        if let Some(scope) = self.frame.as_mut() {
            if wrapped {
                return Err(CapacityError {
                    requested: (self.capacity - scope.start) + size,
                    budget: self.budget,
                });
            }
            let used = offset + size - scope.start;
            if used > self.budget {
                return Err(CapacityError {
                    requested: used,
                    budget: self.budget,
                });
            }
            scope.end = offset + size;
        } else if wrapped {
            self.wrap_count += 1;
            log::debug!("FrameConstantAllocator: wrapped to offset 0");
        }

        log::trace!("FrameConstantAllocator: {size} bytes at offset {offset}");
        self.cursor = offset + size;
        Ok(offset)
    }

    /// Bytes used by the open frame so far, or zero outside of a frame.
    pub fn frame_usage(&self) -> u64 {
        self.frame.map(|s| s.end - s.start).unwrap_or(0)
    }

    /// Start offset of the open frame, if any.
    pub fn frame_start(&self) -> Option<u64> {
        self.frame.map(|s| s.start)
    }

    /// Closes the frame scope and returns the range it occupied.
    pub fn end_frame(&mut self) -> Option<FrameRange> {
        self.frame.take().map(|s| FrameRange {
            start: s.start,
            end: s.end,
        })
    }

    /// Closes the frame scope and rolls the cursor back to its start.
    pub fn abort_frame(&mut self) {
        if let Some(scope) = self.frame.take() {
            self.cursor = scope.start;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn new_rejects_capacity_smaller_than_one_slot_per_frame() {
        let err = FrameConstantAllocator::new(512, 3, 256).unwrap_err();
        assert_eq!(err.budget, 0);
        assert_eq!(err.requested, 256);
    }

    #[test]
    fn budget_is_aligned_down_share_of_capacity() {
        let alloc = FrameConstantAllocator::new(10_000, 3, 256).unwrap();
        assert_eq!(alloc.budget(), 3328);
    }

    #[test]
    fn allocate_aligns_to_lcm_of_natural_and_hardware_alignment() {
        let mut alloc = FrameConstantAllocator::new(1 << 16, 3, 256).unwrap();
        assert_eq!(alloc.allocate(10, 16).unwrap(), 0);
        assert_eq!(alloc.allocate(10, 16).unwrap(), 256);
        // lcm(48, 256) = 768
        assert_eq!(alloc.allocate(10, 48).unwrap(), 768);
        assert_eq!(alloc.cursor(), 778);
    }

    #[test]
    fn allocate_resets_to_zero_when_aligned_write_would_exceed_capacity() {
        let mut alloc = FrameConstantAllocator::new(1024, 1, 256).unwrap();
        assert_eq!(alloc.allocate(600, 16).unwrap(), 0);
        assert_eq!(alloc.allocate(300, 16).unwrap(), 0);
        assert_eq!(alloc.wrap_count(), 1);
        assert_eq!(alloc.cursor(), 300);
    }

    #[test]
    fn frames_start_on_budget_slots() {
        let mut alloc = FrameConstantAllocator::new(3 * 1024, 3, 256).unwrap();
        assert_eq!(alloc.begin_frame(0), 0);
        alloc.allocate(100, 16).unwrap();
        assert_eq!(alloc.end_frame(), Some(FrameRange { start: 0, end: 100 }));

        assert_eq!(alloc.begin_frame(1), 1024);
        alloc.allocate(1024, 16).unwrap();
        alloc.end_frame();

        assert_eq!(alloc.begin_frame(2), 2048);
        alloc.allocate(1, 16).unwrap();
        alloc.end_frame();

        assert_eq!(alloc.begin_frame(0), 0);
        assert_eq!(alloc.wrap_count(), 1);
        alloc.end_frame();
        assert_eq!(alloc.begin_frame(4), 1024);
    }

    #[test]
    fn uneven_frames_do_not_overlap_across_wraparound() {
        // A plain cursor ring would place the fourth frame over the second one here.
        let mut alloc = FrameConstantAllocator::new(288, 3, 1).unwrap();
        assert_eq!(alloc.budget(), 96);
        let mut ranges = Vec::new();
        for (slot, size) in [48, 96, 96, 60].into_iter().enumerate() {
            alloc.begin_frame(slot);
            alloc.allocate(size, 1).unwrap();
            ranges.push(alloc.end_frame().unwrap());
        }
        assert_eq!(ranges[3], FrameRange { start: 0, end: 60 });
        for live in &ranges[1..3] {
            assert!(!ranges[3].overlaps(live));
        }
    }

    #[test]
    fn exceeding_the_budget_is_a_capacity_error_and_keeps_the_cursor() {
        let mut alloc = FrameConstantAllocator::new(3 * 1024, 3, 256).unwrap();
        alloc.begin_frame(0);
        alloc.allocate(512, 16).unwrap();
        let cursor = alloc.cursor();
        let err = alloc.allocate(600, 16).unwrap_err();
        assert_eq!(err.budget, 1024);
        assert_eq!(err.requested, 512 + 600);
        assert_eq!(alloc.cursor(), cursor);
    }

    #[test]
    fn padding_counts_towards_the_budget() {
        let mut alloc = FrameConstantAllocator::new(3 * 1024, 3, 256).unwrap();
        alloc.begin_frame(0);
        alloc.allocate(1, 16).unwrap();
        alloc.allocate(1, 16).unwrap();
        alloc.allocate(1, 16).unwrap();
        alloc.allocate(1, 16).unwrap();
        // Four one-byte allocations occupy four 256-byte slots; a fifth does not fit.
        assert!(alloc.allocate(1, 16).is_err());
    }

    #[test]
    fn abort_rolls_back_to_frame_start() {
        let mut alloc = FrameConstantAllocator::new(3 * 1024, 3, 256).unwrap();
        alloc.begin_frame(0);
        alloc.allocate(64, 16).unwrap();
        alloc.end_frame();
        let start = alloc.begin_frame(1);
        alloc.allocate(64, 16).unwrap();
        alloc.abort_frame();
        assert_eq!(alloc.cursor(), start);
        assert!(!alloc.in_frame());
    }

    #[test]
    fn newest_frame_retiring_first_frees_only_its_own_slot() {
        let mut alloc = FrameConstantAllocator::new(2 * 1024, 2, 256).unwrap();
        alloc.begin_frame(0);
        alloc.allocate(800, 16).unwrap();
        let oldest = alloc.end_frame().unwrap();
        alloc.begin_frame(1);
        alloc.allocate(800, 16).unwrap();
        let newest = alloc.end_frame().unwrap();

        // The newest frame completed; its slot is the free one, the oldest stays live.
        alloc.begin_frame(1);
        alloc.allocate(800, 16).unwrap();
        let next = alloc.end_frame().unwrap();
        assert_eq!(next, newest);
        assert!(!next.overlaps(&oldest));
    }

    /// Drives frames of random size (never more than the budget) that retire in random
    /// order, and checks that the ranges of frames still in flight never overlap.
    #[test]
    fn fuzz_live_frames_never_overlap() {
        let mut rng = StdRng::seed_from_u64(0x6b69_6e65_6d61);
        for _ in 0..64 {
            let frames_in_flight = rng.gen_range(1..=4usize);
            let min_alignment = [1u64, 64, 256][rng.gen_range(0..3)];
            let capacity = rng.gen_range(4_096..65_536u64);
            let mut alloc =
                FrameConstantAllocator::new(capacity, frames_in_flight, min_alignment).unwrap();
            let budget = alloc.budget();
            // (slot, range) of every frame still in flight.
            let mut live: Vec<(usize, FrameRange)> = Vec::new();

            for _ in 0..500 {
                if live.len() == frames_in_flight {
                    live.swap_remove(rng.gen_range(0..live.len()));
                }
                let slot = (0..frames_in_flight)
                    .find(|s| live.iter().all(|(taken, _)| taken != s))
                    .unwrap();
                alloc.begin_frame(slot);
                let allocations = rng.gen_range(0..12);
                for _ in 0..allocations {
                    let natural = [16u64, 48, 64][rng.gen_range(0..3)];
                    let size = rng.gen_range(0..=budget / 4);
                    let start = alloc.frame_start().unwrap();
                    let aligned =
                        align_up(alloc.cursor(), alloc.effective_alignment(natural));
                    if aligned + size - start > budget {
                        break;
                    }
                    let offset = alloc
                        .allocate(size, natural)
                        .expect("demand within budget must fit");
                    assert_eq!(offset % alloc.effective_alignment(natural), 0);
                    assert!(offset + size <= capacity);
                }
                let range = alloc.end_frame().unwrap();
                assert!(range.len() <= budget);
                for (_, other) in &live {
                    assert!(
                        !range.overlaps(other),
                        "frame {range:?} overlaps live frame {other:?}"
                    );
                }
                live.push((slot, range));
            }
        }
    }
}

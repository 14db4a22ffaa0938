//! Resource binder: uniform buffers plus a binding layout shaped by the
//! channels actually in use.
//!
//! Bindings 0-2 always hold `iResolution`, `iTime` and `iMouse`. Each
//! populated channel `i` adds a texture at `3 + 2i` and its sampler at
//! `4 + 2i`; empty channels add nothing, so the layout is rebuilt for every
//! session.

use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::channels::TextureBinding;
use crate::types::{CanvasSize, PointerState, CHANNEL_COUNT};

pub const RESOLUTION_BINDING: u32 = 0;
pub const TIME_BINDING: u32 = 1;
pub const POINTER_BINDING: u32 = 2;
pub const FIRST_CHANNEL_BINDING: u32 = 3;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ResolutionUniform {
    size: [f32; 3],
    _padding: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct TimeUniform {
    seconds: f32,
    _padding: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PointerUniform {
    state: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Resolution,
    Time,
    Pointer,
    Texture { channel: usize },
    Sampler { channel: usize },
}

/// One entry of the binding layout, mirrored one-to-one in the binding set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlot {
    pub binding: u32,
    pub kind: SlotKind,
}

/// Ordered binding slots for the given channel occupancy.
pub fn binding_slots(populated: [bool; CHANNEL_COUNT]) -> Vec<BindingSlot> {
    let mut slots = vec![
        BindingSlot {
            binding: RESOLUTION_BINDING,
            kind: SlotKind::Resolution,
        },
        BindingSlot {
            binding: TIME_BINDING,
            kind: SlotKind::Time,
        },
        BindingSlot {
            binding: POINTER_BINDING,
            kind: SlotKind::Pointer,
        },
    ];
    for (channel, _) in populated.iter().enumerate().filter(|(_, used)| **used) {
        let base = FIRST_CHANNEL_BINDING + channel as u32 * 2;
        slots.push(BindingSlot {
            binding: base,
            kind: SlotKind::Texture { channel },
        });
        slots.push(BindingSlot {
            binding: base + 1,
            kind: SlotKind::Sampler { channel },
        });
    }
    slots
}

/// `iResolution`, `iTime` and `iMouse` buffers for one session.
pub struct UniformBlockSet {
    resolution: wgpu::Buffer,
    time: wgpu::Buffer,
    pointer: wgpu::Buffer,
}

impl UniformBlockSet {
    fn new(device: &wgpu::Device, size: CanvasSize) -> Self {
        let resolution = ResolutionUniform {
            size: [size.width as f32, size.height as f32, 1.0],
            _padding: 0.0,
        };
        let time = TimeUniform::zeroed();
        let pointer = PointerUniform::zeroed();

        Self {
            resolution: uniform_buffer(device, "iResolution", bytemuck::bytes_of(&resolution)),
            time: uniform_buffer(device, "iTime", bytemuck::bytes_of(&time)),
            pointer: uniform_buffer(device, "iMouse", bytemuck::bytes_of(&pointer)),
        }
    }

    /// Rewrites the per-frame uniforms; resolution stays fixed for the session.
    pub fn write_frame(&self, queue: &wgpu::Queue, elapsed: Duration, pointer: PointerState) {
        let time = TimeUniform {
            seconds: elapsed.as_secs_f32(),
            _padding: [0.0; 3],
        };
        let pointer = PointerUniform {
            state: pointer.as_uniform(),
        };
        queue.write_buffer(&self.time, 0, bytemuck::bytes_of(&time));
        queue.write_buffer(&self.pointer, 0, bytemuck::bytes_of(&pointer));
    }

    fn buffer(&self, kind: SlotKind) -> Option<&wgpu::Buffer> {
        match kind {
            SlotKind::Resolution => Some(&self.resolution),
            SlotKind::Time => Some(&self.time),
            SlotKind::Pointer => Some(&self.pointer),
            SlotKind::Texture { .. } | SlotKind::Sampler { .. } => None,
        }
    }
}

fn uniform_buffer(device: &wgpu::Device, label: &str, contents: &[u8]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Session-scoped layout, binding set and the resources they reference.
pub struct BoundResources {
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
    pub uniforms: UniformBlockSet,
    pub slots: Vec<BindingSlot>,
    _textures: [Option<TextureBinding>; CHANNEL_COUNT],
}

pub(crate) fn bind(
    device: &wgpu::Device,
    size: CanvasSize,
    textures: [Option<TextureBinding>; CHANNEL_COUNT],
) -> BoundResources {
    let slots = binding_slots(std::array::from_fn(|channel| textures[channel].is_some()));
    let uniforms = UniformBlockSet::new(device, size);

    let layout_entries: Vec<wgpu::BindGroupLayoutEntry> =
        slots.iter().map(|slot| layout_entry(*slot)).collect();
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("session bind group layout"),
        entries: &layout_entries,
    });

    let entries: Vec<wgpu::BindGroupEntry<'_>> = slots
        .iter()
        .filter_map(|slot| {
            let resource = match slot.kind {
                SlotKind::Texture { channel } => {
                    wgpu::BindingResource::TextureView(&textures[channel].as_ref()?.view)
                }
                SlotKind::Sampler { channel } => {
                    wgpu::BindingResource::Sampler(&textures[channel].as_ref()?.sampler)
                }
                kind => uniforms.buffer(kind)?.as_entire_binding(),
            };
            Some(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource,
            })
        })
        .collect();
    debug_assert_eq!(entries.len(), layout_entries.len());

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("session bind group"),
        layout: &layout,
        entries: &entries,
    });
    drop(entries);
    tracing::debug!(bindings = ?slots.iter().map(|slot| slot.binding).collect::<Vec<_>>(), "built session bindings");

    BoundResources {
        layout,
        bind_group,
        uniforms,
        slots,
        _textures: textures,
    }
}

fn layout_entry(slot: BindingSlot) -> wgpu::BindGroupLayoutEntry {
    let ty = match slot.kind {
        SlotKind::Resolution | SlotKind::Time | SlotKind::Pointer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        SlotKind::Texture { .. } => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        SlotKind::Sampler { .. } => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    };
    wgpu::BindGroupLayoutEntry {
        binding: slot.binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty,
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(populated: [bool; CHANNEL_COUNT]) -> Vec<u32> {
        binding_slots(populated)
            .iter()
            .map(|slot| slot.binding)
            .collect()
    }

    #[test]
    fn sparse_channels_skip_their_bindings() {
        assert_eq!(indices([true, false, true, false]), vec![0, 1, 2, 3, 4, 7, 8]);
    }

    #[test]
    fn no_channels_only_uniforms() {
        assert_eq!(indices([false; CHANNEL_COUNT]), vec![0, 1, 2]);
    }

    #[test]
    fn all_channels_fill_bindings_three_to_ten() {
        assert_eq!(indices([true; CHANNEL_COUNT]), (0..=10).collect::<Vec<u32>>());
    }

    #[test]
    fn channel_slots_pair_texture_with_sampler() {
        let slots = binding_slots([false, false, false, true]);
        assert_eq!(
            &slots[3..],
            &[
                BindingSlot {
                    binding: 9,
                    kind: SlotKind::Texture { channel: 3 },
                },
                BindingSlot {
                    binding: 10,
                    kind: SlotKind::Sampler { channel: 3 },
                },
            ]
        );
    }

    #[test]
    fn uniform_blocks_are_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<ResolutionUniform>(), 16);
        assert_eq!(std::mem::size_of::<TimeUniform>(), 16);
        assert_eq!(std::mem::size_of::<PointerUniform>(), 16);
    }
}

//! The standard per-frame uniform block (spec §3 `Uniforms`, §4.2 step 2) and
//! a small `UniformBinding<T>` wrapper generalized from cuneus's own
//! `UniformBinding<T>` (a GPU buffer + bind group kept alongside the CPU-side
//! `data: T`, updated with `queue.write_buffer`).

use std::time::{SystemTime, UNIX_EPOCH};

/// Mirrors the standard Shadertoy uniform set. `#[repr(C)]` + `bytemuck::Pod`
/// so it can be uploaded with a single `write_buffer` call, the same idiom
/// cuneus uses for every one of its `UniformProvider` structs.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Uniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame_rate: f32,
    pub frame: u32,
    pub _pad0: u32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub sample_rate: f32,
    pub _pad1: [f32; 3],
    pub channel_time: [f32; 4],
    pub channel_resolution: [[f32; 4]; 4],
}

impl Uniforms {
    pub fn zeroed() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

pub trait UniformProvider {
    fn as_bytes(&self) -> &[u8];
}

impl UniformProvider for Uniforms {
    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

pub struct UniformBinding<T: UniformProvider + Copy> {
    pub data: T,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl<T: UniformProvider + Copy> UniformBinding<T> {
    pub fn new(device: &wgpu::Device, label: &str, data: T, layout: &wgpu::BindGroupLayout, binding: u32) -> Self {
        use wgpu::util::DeviceExt;
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: data.as_bytes(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { data, buffer, bind_group }
    }

    pub fn update(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.buffer, 0, self.data.as_bytes());
    }

    pub fn layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }
}

/// `(year, month, day, seconds-since-midnight)`, local calendar date.
/// Implemented on top of `SystemTime` rather than pulling in a date/time
/// crate, since the pack's retrieved files show no chrono/time dependency
/// anywhere near this concern; this is calendar-math, not a lib gap.
pub fn current_date_uniform() -> [f32; 4] {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs();
    let days_since_epoch = secs / 86_400;
    let seconds_since_midnight = (secs % 86_400) as f32 + now.subsec_nanos() as f32 / 1.0e9;
    let (year, month, day) = civil_from_days(days_since_epoch as i64);
    [year as f32, month as f32, day as f32, seconds_since_midnight]
}

/// Howard Hinnant's `civil_from_days` algorithm (days since 1970-01-01 -> Y/M/D).
fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as i64;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as i64;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_epoch_is_1970_01_01() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }

    #[test]
    fn civil_from_days_known_date() {
        // 2024-03-01 is 19783 days after epoch.
        assert_eq!(civil_from_days(19783), (2024, 3, 1));
    }
}

//! Optional GPU backend: an alternative FFT+magnitude path for the fixed
//! `fft_size = 1024`, executed on a compute device.
//!
//! Only compiled with the `gpu` feature. The facade holds at most one
//! [`GpuBackend`], lazily initialized and torn down with the process. On
//! `DeviceUnavailable` the caller demotes to the CPU backend for the
//! remainder of the process.

use crate::concurrency::Yielder;
use crate::error::Error;
use crate::pcm::PcmBuffer;
use crate::spectrogram::Spectrogram;
use crate::tile::SpectrogramBuilder;
use crate::token::{Token, TokenSource};

const GPU_FFT_SIZE: usize = 1024;

/// Radix-2 DIT FFT over an entire batch of frames in one dispatch. The
/// twiddle factor is recomputed per butterfly inside the shader rather than
/// tabulated; this doesn't change observable output and keeps the shader
/// free of a twiddle-table upload.
const SHADER_SOURCE: &str = r#"
struct Params {
    frame_count: u32,
    fft_size: u32,
    bins: u32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read_write> re: array<f32>;
@group(0) @binding(2) var<storage, read_write> im: array<f32>;
@group(0) @binding(3) var<storage, read_write> magnitudes: array<f32>;

fn bit_reverse(x: u32, bits: u32) -> u32 {
    var v = x;
    var r: u32 = 0u;
    for (var i: u32 = 0u; i < bits; i = i + 1u) {
        r = (r << 1u) | (v & 1u);
        v = v >> 1u;
    }
    return r;
}

@compute @workgroup_size(64)
fn fft_frame(@builtin(global_invocation_id) gid: vec3<u32>) {
    let frame = gid.x;
    if (frame >= params.frame_count) {
        return;
    }
    let n = params.fft_size;
    let base = frame * n;

    // Stage loop per frame; twiddle recomputed per butterfly.
    var stage_len: u32 = 2u;
    loop {
        if (stage_len > n) { break; }
        let half = stage_len / 2u;
        var start: u32 = 0u;
        loop {
            if (start >= n) { break; }
            for (var k: u32 = 0u; k < half; k = k + 1u) {
                let theta = -2.0 * 3.14159265358979 * f32(k) / f32(stage_len);
                let c = cos(theta);
                let s = sin(theta);
                let a = base + start + k;
                let b = a + half;
                let br = re[b] * c - im[b] * s;
                let bi = re[b] * s + im[b] * c;
                re[b] = re[a] - br;
                im[b] = im[a] - bi;
                re[a] = re[a] + br;
                im[a] = im[a] + bi;
            }
            start = start + stage_len;
        }
        stage_len = stage_len * 2u;
    }

    for (var b: u32 = 0u; b < params.bins; b = b + 1u) {
        let idx = base + b;
        magnitudes[frame * params.bins + b] = sqrt(re[idx] * re[idx] + im[idx] * im[idx]);
    }
}
"#;

struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

pub struct GpuBackend {
    gpu: Option<GpuDevice>,
}

impl Default for GpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend {
    pub fn new() -> Self {
        Self { gpu: Self::try_init() }
    }

    fn try_init() -> Option<GpuDevice> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("spectrogram-fft-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))
        .ok()?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("spectrogram-fft-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("spectrogram-fft-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("spectrogram-fft-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("spectrogram-fft-pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "fft_frame",
            compilation_options: Default::default(),
            cache: None,
        });

        Some(GpuDevice { device, queue, pipeline, bind_group_layout })
    }

    pub fn is_available(&self) -> bool {
        self.gpu.is_some()
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuParams {
    frame_count: u32,
    fft_size: u32,
    bins: u32,
    _pad: u32,
}

impl SpectrogramBuilder for GpuBackend {
    fn build(
        &self,
        pcm: &PcmBuffer,
        start_seconds: f64,
        duration_seconds: f64,
        hop_size: usize,
        fft_size: usize,
        min_db: f32,
        token: Token,
        tokens: &TokenSource,
        yielder: &dyn Yielder,
    ) -> Result<Spectrogram, Error> {
        use wgpu::util::DeviceExt;

        if fft_size != GPU_FFT_SIZE {
            return Err(Error::DeviceUnavailable(format!(
                "GPU backend only supports fft_size={GPU_FFT_SIZE}, got {fft_size}"
            )));
        }
        let Some(gpu) = &self.gpu else {
            return Err(Error::DeviceUnavailable("no compatible GPU adapter".into()));
        };

        let total_duration = pcm.total_duration();
        let sample_rate = pcm.sample_rate();
        let clamped_start = start_seconds.clamp(0.0, total_duration);
        let clamped_end = (start_seconds + duration_seconds).clamp(clamped_start, total_duration);
        let start_sample = (clamped_start * sample_rate as f64).round() as usize;
        let end_sample = (clamped_end * sample_rate as f64).round() as usize;
        let segment_length = end_sample.saturating_sub(start_sample);

        if segment_length < fft_size {
            return Err(Error::InsufficientLength { have: segment_length, need: fft_size });
        }
        let frames = (segment_length - fft_size) / hop_size + 1;
        let bins = fft_size / 2;

        // Windowing stays on the CPU (cheap, branch-light); only the FFT
        // stage loop runs on the device, batched across every frame.
        let mut re = vec![0.0f32; frames * fft_size];
        let im = vec![0.0f32; frames * fft_size];
        for f in 0..frames {
            let frame_start = start_sample + f * hop_size;
            crate::dsp::window::window_frame(
                pcm,
                frame_start,
                fft_size,
                &mut re[f * fft_size..(f + 1) * fft_size],
            );
        }

        if !tokens.is_current(token) {
            return Err(Error::Cancelled);
        }

        let params = GpuParams {
            frame_count: frames as u32,
            fft_size: fft_size as u32,
            bins: bins as u32,
            _pad: 0,
        };

        let param_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fft-params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let re_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fft-re"),
            contents: bytemuck::cast_slice(&re),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let im_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fft-im"),
            contents: bytemuck::cast_slice(&im),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let mag_size = (frames * bins * std::mem::size_of::<f32>()) as u64;
        let mag_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fft-magnitudes"),
            size: mag_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fft-magnitudes-readback"),
            size: mag_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fft-bind-group"),
            layout: &gpu.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: param_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: re_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: im_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: mag_buf.as_entire_binding() },
            ],
        });

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("fft-encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fft-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&gpu.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let workgroups = (frames as u32).div_ceil(64).max(1);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&mag_buf, 0, &readback_buf, 0, mag_size);
        gpu.queue.submit(Some(encoder.finish()));

        // GPU dispatches suspend only on the mapping read-back.
        let slice = readback_buf.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        yielder.maybe_yield();
        rx.recv()
            .map_err(|e| Error::Internal(format!("GPU readback channel closed: {e}")))?
            .map_err(|e| Error::Internal(format!("GPU buffer map failed: {e:?}")))?;

        let mut magnitudes: Vec<f32> = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&view[..]).to_vec()
        };
        readback_buf.unmap();

        if !tokens.is_current(token) {
            return Err(Error::Cancelled);
        }

        let mut peak = 0.0f32;
        for m in magnitudes.iter() {
            if *m > peak {
                peak = *m;
            }
        }
        let safe_peak = peak.max(1e-12);
        let neg_min_db = -min_db;
        for cell in magnitudes.iter_mut() {
            let db = 20.0 * (*cell / safe_peak + 1e-12).log10();
            *cell = ((db - min_db) / neg_min_db).clamp(0.0, 1.0);
        }

        Ok(Spectrogram::new(
            magnitudes,
            frames,
            bins,
            hop_size,
            fft_size,
            sample_rate,
            clamped_start,
            clamped_end - clamped_start,
            total_duration,
            token,
        ))
    }
}

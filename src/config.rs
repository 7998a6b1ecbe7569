//! Single configuration record for every tunable of the core.
//!
//! Constructed once and passed to [`crate::facade::Core::new`]; nothing here
//! mutates post-start (dynamic reconfiguration isn't supported). Changing any field
//! invalidates cached tiles, so the facade does not expose setters for it.

use serde::{Deserialize, Serialize};

/// One stop of the renderer's magnitude-to-color lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LutStop {
    pub position: f32,
    pub rgb: [u8; 3],
}

/// The default six-stop gradient.
pub const DEFAULT_LUT_STOPS: [LutStop; 6] = [
    LutStop { position: 0.00, rgb: [5, 8, 17] },
    LutStop { position: 0.25, rgb: [32, 54, 120] },
    LutStop { position: 0.50, rgb: [69, 137, 205] },
    LutStop { position: 0.70, rgb: [255, 209, 102] },
    LutStop { position: 0.85, rgb: [255, 128, 96] },
    LutStop { position: 1.00, rgb: [255, 255, 255] },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Fixed power-of-two FFT length used for both full-track and hi-res
    /// analysis. Defaults to 1024.
    pub fft_size: usize,
    /// `baseSPP` — samples-per-pixel at zoom factor 1.
    pub base_samples_per_pixel: f64,
    /// Floor of the dB normalization range; everything below clamps to 0.
    pub min_db: f32,
    /// Tile-request debounce, in milliseconds.
    pub debounce_ms: f64,
    /// Snap-to-unity tolerance for the bi-log zoom mapping.
    pub snap_range: f64,
    /// Number of discrete slider steps in the bi-log zoom mapping.
    pub zoom_steps: u32,
    /// Minimum zoom factor (slider position 0).
    pub zoom_min_factor: f64,
    /// Maximum zoom factor (slider position `zoom_steps`).
    pub zoom_max_factor: f64,
    /// Color stops for the renderer's 256-entry LUT.
    pub lut_stops: Vec<LutStop>,
    /// Whether the GPU backend should be attempted when available.
    pub prefer_gpu: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            base_samples_per_pixel: 2048.0,
            min_db: -85.0,
            debounce_ms: 120.0,
            snap_range: 0.1,
            zoom_steps: 200,
            zoom_min_factor: 0.125,
            zoom_max_factor: 256.0,
            lut_stops: DEFAULT_LUT_STOPS.to_vec(),
            prefer_gpu: false,
        }
    }
}

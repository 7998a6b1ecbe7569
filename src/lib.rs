//! Spectrogram analysis and view-synchronization core.
//!
//! Turns decoded PCM into a time-frequency image and keeps it consistent
//! with a scrolling/zoomed view during pan, zoom, seek, and playback. See
//! [`facade::Core`] for the external entry point.

pub mod concurrency;
pub mod config;
pub mod dsp;
pub mod error;
pub mod facade;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod pcm;
pub mod playhead;
pub mod render;
pub mod spectrogram;
pub mod tile;
pub mod token;
pub mod view;

pub use config::Config;
pub use error::Error;
pub use facade::Core;
pub use pcm::PcmBuffer;
pub use spectrogram::Spectrogram;
pub use view::View;

pub mod colormap;
pub mod renderer;

pub use colormap::Lut;
pub use renderer::render;

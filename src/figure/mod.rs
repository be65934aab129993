//! Figure rendering with plotters.

pub mod renderer;

pub use renderer::render_figure;

//! wgpu backends.
//!
//! - `context` owns instance/adapter/device wiring for either flavor and
//!   presents to a window or reads back into the shared canvas.
//! - `pipeline` links prepared GLSL into render pipelines against the shared
//!   bind group layouts.
//! - `textures`, `mesh` and `uniforms` hold the GPU-side data types.
//! - `renderer` glues them into the backend logic both flavors share.
//! - `compute` carries the modern-only float target and feedback buffer.

mod compute;
mod context;
mod legacy;
mod mesh;
mod modern;
mod pipeline;
mod readback;
mod renderer;
mod textures;
mod uniforms;

pub use compute::{ComputeTexture, FeedbackBuffer};
pub use legacy::LegacyBackend;
pub use modern::ModernBackend;

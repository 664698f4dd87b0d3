//! Renderer crate for shaderslide.
//!
//! A [`Carousel`] shows a list of images and animates between them with
//! transition effects from the `effects` crate. Drawing goes through one of
//! three interchangeable backends chosen once at start-up:
//!
//! ```text
//!   host (winit window / headless export)
//!          │ tick(), next(), resize() ...
//!          ▼
//!   Carousel ──▶ Playback (state machine)
//!      │
//!      ├─▶ ImageLoader ──▶ LoadedImage (decoded RGBA, placeholder on failure)
//!      │
//!      └─▶ RenderBackend ──┬─ ModernBackend  (wgpu, primary APIs, meshes)
//!                          ├─ LegacyBackend  (wgpu GL, WebGL2 limits)
//!                          └─ RasterBackend  (CPU compositing)
//! ```
//!
//! Effect shaders are written in a small GLSL dialect; `compile` upgrades
//! and wraps them for wgpu's GLSL front end. Lifecycle notifications are
//! published on crossbeam channels obtained from [`Carousel::subscribe`].

mod backend;
mod carousel;
mod clock;
mod compile;
mod error;
mod events;
pub mod fit;
mod gpu;
pub mod loader;
mod raster;
mod surface;
mod timeline;
mod types;
mod window;

pub use backend::{
    default_backend, BackendCapabilities, BackendFactory, BackendStats, ContextSignal,
    FrameRequest, RenderBackend, ShaderProgram,
};
pub use carousel::{Carousel, CarouselBuilder};
pub use clock::{BoxedClock, Clock, ManualClock, SystemClock};
pub use compile::check_effect;
pub use error::{CarouselError, Result};
pub use events::CarouselEvent;
pub use gpu::{ComputeTexture, FeedbackBuffer, LegacyBackend, ModernBackend};
pub use loader::{DecodingLoader, ImageLoader, LoadError, MemoryLoader};
pub use playback::Rejected;
pub use raster::RasterBackend;
pub use surface::{Canvas, DrawSurface, PresentTarget};
pub use timeline::{Easing, FrameProgress};
pub use types::{
    BackendKind, BackendPreference, CarouselOptions, LoadedImage, TextureHandle,
};
pub use window::{run_window, WindowConfig};

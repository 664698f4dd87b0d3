use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Anything a GPU backend can present to.
pub trait PresentTarget: HasWindowHandle + HasDisplayHandle {}

impl<T: HasWindowHandle + HasDisplayHandle> PresentTarget for T {}

/// CPU-side framebuffer shared between a surface and whichever backend draws
/// into it. The raster backend composites here; GPU backends read back into
/// it when they render offscreen.
#[derive(Clone)]
pub struct Canvas(Rc<RefCell<RgbaImage>>);

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self(Rc::new(RefCell::new(RgbaImage::new(width.max(1), height.max(1)))))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.borrow().dimensions()
    }

    /// Copy of the current pixels.
    pub fn snapshot(&self) -> RgbaImage {
        self.0.borrow().clone()
    }

    pub fn with_pixels_mut<R>(&self, f: impl FnOnce(&mut RgbaImage) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    pub(crate) fn resize(&self, width: u32, height: u32) {
        let mut pixels = self.0.borrow_mut();
        if pixels.dimensions() != (width.max(1), height.max(1)) {
            *pixels = RgbaImage::new(width.max(1), height.max(1));
        }
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("Canvas")
            .field("width", &width)
            .field("height", &height)
            .finish()
    }
}

/// The drawing surface handed to backends on initialisation.
///
/// A surface always owns a `Canvas`. A window-backed surface additionally
/// carries a present target that GPU backends render to directly.
#[derive(Clone)]
pub struct DrawSurface {
    width: u32,
    height: u32,
    canvas: Canvas,
    target: Option<Arc<dyn PresentTarget>>,
}

impl DrawSurface {
    /// Surface with no window: GPU backends render offscreen and read back.
    pub fn offscreen(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            canvas: Canvas::new(width, height),
            target: None,
        }
    }

    pub fn with_target(target: Arc<dyn PresentTarget>, width: u32, height: u32) -> Self {
        Self {
            target: Some(target),
            ..Self::offscreen(width, height)
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn target(&self) -> Option<&Arc<dyn PresentTarget>> {
        self.target.as_ref()
    }

    pub(crate) fn set_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.canvas.resize(self.width, self.height);
    }
}

impl fmt::Debug for DrawSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("windowed", &self.target.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_is_shared_between_clones() {
        let surface = DrawSurface::offscreen(4, 2);
        let clone = surface.clone();
        clone.canvas().with_pixels_mut(|pixels| {
            pixels.put_pixel(1, 1, image::Rgba([1, 2, 3, 4]));
        });
        assert_eq!(surface.canvas().snapshot().get_pixel(1, 1).0, [1, 2, 3, 4]);
    }

    #[test]
    fn resizing_reallocates_canvas() {
        let mut surface = DrawSurface::offscreen(4, 2);
        surface.set_size(0, 3);
        assert_eq!(surface.size(), (1, 3));
        assert_eq!(surface.canvas().dimensions(), (1, 3));
    }
}

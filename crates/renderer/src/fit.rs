//! Aspect-preserving placement shared by every backend.
//!
//! GPU backends crop with `cover_uv_scale` (mirrored in the shader prelude as
//! `coverUv`); the raster backend letterboxes with `contain_rect`.

/// Draw rectangle in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DestRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DestRect {
    /// Integer placement used when compositing: (x, y, width, height).
    pub fn to_pixels(self) -> (i64, i64, u32, u32) {
        (
            self.x.round() as i64,
            self.y.round() as i64,
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

fn aspect(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}

/// UV scale that makes an image fill the canvas, cropping the longer axis.
/// Sampling uses `(uv - 0.5) * scale + 0.5`.
pub fn cover_uv_scale(image: (u32, u32), canvas: (u32, u32)) -> [f32; 2] {
    let image_aspect = aspect(image.0, image.1);
    let canvas_aspect = aspect(canvas.0, canvas.1);
    if image_aspect > canvas_aspect {
        [canvas_aspect / image_aspect, 1.0]
    } else {
        [1.0, image_aspect / canvas_aspect]
    }
}

pub fn cover_uv(uv: [f32; 2], image: (u32, u32), canvas: (u32, u32)) -> [f32; 2] {
    let scale = cover_uv_scale(image, canvas);
    [
        (uv[0] - 0.5) * scale[0] + 0.5,
        (uv[1] - 0.5) * scale[1] + 0.5,
    ]
}

/// Largest centred rectangle with the image's aspect that fits the canvas.
pub fn contain_rect(image: (u32, u32), canvas: (u32, u32)) -> DestRect {
    let iw = image.0.max(1) as f32;
    let ih = image.1.max(1) as f32;
    let sw = canvas.0 as f32;
    let sh = canvas.1 as f32;
    let scale = (sw / iw).min(sh / ih);
    let width = iw * scale;
    let height = ih * scale;
    DestRect {
        x: (sw - width) * 0.5,
        y: (sh - height) * 0.5,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn wide_image_crops_horizontally() {
        let scale = cover_uv_scale((2000, 1000), (1000, 1000));
        assert!(close(scale[0], 0.5));
        assert!(close(scale[1], 1.0));
        let left = cover_uv([0.0, 0.0], (2000, 1000), (1000, 1000));
        assert!(close(left[0], 0.25));
        let centre = cover_uv([0.5, 0.5], (2000, 1000), (1000, 1000));
        assert!(close(centre[0], 0.5) && close(centre[1], 0.5));
    }

    #[test]
    fn tall_image_crops_vertically() {
        let scale = cover_uv_scale((1000, 2000), (1600, 900));
        assert!(close(scale[0], 1.0));
        assert!(close(scale[1], 0.5 / (16.0 / 9.0)));
    }

    #[test]
    fn matching_aspect_is_identity() {
        assert_eq!(cover_uv_scale((640, 480), (1280, 960)), [1.0, 1.0]);
    }

    #[test]
    fn contain_letterboxes_wide_image() {
        let rect = contain_rect((200, 100), (100, 100));
        assert_eq!(
            rect,
            DestRect {
                x: 0.0,
                y: 25.0,
                width: 100.0,
                height: 50.0
            }
        );
    }

    #[test]
    fn contain_pillarboxes_tall_image() {
        let rect = contain_rect((100, 200), (400, 100));
        assert!(close(rect.width, 50.0));
        assert!(close(rect.x, 175.0));
        assert_eq!(rect.to_pixels(), (175, 0, 50, 100));
    }
}

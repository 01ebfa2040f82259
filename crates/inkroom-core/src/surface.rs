//! CPU raster surface and stroke replay.
//!
//! Strokes are painted as straight, round-capped segments between
//! consecutive samples. Painting overwrites pixels (no blending, no
//! anti-aliasing), so replaying the same strokes onto identically
//! initialized surfaces always yields identical pixels.

use crate::color::Rgb;
use crate::note::Note;
use crate::stroke::Stroke;
use image::{ImageFormat, Rgba, RgbaImage};
use kurbo::{Line, Point, Rect, Vec2};
use std::sync::Arc;
use thiserror::Error;

/// Surface errors.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("Snapshot decoding failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Result type for surface operations.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// A PNG-encoded capture of the surface at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(Arc<[u8]>);

impl Snapshot {
    /// Wrap already-encoded PNG bytes.
    pub fn from_png(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Decode back into pixels.
    pub fn decode(&self) -> SurfaceResult<RgbaImage> {
        let image = image::load_from_memory_with_format(&self.0, ImageFormat::Png)?;
        Ok(image.to_rgba8())
    }
}

/// The drawing surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pixels: RgbaImage,
    background: Rgb,
}

impl Surface {
    /// Create a blank surface filled with `background`.
    pub fn new(width: u32, height: u32, background: Rgb) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba(background.to_rgba())),
            background,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn background(&self) -> Rgb {
        self.background
    }

    /// Color of one pixel, `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        self.pixels
            .get_pixel_checked(x, y)
            .map(|p| Rgb::new(p.0[0], p.0[1], p.0[2]))
    }

    /// Paint over everything with the background color.
    pub fn clear(&mut self) {
        let fill = Rgba(self.background.to_rgba());
        for pixel in self.pixels.pixels_mut() {
            *pixel = fill;
        }
    }

    /// Draw a complete stroke. Strokes with fewer than two points draw nothing.
    pub fn replay(&mut self, stroke: &Stroke) {
        let color = stroke.paint_color(self.background);
        for segment in stroke.segments() {
            self.paint_segment(segment, color, stroke.line_width);
        }
    }

    /// Draw one round-capped segment.
    pub fn paint_segment(&mut self, segment: Line, color: Rgb, line_width: f64) {
        let radius = line_width.max(0.0) / 2.0;
        let bounds = Rect::from_points(segment.p0, segment.p1).inflate(radius, radius);
        let Some((x0, y0, x1, y1)) = self.clip(bounds) else {
            return;
        };

        let fill = Rgba(color.to_rgba());
        let radius_sq = radius * radius;
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if distance_sq_to_segment(center, segment) <= radius_sq {
                    self.pixels.put_pixel(x, y, fill);
                }
            }
        }
    }

    /// Fill an axis-aligned rectangle.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgb) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let fill = Rgba(color.to_rgba());
        for y in y0..y1 {
            for x in x0..x1 {
                self.pixels.put_pixel(x, y, fill);
            }
        }
    }

    /// Pixel range covered by `rect`, clipped to the surface.
    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let clamp_x = |v: f64| v.clamp(0.0, self.width() as f64) as u32;
        let clamp_y = |v: f64| v.clamp(0.0, self.height() as f64) as u32;
        let (x0, x1) = (clamp_x(rect.x0.floor()), clamp_x(rect.x1.ceil()));
        let (y0, y1) = (clamp_y(rect.y0.floor()), clamp_y(rect.y1.ceil()));
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    /// Capture the current pixels.
    pub fn snapshot(&self) -> SurfaceResult<Snapshot> {
        let png = encode_png(self.pixels.as_raw(), self.width(), self.height())?;
        Ok(Snapshot::from_png(png))
    }

    /// Replace the surface contents with decoded snapshot pixels.
    ///
    /// A snapshot of a different size is drawn at the top-left corner over
    /// a cleared surface.
    pub fn load(&mut self, image: RgbaImage) {
        if image.dimensions() == self.pixels.dimensions() {
            self.pixels = image;
            return;
        }
        self.clear();
        image::imageops::replace(&mut self.pixels, &image, 0, 0);
    }

    /// Flatten the surface and the note overlay into one image.
    pub fn compose(&self, notes: &[&Note]) -> RgbaImage {
        let mut flat = self.clone();
        for note in notes {
            let rect = note.rect();
            flat.fill_rect(rect, note.color.darken(0.2));
            flat.fill_rect(rect.inset(-1.0), note.color);
        }
        flat.pixels
    }

    /// Encode the surface plus note overlay as a PNG file.
    pub fn export_png(&self, notes: &[&Note]) -> SurfaceResult<Vec<u8>> {
        let flat = self.compose(notes);
        encode_png(flat.as_raw(), flat.width(), flat.height())
    }
}

/// Squared distance from `point` to the closest point of `segment`.
fn distance_sq_to_segment(point: Point, segment: Line) -> f64 {
    let line_vec = segment.p1 - segment.p0;
    let point_vec: Vec2 = point - segment.p0;

    let line_len_sq = line_vec.hypot2();
    if line_len_sq < f64::EPSILON {
        return point_vec.hypot2();
    }

    let t = (point_vec.dot(line_vec) / line_len_sq).clamp(0.0, 1.0);
    let projection = segment.p0 + line_vec * t;
    (point - projection).hypot2()
}

fn encode_png(rgba_data: &[u8], width: u32, height: u32) -> SurfaceResult<Vec<u8>> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba_data)?;
    }
    Ok(png_data)
}

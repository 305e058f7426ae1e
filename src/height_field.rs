// src/height_field.rs
//! Immutable normalized height grid sampled from a grayscale (luma) image.

use bevy::prelude::*;

use crate::config::SamplingMode;
use crate::error::{VoxelError, VoxelResult};

/// Anything with per-pixel color that can be read as luma in `[0,1]`.
pub trait HeightSource {
    /// `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);
    /// Luma at integer pixel coordinates. Callers stay in bounds.
    fn luma(&self, x: u32, y: u32) -> f32;
}

/// Rec.601 luma on normalized channels.
#[inline]
pub fn luma_from_rgb(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

#[inline]
fn luma_u8(r: u8, g: u8, b: u8) -> f32 {
    luma_from_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
}

impl HeightSource for image::GrayImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
    fn luma(&self, x: u32, y: u32) -> f32 {
        self.get_pixel(x, y).0[0] as f32 / 255.0
    }
}

impl HeightSource for image::RgbImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
    fn luma(&self, x: u32, y: u32) -> f32 {
        let [r, g, b] = self.get_pixel(x, y).0;
        luma_u8(r, g, b)
    }
}

impl HeightSource for image::RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
    fn luma(&self, x: u32, y: u32) -> f32 {
        let [r, g, b, _] = self.get_pixel(x, y).0;
        luma_u8(r, g, b)
    }
}

impl HeightSource for image::DynamicImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
    fn luma(&self, x: u32, y: u32) -> f32 {
        use image::GenericImageView;
        let [r, g, b, _] = self.get_pixel(x, y).0;
        luma_u8(r, g, b)
    }
}

/// Bevy `Image` loaded through the asset server. Needs CPU-side data;
/// texels that can't be read count as height 0.
impl HeightSource for Image {
    fn dimensions(&self) -> (u32, u32) {
        let size = self.size();
        (size.x, size.y)
    }
    fn luma(&self, x: u32, y: u32) -> f32 {
        match self.get_color_at(x, y) {
            Ok(color) => {
                let c = color.to_srgba();
                luma_from_rgb(c.red, c.green, c.blue)
            }
            Err(_) => 0.0,
        }
    }
}

/// Bilinear-sample luma at normalized `(u, v)` in `[0,1]²`.
/// `u = 0` maps to the first pixel column and `u = 1` to the last.
pub fn sample_bilinear<S: HeightSource + ?Sized>(src: &S, u: f32, v: f32) -> f32 {
    let (w, h) = src.dimensions();
    let max_x = w.saturating_sub(1) as i32;
    let max_y = h.saturating_sub(1) as i32;

    let px_f = u.clamp(0.0, 1.0) * max_x as f32;
    let py_f = v.clamp(0.0, 1.0) * max_y as f32;

    let x0 = (px_f.floor() as i32).clamp(0, max_x);
    let y0 = (py_f.floor() as i32).clamp(0, max_y);
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);

    let dx = px_f - x0 as f32;
    let dy = py_f - y0 as f32;

    let s00 = src.luma(x0 as u32, y0 as u32);
    let s10 = src.luma(x1 as u32, y0 as u32);
    let s01 = src.luma(x0 as u32, y1 as u32);
    let s11 = src.luma(x1 as u32, y1 as u32);

    let a = s00 * (1.0 - dx) + s10 * dx;
    let b = s01 * (1.0 - dx) + s11 * dx;
    a * (1.0 - dy) + b * dy
}

/// `width × depth`, computed in `usize` so large grids can't wrap.
#[inline]
fn cell_count(width: u32, depth: u32) -> usize {
    width as usize * depth as usize
}

/// Row-major offset of `(x, z)`, in `usize` for the same reason.
#[inline]
fn cell_index(width: u32, x: u32, z: u32) -> usize {
    z as usize * width as usize + x as usize
}

#[inline]
fn sanitize(h: f32) -> f32 {
    if h.is_finite() { h.clamp(0.0, 1.0) } else { 0.0 }
}

/// Row-major `width × depth` grid of heights in `[0,1]`.
/// Read-only after construction; share it behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightField {
    width: u32,
    depth: u32,
    samples: Vec<f32>,
}

impl HeightField {
    /// Sample `src` into a grid.
    ///
    /// * `Exact`: every `resolution`-th source pixel, so the grid is
    ///   `ceil(w / resolution) × ceil(h / resolution)`.
    /// * `Bilinear`: a `resolution × resolution` grid over normalized UV,
    ///   independent of the source size.
    pub fn build<S: HeightSource + ?Sized>(
        src: &S,
        mode: SamplingMode,
        resolution: u32,
    ) -> VoxelResult<Self> {
        let (w, h) = src.dimensions();
        if w == 0 || h == 0 {
            return Err(VoxelError::InvalidInput(format!(
                "source image is {w}x{h}; both sides must be non-zero"
            )));
        }
        if resolution == 0 {
            return Err(VoxelError::InvalidInput("sampling resolution must be >= 1".into()));
        }

        let field = match mode {
            SamplingMode::Exact => {
                let stride = resolution;
                let width = w.div_ceil(stride);
                let depth = h.div_ceil(stride);
                let mut samples = Vec::with_capacity(cell_count(width, depth));
                for z in 0..depth {
                    for x in 0..width {
                        samples.push(sanitize(src.luma(x * stride, z * stride)));
                    }
                }
                Self { width, depth, samples }
            }
            SamplingMode::Bilinear => {
                let n = resolution;
                let step = if n > 1 { 1.0 / (n - 1) as f32 } else { 0.0 };
                let mut samples = Vec::with_capacity(cell_count(n, n));
                for z in 0..n {
                    let v = z as f32 * step;
                    for x in 0..n {
                        let u = x as f32 * step;
                        samples.push(sanitize(sample_bilinear(src, u, v)));
                    }
                }
                Self { width: n, depth: n, samples }
            }
        };

        debug!(
            "HeightField: {}x{} source -> {}x{} grid ({:?}, resolution {})",
            w, h, field.width, field.depth, mode, resolution
        );
        Ok(field)
    }

    /// Wrap precomputed samples (row-major). Values are sanitized like sampled ones.
    pub fn from_samples(width: u32, depth: u32, samples: Vec<f32>) -> VoxelResult<Self> {
        if width == 0 || depth == 0 {
            return Err(VoxelError::InvalidInput(format!(
                "height field is {width}x{depth}; both sides must be non-zero"
            )));
        }
        if samples.len() != cell_count(width, depth) {
            return Err(VoxelError::InvalidInput(format!(
                "expected {} samples for {width}x{depth}, got {}",
                cell_count(width, depth),
                samples.len()
            )));
        }
        let samples = samples.into_iter().map(sanitize).collect();
        Ok(Self { width, depth, samples })
    }

    #[inline]
    pub fn width(&self) -> u32 { self.width }

    #[inline]
    pub fn depth(&self) -> u32 { self.depth }

    /// Number of columns (`width × depth`).
    #[inline]
    pub fn len(&self) -> usize { self.samples.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.samples.is_empty() }

    /// Height at grid cell `(x, z)`. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn get(&self, x: u32, z: u32) -> f32 {
        debug_assert!(x < self.width && z < self.depth);
        self.samples[cell_index(self.width, x, z)]
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

//! Stencil-gated compositing of warped shard views
//!
//! One frame is: clear color and stencil, rasterize every visible mask into
//! the stencil partition, then run one full-frame warp pass per visible
//! shard, touching only the pixels that carry its stencil value. Each pass
//! re-derives the display-to-source mapping from the shard's stored inverse
//! and pulls source texels through it, so every shard shows its own
//! perspective-correct slice of the one source image.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::Path;

use crate::error::PipelineError;
use crate::homography::{Homography, DEGENERACY_EPSILON};
use crate::shard::{Shard, ShardSet};
use crate::stencil::StencilBuffer;
use crate::texture::SourceTexture;
use crate::view::ViewState;

/// Hard ceiling on simultaneously renderable shards. Requests beyond it are
/// truncated, keeping the first in iteration order.
pub const MAX_VISIBLE_SHARDS: usize = 14;

/// Flat per-slot colors for the debug tint, one per renderable slot.
const DEBUG_TINT: [[f32; 3]; MAX_VISIBLE_SHARDS] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.5, 0.0],
    [0.5, 0.0, 1.0],
    [0.0, 0.5, 0.5],
    [0.5, 0.5, 0.0],
    [0.5, 0.0, 0.0],
    [0.0, 0.5, 0.0],
    [0.0, 0.4, 0.2],
    [0.0, 0.4, 0.3],
];

/// A rendered RGBA8 color buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    fn new(width: u32, height: u32, background: [f32; 4]) -> Self {
        let clear = [
            (background[0] * 255.0).round().clamp(0.0, 255.0) as u8,
            (background[1] * 255.0).round().clamp(0.0, 255.0) as u8,
            (background[2] * 255.0).round().clamp(0.0, 255.0) as u8,
            (background[3] * 255.0).round().clamp(0.0, 255.0) as u8,
        ];

        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        for chunk in pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&clear);
        }

        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
            self.pixels[offset + 3],
        ]
    }

    /// Write the frame out as a PNG.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        image::save_buffer(
            path,
            &self.pixels,
            self.width,
            self.height,
            image::ColorType::Rgba8,
        )
        .with_context(|| format!("Failed to write frame to {:?}", path))
    }
}

/// Fixed-resolution compositor. Construction validates the target once;
/// per-frame work never fails on geometry.
pub struct Compositor {
    width: u32,
    height: u32,
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidTarget { width, height });
        }
        Ok(Self { width, height })
    }

    /// Composite one frame from the current shard set, source texture, and
    /// view snapshot.
    pub fn render(
        &self,
        shards: &ShardSet,
        texture: &SourceTexture,
        view: &ViewState,
    ) -> Result<Frame, PipelineError> {
        if !texture.ready() {
            return Err(PipelineError::TextureNotReady);
        }

        let mut frame = Frame::new(self.width, self.height, view.background);
        let mut stencil = StencilBuffer::new(self.width, self.height);

        let visible = visible_shards(shards, view);
        tracing::debug!("Compositing {} visible shards", visible.len());

        // First pass: partition the frame. Stencil value is the position in
        // the visible list plus one; 0 stays "background".
        for (pass, (_, shard)) in visible.iter().enumerate() {
            stencil.fill_polygon(&shard.transformed_mask_points, (pass + 1) as u8);
        }

        // Second pass: one stencil-gated warp per shard, in list order.
        for (pass, (_, shard)) in visible.iter().enumerate() {
            self.warp_pass(&mut frame, &stencil, (pass + 1) as u8, pass, shard, texture, view);
        }

        Ok(frame)
    }

    /// Full-frame pass restricted to `value` pixels: map each covered pixel
    /// back into the source image and blend the sample over the frame.
    fn warp_pass(
        &self,
        frame: &mut Frame,
        stencil: &StencilBuffer,
        value: u8,
        pass: usize,
        shard: &Shard,
        texture: &SourceTexture,
        view: &ViewState,
    ) {
        // The shard stores source->display; invert it again to get the
        // sampling direction. A degenerate inverse stays identity, which
        // renders the region unwarped rather than failing the frame.
        let (sampling, _) = shard.inverse.invert();

        let tex_w = texture.width() as f64;
        let tex_h = texture.height() as f64;
        let tint = DEBUG_TINT[pass % MAX_VISIBLE_SHARDS];
        let width = self.width as usize;
        let stride = width * 4;

        frame
            .pixels
            .par_chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let stencil_row = stencil.row(y as u32);
                for x in 0..width {
                    if stencil_row[x] != value {
                        continue;
                    }

                    let sample =
                        sample_display_pixel(&sampling, x, y, tex_w, tex_h, texture, view);
                    let tinted = if view.debug_tint {
                        [
                            0.5 * sample[0] + 0.5 * tint[0],
                            0.5 * sample[1] + 0.5 * tint[1],
                            0.5 * sample[2] + 0.5 * tint[2],
                            0.5 * sample[3] + 0.5,
                        ]
                    } else {
                        sample
                    };

                    blend_over(&mut row[x * 4..x * 4 + 4], tinted);
                }
            });
    }
}

/// Derive the ordered visible list for this frame: ready shards that the
/// view has not hidden, truncated to the slot ceiling. In single-shard mode
/// the list is at most the selected shard.
pub(crate) fn visible_shards<'a>(
    shards: &'a ShardSet,
    view: &ViewState,
) -> Vec<(usize, &'a Shard)> {
    let selectable = |slot: usize, shard: &Shard| shard.ready && view.is_visible(slot);

    if view.show_all {
        let mut visible: Vec<(usize, &Shard)> = shards
            .iter()
            .enumerate()
            .filter(|(slot, shard)| selectable(*slot, shard))
            .collect();

        if visible.len() > MAX_VISIBLE_SHARDS {
            tracing::warn!(
                "{} shards visible, truncating to {}",
                visible.len(),
                MAX_VISIBLE_SHARDS
            );
            visible.truncate(MAX_VISIBLE_SHARDS);
        }
        visible
    } else {
        shards
            .get(view.current_shard)
            .filter(|shard| selectable(view.current_shard, shard))
            .map(|shard| vec![(view.current_shard, shard)])
            .unwrap_or_default()
    }
}

/// Trace one display pixel back to a source sample. Pixel centers sit at
/// +0.5; the homogeneous weight is clamped away from zero so a grazing
/// projective horizon cannot divide to infinity.
#[inline]
fn sample_display_pixel(
    sampling: &Homography,
    x: usize,
    y: usize,
    tex_w: f64,
    tex_h: f64,
    texture: &SourceTexture,
    view: &ViewState,
) -> [f32; 4] {
    let px = x as f64 + 0.5;
    let py = y as f64 + 0.5;

    let (sx, sy, mut w) = sampling.apply(px, py);
    if w.abs() < DEGENERACY_EPSILON {
        w = DEGENERACY_EPSILON;
    }

    // Normalized source coordinates, then the global pan/zoom window;
    // sampling clamps into [0, 1]^2.
    let u = (sx / w) / tex_w * view.zoom + view.pan_x;
    let v = (sy / w) / tex_h * view.zoom + view.pan_y;

    let texel = texture.sample_bilinear(u, v);
    [
        texel[0] as f32 / 255.0,
        texel[1] as f32 / 255.0,
        texel[2] as f32 / 255.0,
        texel[3] as f32 / 255.0,
    ]
}

/// Straight-alpha blend of `src` over the destination pixel, in place.
#[inline]
fn blend_over(dst: &mut [u8], src: [f32; 4]) {
    let sa = src[3].clamp(0.0, 1.0);
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    for c in 0..3 {
        let d = dst[c] as f32 / 255.0;
        let blended = src[c] * sa + d * (1.0 - sa);
        dst[c] = (blended * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardDescriptor;
    use crate::homography::Point;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    /// Identity-mapped shard covering a sub-rectangle of the target.
    fn identity_shard(index: usize, x0: f64, y0: f64, x1: f64, y1: f64) -> ShardDescriptor {
        ShardDescriptor {
            index,
            source_points: square(x0, y0, x1, y1),
            display_points: square(x0, y0, x1, y1),
            mask_points: square(x0, y0, x1, y1),
        }
    }

    /// 16x16 texture, left half red, right half blue, opaque.
    fn split_texture() -> SourceTexture {
        let mut pixels = Vec::with_capacity(16 * 16 * 4);
        for _y in 0..16 {
            for x in 0..16 {
                if x < 8 {
                    pixels.extend_from_slice(&[255, 0, 0, 255]);
                } else {
                    pixels.extend_from_slice(&[0, 0, 255, 255]);
                }
            }
        }
        SourceTexture::from_rgba(16, 16, pixels)
    }

    fn flat_texture(rgba: [u8; 4]) -> SourceTexture {
        let mut pixels = Vec::with_capacity(16 * 16 * 4);
        for _ in 0..16 * 16 {
            pixels.extend_from_slice(&rgba);
        }
        SourceTexture::from_rgba(16, 16, pixels)
    }

    #[test]
    fn test_zero_sized_target_is_rejected() {
        assert!(matches!(
            Compositor::new(0, 1080),
            Err(PipelineError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_unready_texture_is_rejected() {
        let compositor = Compositor::new(16, 16).unwrap();
        let set = ShardSet::from_descriptors(&[]);
        let bad = SourceTexture::from_rgba(4, 4, vec![0u8; 7]);

        assert!(matches!(
            compositor.render(&set, &bad, &ViewState::default()),
            Err(PipelineError::TextureNotReady)
        ));
    }

    #[test]
    fn test_empty_set_leaves_background() {
        let compositor = Compositor::new(8, 8).unwrap();
        let set = ShardSet::from_descriptors(&[]);
        let view = ViewState {
            background: [0.0, 1.0, 0.0, 1.0],
            ..Default::default()
        };

        let frame = compositor.render(&set, &split_texture(), &view).unwrap();
        assert_eq!(frame.pixel(0, 0), [0, 255, 0, 255]);
        assert_eq!(frame.pixel(7, 7), [0, 255, 0, 255]);
    }

    #[test]
    fn test_identity_shard_shows_source_colors() {
        let compositor = Compositor::new(16, 16).unwrap();
        let set = ShardSet::from_descriptors(&[identity_shard(0, 0.0, 0.0, 16.0, 16.0)]);

        let frame = compositor
            .render(&set, &split_texture(), &ViewState::default())
            .unwrap();

        assert_eq!(frame.pixel(3, 8), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(12, 8), [0, 0, 255, 255]);
    }

    #[test]
    fn test_masks_isolate_regions() {
        let compositor = Compositor::new(16, 16).unwrap();
        // Two shards with disjoint masks; both sample the full texture
        let left = ShardDescriptor {
            mask_points: square(0.0, 0.0, 8.0, 16.0),
            ..identity_shard(0, 0.0, 0.0, 16.0, 16.0)
        };
        let right = ShardDescriptor {
            mask_points: square(8.0, 0.0, 16.0, 16.0),
            ..identity_shard(1, 0.0, 0.0, 16.0, 16.0)
        };
        let set = ShardSet::from_descriptors(&[left, right]);

        let view = ViewState {
            background: [0.0, 0.0, 0.0, 1.0],
            ..Default::default()
        };
        let frame = compositor.render(&set, &split_texture(), &view).unwrap();

        // Both regions show their slice of the source
        assert_eq!(frame.pixel(3, 8), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(12, 8), [0, 0, 255, 255]);

        // Hiding the right shard drops its footprint back to background
        let mut view = view;
        view.visible = vec![true, false];
        let frame = compositor.render(&set, &split_texture(), &view).unwrap();
        assert_eq!(frame.pixel(3, 8), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(12, 8), [0, 0, 0, 255]);
    }

    #[test]
    fn test_single_shard_mode_renders_only_selection() {
        let compositor = Compositor::new(16, 16).unwrap();
        let left = ShardDescriptor {
            mask_points: square(0.0, 0.0, 8.0, 16.0),
            ..identity_shard(0, 0.0, 0.0, 16.0, 16.0)
        };
        let right = ShardDescriptor {
            mask_points: square(8.0, 0.0, 16.0, 16.0),
            ..identity_shard(1, 0.0, 0.0, 16.0, 16.0)
        };
        let set = ShardSet::from_descriptors(&[left, right]);

        let view = ViewState {
            background: [0.0, 0.0, 0.0, 1.0],
            show_all: false,
            current_shard: 1,
            ..Default::default()
        };
        let frame = compositor.render(&set, &split_texture(), &view).unwrap();

        assert_eq!(frame.pixel(3, 8), [0, 0, 0, 255]);
        assert_eq!(frame.pixel(12, 8), [0, 0, 255, 255]);
    }

    #[test]
    fn test_visible_list_caps_at_fourteen_in_order() {
        let descriptors: Vec<ShardDescriptor> = (0..20)
            .map(|i| identity_shard(i, 0.0, 0.0, 16.0, 16.0))
            .collect();
        let set = ShardSet::from_descriptors(&descriptors);

        let visible = visible_shards(&set, &ViewState::default());
        assert_eq!(visible.len(), MAX_VISIBLE_SHARDS);
        for (expected, (slot, shard)) in visible.iter().enumerate() {
            assert_eq!(*slot, expected);
            assert_eq!(shard.index, expected);
        }
    }

    #[test]
    fn test_unavailable_shard_is_skipped_but_others_render() {
        let compositor = Compositor::new(16, 16).unwrap();
        let left = ShardDescriptor {
            mask_points: square(0.0, 0.0, 8.0, 16.0),
            ..identity_shard(0, 0.0, 0.0, 16.0, 16.0)
        };
        let mut broken = ShardDescriptor {
            mask_points: square(8.0, 0.0, 16.0, 16.0),
            ..identity_shard(1, 0.0, 0.0, 16.0, 16.0)
        };
        broken.source_points.truncate(3);

        let set = ShardSet::from_descriptors(&[left, broken]);
        let visible = visible_shards(&set, &ViewState::default());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0, 0);

        let view = ViewState {
            background: [0.0, 0.0, 0.0, 1.0],
            ..Default::default()
        };
        let frame = compositor.render(&set, &split_texture(), &view).unwrap();
        assert_eq!(frame.pixel(3, 8), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(12, 8), [0, 0, 0, 255]);
    }

    #[test]
    fn test_center_pixel_resolves_inside_source_quad() {
        let desc = ShardDescriptor {
            index: 0,
            source_points: vec![
                Point::new(10.0, 10.0),
                Point::new(90.0, 5.0),
                Point::new(95.0, 95.0),
                Point::new(5.0, 90.0),
            ],
            display_points: square(0.0, 0.0, 100.0, 100.0),
            mask_points: square(0.0, 0.0, 100.0, 100.0),
        };
        let shard = crate::shard::Shard::build(&desc);

        // Same re-derivation the warp pass performs
        let (sampling, _) = shard.inverse.invert();
        let center = sampling.transform_point(Point::new(50.0, 50.0));

        // Strictly inside the convex hull of the source quad: the point is
        // on the inner side of every edge
        let hull = &desc.source_points;
        for i in 0..4 {
            let a = hull[i];
            let b = hull[(i + 1) % 4];
            let cross = (b.x - a.x) * (center.y - a.y) - (b.y - a.y) * (center.x - a.x);
            assert!(cross > 0.0, "center {:?} outside edge {} of hull", center, i);
        }
    }

    #[test]
    fn test_debug_tint_blends_half_slot_color() {
        let compositor = Compositor::new(16, 16).unwrap();
        let set = ShardSet::from_descriptors(&[identity_shard(0, 0.0, 0.0, 16.0, 16.0)]);

        let view = ViewState {
            debug_tint: true,
            ..Default::default()
        };
        let frame = compositor
            .render(&set, &flat_texture([255, 255, 255, 255]), &view)
            .unwrap();

        // White mixed 50/50 with the first slot color (red)
        assert_eq!(frame.pixel(8, 8), [255, 128, 128, 255]);
    }

    #[test]
    fn test_pan_and_zoom_shift_the_sampling_window() {
        let compositor = Compositor::new(16, 16).unwrap();
        let set = ShardSet::from_descriptors(&[identity_shard(0, 0.0, 0.0, 16.0, 16.0)]);

        // Panning a full texture width to the right means every sample
        // clamps onto the right (blue) border column
        let view = ViewState {
            pan_x: 1.0,
            ..Default::default()
        };
        let frame = compositor.render(&set, &split_texture(), &view).unwrap();
        assert_eq!(frame.pixel(3, 8), [0, 0, 255, 255]);
        assert_eq!(frame.pixel(12, 8), [0, 0, 255, 255]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let compositor = Compositor::new(32, 32).unwrap();
        let descriptors: Vec<ShardDescriptor> = (0..4)
            .map(|i| {
                let x0 = (i % 2) as f64 * 16.0;
                let y0 = (i / 2) as f64 * 16.0;
                ShardDescriptor {
                    mask_points: square(x0, y0, x0 + 16.0, y0 + 16.0),
                    ..identity_shard(i, 0.0, 0.0, 32.0, 32.0)
                }
            })
            .collect();
        let set = ShardSet::from_descriptors(&descriptors);

        let view = ViewState {
            debug_tint: true,
            ..Default::default()
        };
        let a = compositor.render(&set, &split_texture(), &view).unwrap();
        let b = compositor.render(&set, &split_texture(), &view).unwrap();
        assert_eq!(a, b);
    }
}

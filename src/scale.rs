use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::error::{alloc_row, Error, Result};

/// Fixed-point fractional bits used for the scale factor.
const FP_SHIFT: u32 = 16;
const FP_ONE: i64 = 1 << FP_SHIFT;
/// Half-up rounding bias for `>> FP_SHIFT`.
const FP_ROUND: i64 = 0x7FFF;

/// Destination bounds on the physical display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub origin: Point,
    pub size: Size,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { origin: Point::new(x, y), size: Size::new(width, height) }
    }
}

/// Accepts rectangular blocks of native-format pixels. The caller
/// guarantees the block lies within the physical display bounds.
pub trait DisplaySink {
    fn push_rows(&mut self, x: i32, y: i32, width: u32, height: u32, pixels: &[Rgb565])
        -> Result<()>;
}

/// Adapter that lets any embedded-graphics draw target act as the sink.
pub struct DrawTargetSink<'a, D> {
    target: &'a mut D,
}

impl<'a, D> DrawTargetSink<'a, D> {
    pub fn new(target: &'a mut D) -> Self {
        Self { target }
    }
}

impl<D> DisplaySink for DrawTargetSink<'_, D>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: core::fmt::Debug,
{
    fn push_rows(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        pixels: &[Rgb565],
    ) -> Result<()> {
        let area = Rectangle::new(Point::new(x, y), Size::new(width, height));
        self.target
            .fill_contiguous(&area, pixels.iter().copied())
            .map_err(|err| Error::Display(format!("{err:?}")))
    }
}

/// Scan-converting nearest-neighbor resampler.
///
/// Built once per render. Consumes decoded source scanlines in increasing
/// row order and pushes each resampled row straight to the sink, so memory
/// stays proportional to one row, never to the full frame.
pub struct ScanlineScaler {
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
    origin: Point,
    /// Per destination column: the source column it samples.
    x_lookup: Vec<u32>,
    /// Reused destination row.
    scaled_row: Vec<Rgb565>,
}

impl ScanlineScaler {
    /// Compute the uniform fixed-point scale that fits `src` inside
    /// `region` preserving aspect ratio, center the result, and build the
    /// horizontal lookup table.
    pub fn new(src_width: u32, src_height: u32, region: Region) -> Result<Self> {
        let src_width = src_width.max(1);
        let src_height = src_height.max(1);
        let bound_w = region.size.width;
        let bound_h = region.size.height;

        let scale_x = ((bound_w as i64) << FP_SHIFT) / src_width as i64;
        let scale_y = ((bound_h as i64) << FP_SHIFT) / src_height as i64;
        let mut scale = scale_x.min(scale_y);
        if scale <= 0 {
            scale = FP_ONE;
        }

        let fit = |src: u32, bound: u32| -> u32 {
            let scaled = (src as i64 * scale + FP_ROUND) >> FP_SHIFT;
            scaled.clamp(1, bound.max(1) as i64) as u32
        };
        let target_width = fit(src_width, bound_w);
        let target_height = fit(src_height, bound_h);

        // Center inside the region. Targets never exceed the bounds, so
        // these offsets are non-negative.
        let origin = Point::new(
            region.origin.x + (bound_w.saturating_sub(target_width) / 2) as i32,
            region.origin.y + (bound_h.saturating_sub(target_height) / 2) as i32,
        );

        let mut x_lookup = alloc_row(target_width as usize, 0u32)?;
        for (x, slot) in x_lookup.iter_mut().enumerate() {
            // Round-to-nearest column, ties toward the lower coordinate.
            // Widened so a legally huge source width cannot overflow.
            let src = (x as u64 * src_width as u64 + (target_width / 2) as u64)
                / target_width as u64;
            *slot = (src as u32).min(src_width - 1);
        }
        let scaled_row = alloc_row(target_width as usize, Rgb565::BLACK)?;

        Ok(Self {
            src_width,
            src_height,
            target_width,
            target_height,
            origin,
            x_lookup,
            scaled_row,
        })
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn x_lookup(&self) -> &[u32] {
        &self.x_lookup
    }

    /// Destination rows `[start, end)` painted by source row `y`.
    ///
    /// Consecutive source rows produce adjacent spans with no gaps or
    /// overlaps; a span is forced to hold at least one row so integer
    /// truncation never skips a destination row.
    pub fn row_span(&self, y: u32) -> (u32, u32) {
        let src_height = self.src_height.max(1) as u64;
        let start = (y as u64 * self.target_height as u64 / src_height) as u32;
        let mut end = ((y as u64 + 1) * self.target_height as u64 / src_height) as u32;
        if end <= start {
            end = start + 1;
        }
        (start.min(self.target_height), end.min(self.target_height))
    }

    /// Resample one decoded source row and push its destination span.
    ///
    /// `row` must hold at least `src_width` native-format pixels; rows must
    /// arrive in increasing order, each exactly once.
    pub fn push_scanline<K: DisplaySink>(
        &mut self,
        y: u32,
        row: &[Rgb565],
        sink: &mut K,
    ) -> Result<()> {
        if row.len() < self.src_width as usize {
            return Err(Error::DecodeStream(format!(
                "scanline {y} holds {} pixels, expected {}",
                row.len(),
                self.src_width
            )));
        }

        for (dst, &src) in self.scaled_row.iter_mut().zip(&self.x_lookup) {
            *dst = row[src as usize];
        }

        let (start, end) = self.row_span(y);
        for dest in start..end {
            sink.push_rows(
                self.origin.x,
                self.origin.y + dest as i32,
                self.target_width,
                1,
                &self.scaled_row,
            )?;
        }
        Ok(())
    }
}

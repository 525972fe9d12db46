use std::io::Read;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;

use crate::error::{alloc_row, Error, Result};

/// One opened image: dimensions plus a run-to-completion decode that hands
/// each scanline, already converted to the display's native format, to the
/// caller in strictly increasing row order.
pub trait ScanlineRun {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Decode the whole image, invoking `on_row` once per source row.
    /// A callback error aborts the decode and is returned unchanged.
    fn decode(&mut self, on_row: &mut dyn FnMut(u32, &[Rgb565]) -> Result<()>) -> Result<()>;
}

/// Opens raster bitstreams. The container format behind this seam is a
/// black box to the pipeline; only the scanline contract matters.
pub trait ScanlineDecoder<R: Read> {
    type Run: ScanlineRun;
    fn open(&self, reader: R) -> Result<Self::Run>;
}

/// Streaming PNG decode, one row in memory at a time.
///
/// Interlaced images are rejected at open: reconstructing Adam7 passes
/// would need a full-frame buffer, which the RAM budget rules out.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngDecoder;

pub struct PngRun<R: Read> {
    reader: png::Reader<R>,
    color: png::ColorType,
    width: u32,
    height: u32,
    /// Reused native-format source row.
    row: Vec<Rgb565>,
}

// png::Reader carries no Debug impl, so summarize everything around it.
impl<R: Read> core::fmt::Debug for PngRun<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PngRun")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl<R: Read> ScanlineDecoder<R> for PngDecoder {
    type Run = PngRun<R>;

    fn open(&self, reader: R) -> Result<Self::Run> {
        let mut decoder = png::Decoder::new(reader);
        // Expand palette/low-bit images to 8-bit channels so every row
        // converts the same way.
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let reader = decoder
            .read_info()
            .map_err(|err| Error::DecodeOpen(err.to_string()))?;

        let info = reader.info();
        if info.interlaced {
            return Err(Error::DecodeOpen("interlaced PNG not supported".into()));
        }
        let (width, height) = (info.width, info.height);

        let (color, depth) = reader.output_color_type();
        if depth != png::BitDepth::Eight {
            return Err(Error::DecodeOpen(format!("unsupported bit depth {depth:?}")));
        }
        if channels_of(color).is_none() {
            return Err(Error::DecodeOpen(format!("unsupported color type {color:?}")));
        }

        let row = alloc_row(width as usize, Rgb565::BLACK)?;
        Ok(PngRun { reader, color, width, height, row })
    }
}

impl<R: Read> ScanlineRun for PngRun<R> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn decode(&mut self, on_row: &mut dyn FnMut(u32, &[Rgb565]) -> Result<()>) -> Result<()> {
        let mut y = 0u32;
        loop {
            let data = match self.reader.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(err) => return Err(Error::DecodeStream(err.to_string())),
            };
            row_to_rgb565(data.data(), self.color, &mut self.row)?;
            on_row(y, &self.row)?;
            y += 1;
        }
        if y != self.height {
            return Err(Error::DecodeStream(format!(
                "decoder produced {y} of {} rows",
                self.height
            )));
        }
        Ok(())
    }
}

fn channels_of(color: png::ColorType) -> Option<usize> {
    use png::ColorType::*;
    match color {
        Grayscale => Some(1),
        GrayscaleAlpha => Some(2),
        Rgb => Some(3),
        Rgba => Some(4),
        Indexed => None,
    }
}

/// Convert one decoded row to RGB565. Alpha is dropped; jacket scans are
/// opaque.
fn row_to_rgb565(data: &[u8], color: png::ColorType, out: &mut [Rgb565]) -> Result<()> {
    let channels = channels_of(color)
        .ok_or_else(|| Error::DecodeStream(format!("unsupported color type {color:?}")))?;
    if data.len() < out.len() * channels {
        return Err(Error::DecodeStream(format!(
            "row holds {} bytes, expected {}",
            data.len(),
            out.len() * channels
        )));
    }
    for (x, px) in out.iter_mut().enumerate() {
        let i = x * channels;
        let (r, g, b) = if channels >= 3 {
            (data[i], data[i + 1], data[i + 2])
        } else {
            (data[i], data[i], data[i])
        };
        *px = Rgb565::new(r >> 3, g >> 2, b >> 3);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::encode_png;
    use std::io::Cursor;

    fn open_png(bytes: &[u8]) -> Result<PngRun<Cursor<Vec<u8>>>> {
        PngDecoder.open(Cursor::new(bytes.to_vec()))
    }

    fn collect_rows(run: &mut PngRun<Cursor<Vec<u8>>>) -> Result<Vec<(u32, Vec<Rgb565>)>> {
        let mut rows = Vec::new();
        run.decode(&mut |y, row| {
            rows.push((y, row.to_vec()));
            Ok(())
        })?;
        Ok(rows)
    }

    #[test]
    fn rows_arrive_in_order_with_native_pixels() {
        // Top row red, bottom row blue.
        let rgb = [255, 0, 0, 255, 0, 0, 0, 0, 255, 0, 0, 255];
        let bytes = encode_png(2, 2, &rgb);
        let mut run = open_png(&bytes).unwrap();
        assert_eq!((run.width(), run.height()), (2, 2));
        let rows = collect_rows(&mut run).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 0);
        assert_eq!(rows[1].0, 1);
        assert_eq!(rows[0].1, vec![Rgb565::RED; 2]);
        assert_eq!(rows[1].1, vec![Rgb565::BLUE; 2]);
    }

    #[test]
    fn open_runs_format_for_diagnostics() {
        let bytes = crate::testutil::solid_png(3, 2, [1, 2, 3]);
        let run = open_png(&bytes).unwrap();
        let dbg = format!("{run:?}");
        assert!(dbg.contains("width: 3"));
        assert!(dbg.contains("height: 2"));
    }

    #[test]
    fn non_png_bytes_fail_at_open() {
        let err = open_png(b"definitely not a png").unwrap_err();
        assert!(matches!(err, Error::DecodeOpen(_)));
    }

    #[test]
    fn truncated_bitstream_fails_mid_decode() {
        let rgb: Vec<u8> = (0..64u32 * 64 * 3).map(|i| (i % 251) as u8).collect();
        let mut bytes = encode_png(64, 64, &rgb);
        bytes.truncate(bytes.len() * 3 / 5);
        let mut run = open_png(&bytes).expect("header should still parse");
        let err = collect_rows(&mut run).unwrap_err();
        assert!(matches!(err, Error::DecodeStream(_)));
    }

    #[test]
    fn callback_errors_abort_the_decode() {
        let bytes = crate::testutil::solid_png(4, 4, [0, 255, 0]);
        let mut run = open_png(&bytes).unwrap();
        let mut calls = 0;
        let err = run
            .decode(&mut |_, _| {
                calls += 1;
                Err(Error::Display("sink gone".into()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Display(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn grayscale_rows_convert_to_gray_pixels() {
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, 2, 1);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0x00, 0xFF]).unwrap();
        }
        let mut run = open_png(&bytes).unwrap();
        let rows = collect_rows(&mut run).unwrap();
        assert_eq!(rows[0].1, vec![Rgb565::BLACK, Rgb565::WHITE]);
    }
}

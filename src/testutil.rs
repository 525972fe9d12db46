//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::error::Result;
use crate::net::{connection_error, ByteStream, HttpSource};

/// A response body delivered in pre-cut chunks. The connection reports
/// closed once the script is exhausted.
pub struct FakeStream {
    pub status: u16,
    pub declared: Option<u64>,
    pub chunks: VecDeque<Vec<u8>>,
}

impl ByteStream for FakeStream {
    fn status_code(&self) -> u16 {
        self.status
    }
    fn declared_len(&self) -> Option<u64> {
        self.declared
    }
    fn bytes_available(&self) -> usize {
        self.chunks.front().map_or(0, Vec::len)
    }
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
    fn is_connected(&self) -> bool {
        !self.chunks.is_empty()
    }
}

/// Serves a queue of scripted responses; a drained queue means the
/// connection cannot be established.
pub struct FakeSource {
    pub responses: VecDeque<FakeStream>,
}

impl FakeSource {
    pub fn empty() -> Self {
        Self { responses: VecDeque::new() }
    }

    pub fn single(status: u16, declared: Option<u64>, body: &[u8]) -> Self {
        let mut source = Self::empty();
        source.push(status, declared, body);
        source
    }

    pub fn push(&mut self, status: u16, declared: Option<u64>, body: &[u8]) {
        self.responses.push_back(FakeStream {
            status,
            declared,
            chunks: body.chunks(700).map(<[u8]>::to_vec).collect(),
        });
    }
}

impl HttpSource for FakeSource {
    type Stream = FakeStream;
    fn open(&mut self, url: &str, _timeout: Duration) -> Result<Self::Stream> {
        self.responses.pop_front().ok_or_else(|| connection_error(url, "connect failed"))
    }
}

/// Encode an 8-bit RGB image for decode fixtures.
pub fn encode_png(width: u32, height: u32, rgb: &[u8]) -> Vec<u8> {
    assert_eq!(rgb.len(), (width * height * 3) as usize);
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(rgb).unwrap();
    }
    out
}

/// A flat-color fixture image.
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let data: Vec<u8> =
        std::iter::repeat(rgb).take((width * height) as usize).flatten().collect();
    encode_png(width, height, &data)
}

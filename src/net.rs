use std::io;
use std::time::Duration;

use crate::error::{Error, Result};

/// One open HTTP-style response body. Closing the connection is `Drop`.
///
/// `bytes_available` reports what can be read without blocking;
/// `read_chunk` may still return fewer bytes than asked for.
pub trait ByteStream {
    fn status_code(&self) -> u16;
    /// Content length from the response, if the server declared one.
    fn declared_len(&self) -> Option<u64>;
    fn bytes_available(&self) -> usize;
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Liveness of the underlying connection. Once false, no further bytes
    /// will arrive beyond what `bytes_available` already reports.
    fn is_connected(&self) -> bool;
}

/// Opens network streams. The transport (Wi-Fi, lwIP, a test script) lives
/// behind this seam; the pipeline never sees sockets.
pub trait HttpSource {
    type Stream: ByteStream;

    /// Open `url` with a fixed connection timeout. Implementations should
    /// fail here on connect/timeout errors; a non-success status is
    /// reported through the returned stream instead.
    fn open(&mut self, url: &str, timeout: Duration) -> Result<Self::Stream>;
}

pub fn status_is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Convenience for transports that only have a string to report.
pub fn connection_error(url: &str, detail: impl std::fmt::Display) -> Error {
    Error::Connection(format!("{url}: {detail}"))
}

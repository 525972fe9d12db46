use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between "show this jacket" and pixels on
/// the screen. Each stage cleans up after itself before surfacing one of
/// these; nothing here is retried automatically within a single run.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection open failed, timed out, or the response status was not
    /// a success.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Eviction could not free enough space for the incoming artifact.
    #[error("could not free {required} bytes of cache space")]
    Capacity { required: u64 },

    /// A store write came up short mid-download.
    #[error("write failed after {written} bytes: {source}")]
    Write {
        written: u64,
        #[source]
        source: io::Error,
    },

    /// Bytes on disk disagree with what the server declared. `expected`
    /// is `None` for unknown-length downloads that yielded nothing.
    #[error("download size mismatch (expected {expected:?}, got {actual} bytes)")]
    LengthMismatch { expected: Option<u64>, actual: u64 },

    /// The decoder rejected the file outright; the cache entry is presumed
    /// corrupt and has already been deleted by the time this surfaces.
    #[error("decoder rejected file: {0}")]
    DecodeOpen(String),

    /// Malformed catalog configuration.
    #[error("invalid catalog: {0}")]
    Catalog(String),

    /// Structural corruption partway through the bitstream.
    #[error("decode failed mid-stream: {0}")]
    DecodeStream(String),

    /// A working buffer could not be obtained within the RAM budget.
    #[error("allocation of {0} bytes failed")]
    Allocation(usize),

    /// Block store plumbing (open, remove, enumerate).
    #[error("store error: {0}")]
    Store(#[from] io::Error),

    /// The display sink refused a row blit.
    #[error("display error: {0}")]
    Display(String),
}

/// Reserve `len` elements up front so allocation failure surfaces as
/// [`Error::Allocation`] instead of an abort.
pub(crate) fn alloc_row<T: Clone>(len: usize, fill: T) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::Allocation(len * std::mem::size_of::<T>()))?;
    buf.resize(len, fill);
    Ok(buf)
}

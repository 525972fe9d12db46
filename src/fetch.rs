use std::io::Write;
use std::thread;
use std::time::Duration;

use log::info;

use crate::error::{Error, Result};
use crate::net::{status_is_success, ByteStream, HttpSource};
use crate::store::{BlockStore, CacheStore};

/// Upper bound on a single stream read.
pub const DOWNLOAD_CHUNK: usize = 2048;

/// Capacity-planning estimate for responses without a Content-Length.
/// A planning hint, not a hard cap: a longer stream fails at the store
/// write boundary instead.
pub const UNKNOWN_LENGTH_ESTIMATE: u64 = 600_000;

/// Pause between polls while the connection is live but has no bytes ready.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Transient state of one download. Lives for the duration of a single
/// [`fetch_to_store`] call.
#[derive(Debug)]
pub struct DownloadSession {
    pub destination: String,
    /// Content length declared by the server, if any.
    pub declared: Option<u64>,
    /// Size used for capacity planning: declared length or the fallback.
    pub estimate: u64,
    pub written: u64,
}

impl DownloadSession {
    fn new(destination: &str, declared: Option<u64>) -> Self {
        Self {
            destination: destination.into(),
            declared,
            estimate: declared.unwrap_or(UNKNOWN_LENGTH_ESTIMATE),
            written: 0,
        }
    }

    /// Bytes still owed by the server, when the total is known.
    fn remaining(&self) -> Option<u64> {
        self.declared.map(|total| total.saturating_sub(self.written))
    }

    fn budget_met(&self) -> bool {
        matches!(self.remaining(), Some(0))
    }
}

/// Stream `url` into the store at `dest`.
///
/// Space is reclaimed up front (never evicting `dest` itself), the body is
/// copied in chunks of at most [`DOWNLOAD_CHUNK`] bytes, and the byte count
/// is validated against the declared length. Every failure path deletes the
/// partial file; on return the destination either holds the complete body
/// or does not exist.
pub fn fetch_to_store<N, S>(
    source: &mut N,
    cache: &mut CacheStore<S>,
    url: &str,
    dest: &str,
    timeout: Duration,
) -> Result<u64>
where
    N: HttpSource,
    S: BlockStore,
{
    let mut stream = source.open(url, timeout)?;
    let status = stream.status_code();
    if !status_is_success(status) {
        return Err(Error::Connection(format!("HTTP GET failed ({status}) for {url}")));
    }

    let declared = stream.declared_len().filter(|len| *len > 0);
    let mut session = DownloadSession::new(dest, declared);

    if !cache.ensure_capacity(session.estimate, dest) {
        return Err(Error::Capacity { required: session.estimate });
    }
    if cache.exists(dest) {
        cache.remove(dest)?;
    }
    let mut out = cache.create(dest)?;

    let result = copy_stream(&mut stream, &mut out, &mut session);
    drop(out);

    if let Err(err) = result {
        discard_partial(cache, dest);
        return Err(err);
    }

    match session.declared {
        Some(expected) if session.written != expected => {
            discard_partial(cache, dest);
            Err(Error::LengthMismatch { expected: Some(expected), actual: session.written })
        }
        None if session.written == 0 => {
            discard_partial(cache, dest);
            Err(Error::LengthMismatch { expected: None, actual: 0 })
        }
        _ => {
            info!("saved {dest} ({} bytes)", session.written);
            Ok(session.written)
        }
    }
}

/// Chunked copy loop. Runs until the connection closes, the declared
/// length is fully consumed, or a write fails. Never reads past a known
/// remaining budget.
fn copy_stream<T: ByteStream, W: Write>(
    stream: &mut T,
    out: &mut W,
    session: &mut DownloadSession,
) -> Result<()> {
    let mut buf = [0u8; DOWNLOAD_CHUNK];

    while stream.is_connected() {
        let available = stream.bytes_available();
        if available == 0 {
            if session.budget_met() {
                break;
            }
            thread::sleep(IDLE_WAIT);
            continue;
        }

        let mut to_read = available.min(DOWNLOAD_CHUNK);
        if let Some(remaining) = session.remaining() {
            if remaining == 0 {
                break;
            }
            to_read = to_read.min(remaining as usize);
        }

        let read = match stream.read_chunk(&mut buf[..to_read]) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        out.write_all(&buf[..read]).map_err(|source| Error::Write {
            written: session.written,
            source,
        })?;
        session.written += read as u64;

        if session.budget_met() {
            break;
        }
    }
    Ok(())
}

fn discard_partial<S: BlockStore>(cache: &mut CacheStore<S>, dest: &str) {
    if cache.exists(dest) {
        let _ = cache.remove(dest);
    }
}

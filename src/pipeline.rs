use std::time::Duration;

use log::{error, info};

use crate::catalog::CatalogItem;
use crate::decode::{ScanlineDecoder, ScanlineRun};
use crate::error::{Error, Result};
use crate::fetch::fetch_to_store;
use crate::net::HttpSource;
use crate::scale::{DisplaySink, Region, ScanlineScaler};
use crate::store::{BlockStore, CacheStore};

/// Final on-screen dimensions of a rendered jacket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedArt {
    pub width: u32,
    pub height: u32,
}

/// Sequences one catalog item through cache check, fetch-if-missing,
/// decode and scaled render. Strictly sequential: one item, one store
/// operation, one decode at a time.
///
/// A failure is terminal for this pass; the outer scheduler decides when
/// to come back. Anything that smells like corruption downstream of the
/// cache deletes the entry so the next pass re-fetches instead of
/// re-reading a bad file.
pub struct Pipeline<S: BlockStore, N, D> {
    cache: CacheStore<S>,
    source: N,
    decoder: D,
    base_url: String,
    region: Region,
    timeout: Duration,
}

impl<S, N, D> Pipeline<S, N, D>
where
    S: BlockStore,
    N: HttpSource,
    D: ScanlineDecoder<S::Reader>,
{
    pub fn new(
        store: S,
        source: N,
        decoder: D,
        base_url: impl Into<String>,
        region: Region,
        timeout: Duration,
    ) -> Self {
        Self {
            cache: CacheStore::new(store),
            source,
            decoder,
            base_url: base_url.into(),
            region,
            timeout,
        }
    }

    pub fn cache(&self) -> &CacheStore<S> {
        &self.cache
    }

    /// Fetch (if absent), decode and render one item's jacket into the
    /// configured region.
    pub fn render_item<K: DisplaySink>(
        &mut self,
        item: &CatalogItem,
        sink: &mut K,
    ) -> Result<RenderedArt> {
        let path = item.cache_path();

        if !self.cache.exists(&path) {
            let url = item.jacket_url(&self.base_url);
            info!("downloading jacket for {} from {url}", item.title);
            fetch_to_store(&mut self.source, &mut self.cache, &url, &path, self.timeout)?;
        }

        let reader = self.cache.open(&path)?;
        let mut run = match self.decoder.open(reader) {
            Ok(run) => run,
            Err(err) => {
                error!("jacket open failed for {path}: {err}");
                let _ = self.cache.remove(&path);
                return Err(err);
            }
        };

        let (src_width, src_height) = (run.width(), run.height());
        let mut scaler = ScanlineScaler::new(src_width, src_height, self.region)?;

        if let Err(err) = run.decode(&mut |y, row| scaler.push_scanline(y, row, sink)) {
            // Only structural decode errors condemn the cache entry; a
            // display or allocation failure says nothing about the file.
            if matches!(err, Error::DecodeStream(_) | Error::DecodeOpen(_)) {
                error!("jacket decode failed for {path}: {err}");
                let _ = self.cache.remove(&path);
            }
            return Err(err);
        }

        let (width, height) = scaler.target_size();
        info!("displayed {} ({width}x{height})", item.title);
        Ok(RenderedArt { width, height })
    }
}

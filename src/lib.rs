//! Fetch-cache-scale-render pipeline for jacket art on small displays.
//!
//! A fixed catalog of remote jacket images is fetched over an unreliable
//! network into a capacity-constrained flash store, decoded one scanline at
//! a time, rescaled with fixed-point nearest-neighbor resampling to fit a
//! display region, and pushed to the screen row by row. The full scaled
//! frame is never held in memory.
//!
//! The display driver, the network transport, the block device and the
//! raster bitstream are external collaborators behind the traits in
//! [`scale`], [`net`], [`store`] and [`decode`].

pub mod catalog;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod net;
pub mod pipeline;
pub mod scale;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use catalog::{Catalog, CatalogItem};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RenderedArt};

/// Path prefix that marks a store entry as owned by the jacket cache.
pub const CACHE_PREFIX: &str = "/jacket-";

/// File extension of cached jacket images.
pub const CACHE_EXT: &str = ".png";

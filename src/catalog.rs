use serde::Deserialize;

use crate::error::Result;
use crate::{CACHE_EXT, CACHE_PREFIX};

/// Server the built-in catalog points at.
pub const DEFAULT_BASE_URL: &str = "https://ddr.rtfoy.co.uk/";

/// One song in the viewer rotation. Fixed at configuration time, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub bpm_min: u16,
    pub bpm_max: u16,
    pub length_seconds: u16,
    /// URL-encoded path relative to the catalog base URL.
    pub jacket_path: String,
}

impl CatalogItem {
    /// Flat store path of this item's cache entry: prefix + id + extension.
    pub fn cache_path(&self) -> String {
        format!("{CACHE_PREFIX}{}{CACHE_EXT}", self.id)
    }

    /// Absolute URL of the remote jacket.
    pub fn jacket_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.jacket_path)
    }

    /// Song length as `m:ss`.
    pub fn length_label(&self) -> String {
        format!("{}:{:02}", self.length_seconds / 60, self.length_seconds % 60)
    }

    /// BPM, collapsed to a single number when the song does not vary.
    pub fn bpm_label(&self) -> String {
        if self.bpm_min == self.bpm_max {
            format!("{}", self.bpm_min)
        } else {
            format!("{}-{}", self.bpm_min, self.bpm_max)
        }
    }
}

/// Read-only, ordered list of songs plus the server they live on.
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub base_url: String,
    pub items: Vec<CatalogItem>,
}

impl Catalog {
    /// The firmware's built-in rotation.
    pub fn builtin() -> Self {
        let song = |id: &str, title: &str, artist: &str, bpm: (u16, u16), len: u16, path: &str| {
            CatalogItem {
                id: id.into(),
                title: title.into(),
                artist: artist.into(),
                bpm_min: bpm.0,
                bpm_max: bpm.1,
                length_seconds: len,
                jacket_path: path.into(),
            }
        };
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            items: vec![
                song(
                    "000001",
                    "ACROSS WORLD",
                    "Royz",
                    (185, 185),
                    106,
                    "sm/2013/ACROSS%20WORLD/ACROSS%20WORLD-jacket.png",
                ),
                song("001092", "A", "D.J.Amuro", (93, 186), 128, "sm/EX/A/A-jacket.png"),
                song(
                    "000492",
                    "ACE FOR ACES",
                    "TAG",
                    (150, 150),
                    112,
                    "sm/A/ACE%20FOR%20ACES/ACE%20FOR%20ACES-jacket.png",
                ),
            ],
        }
    }

    /// Load a catalog from its JSON form.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|err| crate::Error::Catalog(err.to_string()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogItem> {
        self.items.iter()
    }
}

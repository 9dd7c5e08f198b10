//! Request classification for the fetch interception path.
//!
//! The worker only caches requests that match a tile or static-asset
//! pattern; everything else passes straight through to the network. Tile
//! URLs are reduced to a canonical signature so mirror subdomains
//! (`a.tile…`, `b.tile…`) share one cache entry.

use regex::Regex;

use crate::coord::{TileCoord, MAX_ZOOM, MIN_ZOOM};

/// Default pattern for slippy-map tile URLs: `…/{z}/{x}/{y}.png`.
const DEFAULT_TILE_PATTERN: &str = r"/(\d{1,2})/(\d+)/(\d+)(?:@2x)?\.(?:png|jpe?g|webp)(?:\?.*)?$";

/// Default pattern for static map assets (pre-rendered snapshots).
const DEFAULT_STATIC_PATTERN: &str = r"/static[-_]?map|/map[-_]?snapshots?/";

/// Classification of an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestClass {
    /// A map tile; carries the parsed coordinate and its cache key.
    Tile(TileCoord),
    /// A static map asset; carries its cache key.
    Static(String),
    /// Not cacheable; forward to network.
    Passthrough,
}

/// Matches request URLs against tile and static-asset patterns.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    tile_pattern: Regex,
    static_pattern: Regex,
}

impl RequestClassifier {
    /// Build a classifier with the default slippy-map patterns.
    pub fn new() -> Self {
        Self::with_patterns(DEFAULT_TILE_PATTERN, DEFAULT_STATIC_PATTERN)
            .expect("default patterns are valid")
    }

    /// Build a classifier with custom patterns.
    ///
    /// The tile pattern must capture zoom, column (x), and row (y) as its
    /// first three groups.
    pub fn with_patterns(tile: &str, static_asset: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            tile_pattern: Regex::new(tile)?,
            static_pattern: Regex::new(static_asset)?,
        })
    }

    /// Classify a request URL.
    ///
    /// Tile URLs with an out-of-range zoom are passed through rather than
    /// rejected; the worker never fails a request over classification.
    pub fn classify(&self, url: &str) -> RequestClass {
        if let Some(captures) = self.tile_pattern.captures(url) {
            let parsed = (
                captures.get(1).and_then(|m| m.as_str().parse::<u8>().ok()),
                captures.get(2).and_then(|m| m.as_str().parse::<u32>().ok()),
                captures.get(3).and_then(|m| m.as_str().parse::<u32>().ok()),
            );
            if let (Some(zoom), Some(col), Some(row)) = parsed {
                if (MIN_ZOOM..=MAX_ZOOM).contains(&zoom) {
                    return RequestClass::Tile(TileCoord { row, col, zoom });
                }
            }
            return RequestClass::Passthrough;
        }

        if self.static_pattern.is_match(url) {
            return RequestClass::Static(static_key(url));
        }

        RequestClass::Passthrough
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical cache key for a tile.
///
/// Format: `tile:{zoom}:{row}:{col}`, e.g. `tile:15:5279:12754`.
pub fn tile_key(tile: &TileCoord) -> String {
    format!("tile:{}:{}:{}", tile.zoom, tile.row, tile.col)
}

/// Canonical cache key for a static asset: the URL minus any query string.
pub fn static_key(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    format!("static:{}", path)
}

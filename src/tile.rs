//! Tile manager: decides when to request a hi-res tile, debounces, and
//! tracks freshness in a bounded, LRU-evicted cache.

use crate::concurrency::Yielder;
use crate::error::Error;
use crate::pcm::PcmBuffer;
use crate::spectrogram::Spectrogram;
use crate::token::{Token, TokenSource};
use crate::view::View;
use std::collections::HashMap;

const CACHE_TOLERANCE_SECS: f64 = 1.0 / 60.0;

/// Byte cap on cached hi-res tile data, mirroring the teacher's
/// `tile_cache.rs` `MAX_BYTES` budget for rendered tiles.
const MAX_CACHE_BYTES: usize = 120 * 1024 * 1024;

/// Cache key: the load generation a tile was built against, plus the hop
/// size (resolution) it was built at. Keeps tiles from a previous file load
/// from ever being mistaken for a current one even if a generation number
/// were somehow reused.
type TileKey = (u64, usize);

fn tile_bytes(spectrogram: &Spectrogram) -> usize {
    spectrogram.data().len() * std::mem::size_of::<f32>()
}

/// Abstracts over the CPU and optional GPU builders so the tile manager's
/// policy doesn't care which one actually ran.
pub trait SpectrogramBuilder {
    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        pcm: &PcmBuffer,
        start_seconds: f64,
        duration_seconds: f64,
        hop_size: usize,
        fft_size: usize,
        min_db: f32,
        token: Token,
        tokens: &TokenSource,
        yielder: &dyn Yielder,
    ) -> Result<Spectrogram, Error>;
}

/// LRU-ordered, byte-budgeted secondary cache of hi-res tiles, keyed by
/// `(generation, hop_target)`. Only one tile is "active" (driving the
/// renderer) at a time, but others stay cached so re-zooming back to a
/// previously visited resolution doesn't force a rebuild.
struct TileCache {
    tiles: HashMap<TileKey, Spectrogram>,
    /// Front = least recently used.
    lru: Vec<TileKey>,
    total_bytes: usize,
}

impl TileCache {
    fn new() -> Self {
        Self { tiles: HashMap::new(), lru: Vec::new(), total_bytes: 0 }
    }

    fn get(&self, key: &TileKey) -> Option<&Spectrogram> {
        self.tiles.get(key)
    }

    fn touch(&mut self, key: &TileKey) {
        self.lru.retain(|k| k != key);
        self.lru.push(*key);
    }

    fn insert(&mut self, key: TileKey, spectrogram: Spectrogram) {
        let bytes = tile_bytes(&spectrogram);
        if let Some(old) = self.tiles.remove(&key) {
            self.total_bytes = self.total_bytes.saturating_sub(tile_bytes(&old));
            self.lru.retain(|k| k != &key);
        }
        while self.total_bytes + bytes > MAX_CACHE_BYTES && !self.lru.is_empty() {
            let oldest = self.lru.remove(0);
            if let Some(evicted) = self.tiles.remove(&oldest) {
                self.total_bytes = self.total_bytes.saturating_sub(tile_bytes(&evicted));
            }
        }
        self.total_bytes += bytes;
        self.tiles.insert(key, spectrogram);
        self.lru.push(key);
    }

    fn clear(&mut self) {
        self.tiles.clear();
        self.lru.clear();
        self.total_bytes = 0;
    }
}

pub struct TileManager {
    full: Option<Spectrogram>,
    cache: TileCache,
    active_key: Option<TileKey>,
    generation: u64,
    hi_res_pending: bool,
    last_request_ms: f64,
    debounce_ms: f64,
    tokens: TokenSource,
}

impl TileManager {
    pub fn new(debounce_ms: f64) -> Self {
        Self {
            full: None,
            cache: TileCache::new(),
            active_key: None,
            generation: 0,
            hi_res_pending: false,
            last_request_ms: f64::NEG_INFINITY,
            debounce_ms,
            tokens: TokenSource::new(),
        }
    }

    pub fn tokens(&self) -> &TokenSource {
        &self.tokens
    }

    /// Bumps the latest-token counter on every new request and on file
    /// reload, and returns the new token for the caller to build
    /// against.
    pub fn next_token(&self) -> Token {
        self.tokens.bump()
    }

    /// Installs a freshly built full-track spectrogram, invalidating any
    /// cached hi-res tiles from the prior load. The caller is expected to
    /// have built it against a token obtained from [`Self::next_token`].
    pub fn install_full_track(&mut self, spectrogram: Spectrogram) {
        self.full = Some(spectrogram);
        self.cache.clear();
        self.active_key = None;
        self.generation += 1;
        self.hi_res_pending = false;
    }

    pub fn full_track(&self) -> Option<&Spectrogram> {
        self.full.as_ref()
    }

    /// The currently active hi-res tile, if any.
    pub fn hi_res(&self) -> Option<&Spectrogram> {
        self.active_key.as_ref().and_then(|k| self.cache.get(k))
    }

    /// Whichever spectrogram should drive rendering right now: the active
    /// hi-res tile if one is installed, else the full-track spectrogram.
    pub fn active(&self) -> Option<&Spectrogram> {
        self.hi_res().or(self.full.as_ref())
    }

    pub fn clear(&mut self) {
        self.tokens.bump();
        self.full = None;
        self.cache.clear();
        self.active_key = None;
        self.generation += 1;
        self.hi_res_pending = false;
    }

    /// Decides whether a view change warrants a fresh hi-res tile, and runs
    /// it if so. Returns `true` if the active tile changed (renderer should
    /// repaint).
    pub fn on_view_changed(
        &mut self,
        view: &View,
        pcm: &PcmBuffer,
        now_ms: f64,
        min_db: f32,
        builder: &dyn SpectrogramBuilder,
        yielder: &dyn Yielder,
    ) -> bool {
        let Some(full) = &self.full else { return false };
        let sample_rate = full.sample_rate();
        let total_duration = pcm.total_duration();
        let pps = view.pixels_per_second(sample_rate);

        let time_per_step_full = full.hop_size() as f64 / sample_rate as f64;
        let warranted = time_per_step_full > 0.8 / pps;
        if !warranted {
            return false;
        }

        let hop_target = floor_pow2((sample_rate as f64 / pps) as usize).clamp(32, 4096);
        let key = (self.generation, hop_target);

        if let Some(cached) = self.cache.get(&key) {
            if covers(cached, view) {
                self.cache.touch(&key);
                let changed = self.active_key != Some(key);
                self.active_key = Some(key);
                return changed;
            }
        }

        if self.hi_res_pending || now_ms - self.last_request_ms < self.debounce_ms {
            return false;
        }

        let expanded_start =
            (view.view_start - 0.25 * view.view_duration).clamp(0.0, (total_duration - view.view_duration).max(0.0));
        let expanded_duration = (1.5 * view.view_duration).min(total_duration);

        let token = self.tokens.bump();
        self.hi_res_pending = true;
        self.last_request_ms = now_ms;

        let result = builder.build(
            pcm,
            expanded_start,
            expanded_duration,
            hop_target,
            full.fft_size(),
            min_db,
            token,
            &self.tokens,
            yielder,
        );

        self.hi_res_pending = false;

        match result {
            Ok(spectrogram) if self.tokens.is_current(token) => {
                self.cache.insert(key, spectrogram);
                self.active_key = Some(key);
                true
            }
            Ok(_) => false, // superseded before install; discard
            Err(Error::Cancelled) => false,
            Err(err) => {
                log::warn!("hi-res tile build failed: {err}");
                false
            }
        }
    }
}

fn floor_pow2(n: usize) -> usize {
    if n == 0 {
        return 1;
    }
    1usize << (usize::BITS - 1 - n.leading_zeros())
}

fn covers(hi_res: &Spectrogram, view: &View) -> bool {
    let covers_start = hi_res.slice_start() <= view.view_start + CACHE_TOLERANCE_SECS;
    let covers_end = hi_res.slice_start() + hi_res.slice_duration()
        >= view.view_start + view.view_duration - CACHE_TOLERANCE_SECS;
    covers_start && covers_end
}

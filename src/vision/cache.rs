//! In-memory result cache
//!
//! Keys are digests of the image prefix plus the resolved options, values are
//! raw recognition results (text and whether the upload was compressed). When full, the oldest inserted entry goes first;
//! reads do not refresh an entry's position.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::client::OcrResult;
use super::options::ResolvedOptions;
use crate::capture::ImagePayload;

/// Characters of the base64 payload that go into the key. Image containers
/// start with long identical headers, so the prefix has to reach well into
/// the pixel data.
const KEY_PREFIX_CHARS: usize = 1 << 20;

/// Default number of cached results
pub const DEFAULT_CAPACITY: usize = 30;

/// Digest identifying an (image, options) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// SHA-256 over the leading image data and the option set
pub fn cache_key(image: &ImagePayload, options: &ResolvedOptions) -> CacheKey {
    digest_key(image, options, KEY_PREFIX_CHARS)
}

fn digest_key(image: &ImagePayload, options: &ResolvedOptions, prefix_chars: usize) -> CacheKey {
    // Base64 is ASCII, so byte and char offsets agree
    let data = image.base64_data();
    let prefix = &data[..data.len().min(prefix_chars)];

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    for part in [
        options.field_type.as_str(),
        options.language.as_str(),
        options.mode.as_str(),
        options.model.as_str(),
    ] {
        hasher.update([0u8]);
        hasher.update(part.as_bytes());
    }

    let digest = hasher.finalize();
    CacheKey(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

struct CacheState {
    entries: HashMap<CacheKey, OcrResult>,
    order: VecDeque<CacheKey>,
}

/// Bounded result cache with insertion-order eviction
pub struct ResultCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<OcrResult> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Insert or overwrite; overwriting keeps the original position
    pub fn set(&self, key: CacheKey, result: OcrResult) {
        let mut state = self.state.lock();

        if let Some(existing) = state.entries.get_mut(&key) {
            *existing = result;
            return;
        }

        while state.order.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                debug!("Evicted cache entry {}", &oldest.as_str()[..12]);
            }
        }

        state.order.push_back(key.clone());
        state.entries.insert(key, result);
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

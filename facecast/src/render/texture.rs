use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::error::TextureError;
use crate::framework::pixels::Pixels;

/// Stable handle for a managed texture. Ids are never reused, so a handle
/// released earlier stays invalid for the life of the process.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct TextureId(u64);

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

impl TextureId {
    fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Graphics-API side of texture storage. Every call must come from the
/// thread that owns the GPU context.
pub trait TextureBackend {
    type Texture: Clone;

    fn allocate(
        &self,
        label: &str,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Self::Texture;

    /// Overwrites the full contents of an existing allocation.
    fn write(
        &self,
        texture: &Self::Texture,
        width: u32,
        height: u32,
        pixels: &[u8],
    );

    fn free(&self, _texture: Self::Texture) {}
}

/// What a `create_or_get` loader produces.
pub enum TextureSource {
    Pixels(Pixels),
    Blank { width: u32, height: u32 },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub source_key: Option<String>,
}

struct Entry<T> {
    texture: T,
    info: TextureInfo,
}

struct Registry<T> {
    entries: HashMap<TextureId, Entry<T>>,
    by_key: HashMap<String, TextureId>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            by_key: HashMap::new(),
        }
    }
}

pub struct TextureManager<B: TextureBackend> {
    backend: B,
    registry: Mutex<Registry<B::Texture>>,
}

impl<B: TextureBackend> TextureManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the texture registered under `source_key`, or runs `loader`
    /// and registers its result. An empty key never hits the cache.
    ///
    /// The registry stays locked while `loader` runs so concurrent requests
    /// for one key resolve to a single allocation.
    pub fn create_or_get<F>(
        &self,
        source_key: &str,
        loader: F,
    ) -> Result<TextureId, TextureError>
    where
        F: FnOnce() -> Result<TextureSource, String>,
    {
        let mut registry = self.registry.lock();

        if !source_key.is_empty() {
            if let Some(id) = registry.by_key.get(source_key) {
                return Ok(*id);
            }
        }

        let source = loader().map_err(|reason| {
            error!("failed to load texture '{}': {}", source_key, reason);
            TextureError::LoadFailure {
                key: source_key.to_string(),
                reason,
            }
        })?;

        let (width, height, pixels) = match &source {
            TextureSource::Pixels(pixels) => {
                (pixels.width(), pixels.height(), Some(pixels.data()))
            }
            TextureSource::Blank { width, height } => (*width, *height, None),
        };

        if width == 0 || height == 0 {
            return Err(TextureError::InvalidDimensions { width, height });
        }

        let label = if source_key.is_empty() {
            "facecast-dynamic-texture"
        } else {
            source_key
        };
        let texture = self.backend.allocate(label, width, height, pixels);
        let id = TextureId::next();
        let key = (!source_key.is_empty()).then(|| source_key.to_string());

        if let Some(key) = key.as_ref() {
            registry.by_key.insert(key.clone(), id);
        }
        registry.entries.insert(
            id,
            Entry {
                texture,
                info: TextureInfo {
                    width,
                    height,
                    source_key: key,
                },
            },
        );

        debug!(
            "created texture {:?} ({}x{}) for '{}'",
            id, width, height, label
        );

        Ok(id)
    }

    /// Allocates uninitialised storage for dynamically filled textures.
    pub fn create_blank(
        &self,
        width: u32,
        height: u32,
    ) -> Result<TextureId, TextureError> {
        if width == 0 || height == 0 {
            warn!("refusing to create blank {}x{} texture", width, height);
            return Err(TextureError::InvalidDimensions { width, height });
        }

        self.create_or_get("", || Ok(TextureSource::Blank { width, height }))
    }

    /// Replaces the contents of `id` in place. The allocation is never
    /// resized, so the incoming frame must match it exactly.
    pub fn update_region(
        &self,
        id: TextureId,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), TextureError> {
        let registry = self.registry.lock();
        let entry = registry
            .entries
            .get(&id)
            .ok_or(TextureError::NotFound(id))?;

        let expected_len =
            width as usize * height as usize * Pixels::BYTES_PER_PIXEL;
        if entry.info.width != width
            || entry.info.height != height
            || pixels.len() != expected_len
        {
            let err = TextureError::DimensionMismatch {
                width: entry.info.width,
                height: entry.info.height,
                got_width: width,
                got_height: height,
                got_len: pixels.len(),
            };
            warn!("{}", err);
            return Err(err);
        }

        self.backend.write(&entry.texture, width, height, pixels);
        Ok(())
    }

    pub fn texture(&self, id: TextureId) -> Option<B::Texture> {
        self.registry
            .lock()
            .entries
            .get(&id)
            .map(|entry| entry.texture.clone())
    }

    pub fn info(&self, id: TextureId) -> Option<TextureInfo> {
        self.registry
            .lock()
            .entries
            .get(&id)
            .map(|entry| entry.info.clone())
    }

    pub fn lookup(&self, source_key: &str) -> Option<TextureId> {
        self.registry.lock().by_key.get(source_key).copied()
    }

    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn release(&self, id: TextureId) {
        let mut registry = self.registry.lock();
        let Some(entry) = registry.entries.remove(&id) else {
            return;
        };
        if let Some(key) = entry.info.source_key.as_ref() {
            registry.by_key.remove(key);
        }
        self.backend.free(entry.texture);
    }

    pub fn release_key(&self, source_key: &str) {
        let mut registry = self.registry.lock();
        let Some(id) = registry.by_key.remove(source_key) else {
            return;
        };
        if let Some(entry) = registry.entries.remove(&id) {
            self.backend.free(entry.texture);
        }
    }

    pub fn release_all(&self) {
        let mut registry = self.registry.lock();
        registry.by_key.clear();
        let count = registry.entries.len();
        for (_, entry) in registry.entries.drain() {
            self.backend.free(entry.texture);
        }
        debug!("released {} textures", count);
    }
}

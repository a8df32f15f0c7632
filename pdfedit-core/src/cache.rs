use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::{PdfEngine, RenderImage, SourceDocument};
use crate::error::{EditError, EditResult};
use crate::pages::{PageId, Rotation};

pub fn source_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

/// Open source documents keyed by [`source_key`].
///
/// The host document is pinned for the lifetime of the cache. Other sources are
/// kept in least-recently-used order and evicted past `capacity`; eviction only
/// drops the cache's reference, so a handle an operation is still holding stays
/// open until that operation releases it.
pub struct HandleCache {
    engine: Arc<dyn PdfEngine>,
    host_key: PathBuf,
    host: Arc<dyn SourceDocument>,
    capacity: usize,
    external: Mutex<Vec<(PathBuf, Arc<dyn SourceDocument>)>>,
}

impl HandleCache {
    pub fn open(engine: Arc<dyn PdfEngine>, host_path: &Path, capacity: usize) -> EditResult<Self> {
        let host_key = source_key(host_path);
        let host = engine
            .open(&host_key)
            .map_err(|err| EditError::source_open(&host_key, err))?;
        Ok(Self {
            engine,
            host_key,
            host,
            capacity: capacity.max(1),
            external: Mutex::new(Vec::new()),
        })
    }

    pub fn engine(&self) -> &Arc<dyn PdfEngine> {
        &self.engine
    }

    pub fn host_key(&self) -> &Path {
        &self.host_key
    }

    pub fn host(&self) -> &Arc<dyn SourceDocument> {
        &self.host
    }

    pub fn get(&self, key: &Path) -> EditResult<Arc<dyn SourceDocument>> {
        if let Some(handle) = self.peek(key) {
            return Ok(handle);
        }

        let handle = self
            .engine
            .open(key)
            .map_err(|err| EditError::source_open(key, err))?;

        let mut external = self.external.lock();
        external.push((key.to_path_buf(), Arc::clone(&handle)));
        while external.len() > self.capacity {
            let (evicted, _) = external.remove(0);
            debug!(path = %evicted.display(), "evicting source handle");
        }
        Ok(handle)
    }

    pub fn peek(&self, key: &Path) -> Option<Arc<dyn SourceDocument>> {
        if key == self.host_key {
            return Some(Arc::clone(&self.host));
        }
        let mut external = self.external.lock();
        let position = external.iter().position(|(path, _)| path == key)?;
        let entry = external.remove(position);
        let handle = Arc::clone(&entry.1);
        external.push(entry);
        Some(handle)
    }

    pub fn external_len(&self) -> usize {
        self.external.lock().len()
    }

    pub fn clear(&self) {
        self.external.lock().clear();
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    page: PageId,
    rotation: Rotation,
    scale_milli: u32,
}

impl CacheKey {
    fn new(page: PageId, rotation: Rotation, scale: f32) -> Self {
        Self {
            page,
            rotation,
            scale_milli: quantize_scale(scale),
        }
    }
}

/// Rendered pages keyed by page id, rotation and scale.
///
/// Past `capacity`, entries whose page is currently farthest from the cursor
/// are dropped; pages no longer in the list go first.
pub struct RenderCache {
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, RenderImage>>,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, page: PageId, rotation: Rotation, scale: f32) -> Option<RenderImage> {
        self.entries
            .lock()
            .get(&CacheKey::new(page, rotation, scale))
            .cloned()
    }

    pub fn store<F>(
        &self,
        page: PageId,
        rotation: Rotation,
        scale: f32,
        image: &RenderImage,
        cursor: usize,
        position_of: F,
    ) where
        F: Fn(PageId) -> Option<usize>,
    {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        entries.insert(CacheKey::new(page, rotation, scale), image.clone());

        if entries.len() > self.capacity {
            let mut keys: Vec<_> = entries
                .keys()
                .map(|key| {
                    let distance = position_of(key.page)
                        .map_or(usize::MAX, |position| position.abs_diff(cursor));
                    (*key, distance)
                })
                .collect();
            keys.sort_by_key(|(_, distance)| *distance);
            for (stale, _) in keys.into_iter().skip(self.capacity) {
                entries.remove(&stale);
            }
        }
    }

    pub fn forget(&self, pages: &HashSet<PageId>) {
        self.entries
            .lock()
            .retain(|key, _| !pages.contains(&key.page));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn quantize_scale(scale: f32) -> u32 {
    let scaled = (scale * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}

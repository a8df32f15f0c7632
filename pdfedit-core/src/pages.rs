use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::cache::{source_key, HandleCache, RenderCache};
use crate::config::Config;
use crate::engine::{PageSize, PdfEngine, RasterRequest, RenderImage, SourceDocument};
use crate::error::{EditError, EditResult};
use crate::selection::Selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub(crate) u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rotation(u16);

impl Rotation {
    pub const NONE: Rotation = Rotation(0);

    pub fn from_degrees(degrees: i32) -> EditResult<Self> {
        Self::NONE.rotated(degrees)
    }

    pub fn rotated(self, delta: i32) -> EditResult<Self> {
        if delta % 90 != 0 {
            return Err(EditError::InvalidRotation(delta));
        }
        let degrees = (i64::from(self.0) + i64::from(delta)).rem_euclid(360);
        Ok(Rotation(degrees as u16))
    }

    pub fn degrees(self) -> u16 {
        self.0
    }

    pub fn is_sideways(self) -> bool {
        self.0 == 90 || self.0 == 270
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageReference {
    pub id: PageId,
    pub source: PathBuf,
    pub source_page_index: usize,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePosition {
    Start,
    End,
    After(usize),
}

impl FromStr for MergePosition {
    type Err = EditError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "start" => Ok(MergePosition::Start),
            "end" => Ok(MergePosition::End),
            other => other
                .parse()
                .map(MergePosition::After)
                .map_err(|_| EditError::InvalidMergePosition(trimmed.to_owned())),
        }
    }
}

impl MergePosition {
    fn offset(self, len: usize) -> EditResult<usize> {
        match self {
            MergePosition::Start => Ok(0),
            MergePosition::End => Ok(len),
            MergePosition::After(k) if k <= len => Ok(k),
            MergePosition::After(k) => Err(EditError::InvalidMergePosition(k.to_string())),
        }
    }
}

pub struct DocumentView {
    pub(crate) config: Config,
    pub(crate) pages: Vec<PageReference>,
    pub(crate) current_index: usize,
    pub(crate) zoom: f32,
    next_id: u64,
    pub(crate) sources: HandleCache,
    pub(crate) renders: RenderCache,
}

impl DocumentView {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(engine: Arc<dyn PdfEngine>, path: &Path, config: Config) -> EditResult<Self> {
        let sources = HandleCache::open(engine, path, config.handle_cache_capacity)?;
        let host_key = sources.host_key().to_path_buf();
        let page_count = sources.host().page_count();

        let mut view = Self {
            zoom: config.clamp_zoom(config.default_zoom),
            renders: RenderCache::new(config.render_cache_capacity),
            config,
            pages: Vec::with_capacity(page_count),
            current_index: 0,
            next_id: 0,
            sources,
        };
        let pages = view.fresh_references(&host_key, page_count);
        view.pages = pages;
        info!(pages = page_count, "opened document");
        Ok(view)
    }

    pub fn host_path(&self) -> &Path {
        self.sources.host_key()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn PdfEngine> {
        self.sources.engine()
    }

    pub fn sources(&self) -> &HandleCache {
        &self.sources
    }

    pub fn pages(&self) -> &[PageReference] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn ids(&self) -> Vec<PageId> {
        self.pages.iter().map(|page| page.id).collect()
    }

    pub fn page(&self, id: PageId) -> Option<&PageReference> {
        self.pages.iter().find(|page| page.id == id)
    }

    pub fn position_of(&self, id: PageId) -> Option<usize> {
        self.pages.iter().position(|page| page.id == id)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_page(&self) -> Option<&PageReference> {
        self.pages.get(self.current_index)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn is_local(&self, page: &PageReference) -> bool {
        page.source == self.host_path()
    }

    pub fn ids_for(&self, selection: &Selection) -> Vec<PageId> {
        selection
            .resolve(self.pages.len())
            .into_iter()
            .map(|idx| self.pages[idx].id)
            .collect()
    }

    pub fn set_current_index(&mut self, index: usize) -> bool {
        let next = index.min(self.pages.len().saturating_sub(1));
        let changed = next != self.current_index;
        self.current_index = next;
        changed
    }

    #[instrument(skip_all, fields(requested = ids.len()))]
    pub fn delete(&mut self, ids: &[PageId]) -> usize {
        let doomed: HashSet<PageId> = ids.iter().copied().collect();
        if doomed.is_empty() {
            return 0;
        }
        let anchor = self.anchor();
        let before = self.pages.len();
        self.pages.retain(|page| !doomed.contains(&page.id));
        self.renders.forget(&doomed);
        self.retarget_cursor(anchor);
        let removed = before - self.pages.len();
        debug!(removed, "deleted pages");
        removed
    }

    pub fn rotate(&mut self, ids: &[PageId], delta: i32) -> EditResult<usize> {
        Rotation::NONE.rotated(delta)?;
        let targets: HashSet<PageId> = ids.iter().copied().collect();
        let mut rotated = 0;
        for page in self.pages.iter_mut().filter(|page| targets.contains(&page.id)) {
            page.rotation = page.rotation.rotated(delta)?;
            rotated += 1;
        }
        debug!(rotated, delta, "rotated pages");
        Ok(rotated)
    }

    pub fn rotate_current(&mut self, delta: i32) -> EditResult<bool> {
        match self.current_page().map(|page| page.id) {
            Some(id) => Ok(self.rotate(&[id], delta)? > 0),
            None => Ok(false),
        }
    }

    #[instrument(skip_all, fields(requested = ids.len()))]
    pub fn duplicate(&mut self, ids: &[PageId]) -> Vec<PageId> {
        let targets: HashSet<PageId> = ids.iter().copied().collect();
        if targets.is_empty() {
            return Vec::new();
        }
        let anchor = self.anchor();
        let mut pages = Vec::with_capacity(self.pages.len() + targets.len());
        let mut copies = Vec::new();
        for page in std::mem::take(&mut self.pages) {
            let copy = targets.contains(&page.id).then(|| PageReference {
                id: self.allocate_id(),
                ..page.clone()
            });
            pages.push(page);
            if let Some(copy) = copy {
                copies.push(copy.id);
                pages.push(copy);
            }
        }
        self.pages = pages;
        self.retarget_cursor(anchor);
        debug!(copies = copies.len(), "duplicated pages");
        copies
    }

    /// Splices every page of `source` into the list at `position`.
    ///
    /// The position is checked before the file is opened; when opening fails
    /// the list is left untouched.
    #[instrument(skip_all, fields(source = %source.display(), ?position))]
    pub fn merge(&mut self, source: &Path, position: MergePosition) -> EditResult<Vec<PageId>> {
        let offset = position.offset(self.pages.len())?;
        let key = source_key(source);
        let handle = self.sources.get(&key)?;
        let page_count = handle.page_count();

        let anchor = self.anchor();
        let merged = self.fresh_references(&key, page_count);
        let ids = merged.iter().map(|page| page.id).collect();
        self.pages.splice(offset..offset, merged);
        self.retarget_cursor(anchor);
        info!(pages = page_count, offset, "merged document");
        Ok(ids)
    }

    pub fn reorder(&mut self, order: &[PageId]) -> EditResult<()> {
        if order.len() != self.pages.len() {
            return Err(EditError::InvalidOrder);
        }
        let mut remaining: Vec<Option<PageReference>> =
            self.pages.iter().cloned().map(Some).collect();
        let mut reordered = Vec::with_capacity(order.len());
        for id in order {
            let slot = remaining
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|page| page.id == *id))
                .ok_or(EditError::InvalidOrder)?;
            reordered.extend(slot.take());
        }

        let anchor = self.anchor();
        self.pages = reordered;
        self.retarget_cursor(anchor);
        Ok(())
    }

    /// Moves the pages in `ids`, keeping their relative order, so that the first
    /// of them lands at position `to` of the resulting list.
    pub fn move_pages(&mut self, ids: &[PageId], to: usize) -> usize {
        let targets: HashSet<PageId> = ids.iter().copied().collect();
        let (moving, mut staying): (Vec<_>, Vec<_>) = self
            .pages
            .iter()
            .cloned()
            .partition(|page| targets.contains(&page.id));
        if moving.is_empty() {
            return 0;
        }

        let anchor = self.anchor();
        let at = to.min(staying.len());
        let moved = moving.len();
        staying.splice(at..at, moving);
        self.pages = staying;
        self.retarget_cursor(anchor);
        moved
    }

    pub fn page_size(&self, page: &PageReference) -> EditResult<PageSize> {
        let source = self.source_for(page)?;
        source
            .page_size(page.source_page_index)
            .map_err(|err| render_error(page, err))
    }

    pub fn render_current(&self) -> EditResult<Option<RenderImage>> {
        match self.current_page() {
            Some(page) => self.render_page(page.id, self.zoom).map(Some),
            None => Ok(None),
        }
    }

    pub fn render_thumbnail(&self, id: PageId) -> EditResult<RenderImage> {
        self.render_page(id, self.config.thumbnail_zoom)
    }

    pub fn render_page(&self, id: PageId, scale: f32) -> EditResult<RenderImage> {
        let position = self
            .position_of(id)
            .ok_or_else(|| EditError::Render {
                path: self.host_path().to_path_buf(),
                page_index: 0,
                source: anyhow::anyhow!("page {} is not part of this document", id),
            })?;
        let page = &self.pages[position];

        if let Some(image) = self.renders.get(page.id, page.rotation, scale) {
            return Ok(image);
        }

        let source = self.source_for(page)?;
        let image = source
            .rasterize(RasterRequest {
                page_index: page.source_page_index,
                scale,
                rotation: page.rotation,
            })
            .map_err(|err| render_error(page, err))?;
        self.renders.store(
            page.id,
            page.rotation,
            scale,
            &image,
            self.current_index,
            |id| self.position_of(id),
        );
        Ok(image)
    }

    pub fn prefetch_neighbors(&self, range: usize, scale: f32) -> EditResult<()> {
        let mut last_error = None;
        for offset in 1..=range {
            let neighbours = [
                self.current_index.checked_sub(offset),
                Some(self.current_index + offset),
            ];
            for position in neighbours.into_iter().flatten() {
                if let Some(page) = self.pages.get(position) {
                    if let Err(err) = self.render_page(page.id, scale) {
                        last_error = Some(err);
                    }
                }
            }
        }
        last_error.map_or(Ok(()), Err)
    }

    pub fn release_resources(&self) {
        self.sources.clear();
        self.renders.clear();
    }

    pub(crate) fn source_for(&self, page: &PageReference) -> EditResult<Arc<dyn SourceDocument>> {
        self.sources.get(&page.source)
    }

    fn allocate_id(&mut self) -> PageId {
        let id = PageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn fresh_references(&mut self, source: &Path, count: usize) -> Vec<PageReference> {
        (0..count)
            .map(|source_page_index| PageReference {
                id: self.allocate_id(),
                source: source.to_path_buf(),
                source_page_index,
                rotation: Rotation::NONE,
            })
            .collect()
    }

    fn anchor(&self) -> Option<PageId> {
        self.current_page().map(|page| page.id)
    }

    fn retarget_cursor(&mut self, anchor: Option<PageId>) {
        match anchor.and_then(|id| self.position_of(id)) {
            Some(position) => self.current_index = position,
            None => {
                self.current_index = self.current_index.min(self.pages.len().saturating_sub(1))
            }
        }
    }
}

pub(crate) fn render_error(page: &PageReference, source: anyhow::Error) -> EditError {
    EditError::Render {
        path: page.source.clone(),
        page_index: page.source_page_index,
        source,
    }
}

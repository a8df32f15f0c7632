use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::pages::Rotation;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn rotated(self, rotation: Rotation) -> Self {
        if rotation.is_sideways() {
            Self {
                width: self.height,
                height: self.width,
            }
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RasterRequest {
    pub page_index: usize,
    pub scale: f32,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }
}

pub trait PdfEngine: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn SourceDocument>>;
    fn create(&self) -> Result<Box<dyn OutputDocument>>;
}

pub trait SourceDocument: Send + Sync {
    fn path(&self) -> &Path;
    fn page_count(&self) -> usize;
    fn page_size(&self, page_index: usize) -> Result<PageSize>;
    fn rasterize(&self, request: RasterRequest) -> Result<RenderImage>;
}

pub trait OutputDocument: Send {
    /// Appends a page of `size` points covered entirely by `image`.
    fn append_page(&mut self, size: PageSize, image: &RenderImage) -> Result<()>;
    fn page_count(&self) -> usize;
    fn save(self: Box<Self>, path: &Path) -> Result<()>;
}

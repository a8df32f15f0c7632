use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{
    OutputDocument, PageSize, PdfEngine, RasterRequest, RenderImage, SourceDocument,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FakePage {
    pub width: f32,
    pub height: f32,
    pub label: String,
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn PdfEngine> {
        Arc::new(self.clone())
    }

    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl PdfEngine for FakeEngine {
    fn open(&self, path: &Path) -> Result<Arc<dyn SourceDocument>> {
        let pages = read_fake_pdf(path)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSource {
            path: path.to_path_buf(),
            pages,
            live: Arc::clone(&self.live),
        }))
    }

    fn create(&self) -> Result<Box<dyn OutputDocument>> {
        Ok(Box::new(FakeOutput { pages: Vec::new() }))
    }
}

struct FakeSource {
    path: PathBuf,
    pages: Vec<FakePage>,
    live: Arc<AtomicUsize>,
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SourceDocument for FakeSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        let page = self
            .pages
            .get(page_index)
            .ok_or_else(|| anyhow!("page {} out of range", page_index))?;
        Ok(PageSize::new(page.width, page.height))
    }

    fn rasterize(&self, request: RasterRequest) -> Result<RenderImage> {
        let page = self
            .pages
            .get(request.page_index)
            .ok_or_else(|| anyhow!("page {} out of range", request.page_index))?;
        let size = PageSize::new(page.width, page.height).rotated(request.rotation);
        let width = ((size.width * request.scale).round() as u32).max(8);
        let height = ((size.height * request.scale).round() as u32).max(8);

        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        let tag = format!("{}@{}", page.label, request.rotation.degrees());
        let len = tag.len().min(pixels.len() - 1);
        pixels[..len].copy_from_slice(&tag.as_bytes()[..len]);

        Ok(RenderImage {
            width,
            height,
            pixels,
        })
    }
}

struct FakeOutput {
    pages: Vec<FakePage>,
}

impl OutputDocument for FakeOutput {
    fn append_page(&mut self, size: PageSize, image: &RenderImage) -> Result<()> {
        let end = image
            .pixels
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(image.pixels.len());
        let label = String::from_utf8_lossy(&image.pixels[..end]).into_owned();
        self.pages.push(FakePage {
            width: size.width,
            height: size.height,
            label,
        });
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn save(self: Box<Self>, path: &Path) -> Result<()> {
        let payload = serde_json::to_vec(&self.pages)?;
        fs::write(path, payload).with_context(|| format!("failed to write {:?}", path))
    }
}

pub fn read_fake_pdf(path: &Path) -> Result<Vec<FakePage>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("{:?} is not a fake pdf", path))
}

pub fn write_fake_pdf(dir: &Path, name: &str, count: usize) -> PathBuf {
    let stem = name.trim_end_matches(".pdf");
    let pages = (0..count)
        .map(|idx| {
            let (width, height) = if idx % 2 == 0 {
                (100.0, 200.0)
            } else {
                (200.0, 100.0)
            };
            FakePage {
                width,
                height,
                label: format!("{stem}{idx}"),
            }
        })
        .collect::<Vec<_>>();
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec(&pages).unwrap()).unwrap();
    path
}

pub fn labels(path: &Path) -> Vec<String> {
    read_fake_pdf(path)
        .unwrap()
        .into_iter()
        .map(|page| page.label)
        .collect()
}

use std::env;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, RgbaImage};
use parking_lot::Mutex;
use pdfedit_core::{
    OutputDocument, PageSize, PdfEngine, RasterRequest, RenderImage, Rotation, SourceDocument,
};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

pub const LIBRARY_ENV: &str = "PDFEDIT_PDFIUM_LIBRARY";

pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
}

impl PdfiumEngine {
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        let pdfium = bind_pdfium(explicit)?;
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

impl PdfEngine for PdfiumEngine {
    #[instrument(skip(self))]
    fn open(&self, path: &Path) -> Result<Arc<dyn SourceDocument>> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, None)
            .with_context(|| format!("failed to open {:?}", path))?;
        // SAFETY: see `detach`; `PdfiumSource` declares `document` before `_pdfium`.
        let document = unsafe { detach(document) };
        let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
        debug!(page_count, "opened pdf");
        Ok(Arc::new(PdfiumSource {
            path: path.to_path_buf(),
            page_count,
            document: Mutex::new(document),
            _pdfium: Arc::clone(&self.pdfium),
        }))
    }

    fn create(&self) -> Result<Box<dyn OutputDocument>> {
        let document = self
            .pdfium
            .create_new_pdf()
            .context("failed to create a new pdf")?;
        // SAFETY: see `detach`; `PdfiumOutput` declares `document` before `_pdfium`.
        let document = unsafe { detach(document) };
        Ok(Box::new(PdfiumOutput {
            document,
            pages: 0,
            _pdfium: Arc::clone(&self.pdfium),
        }))
    }
}

/// Erases the borrow a document holds on the Pdfium bindings.
///
/// # Safety
///
/// The caller must store the returned document in a struct that also owns an
/// `Arc` of the `Pdfium` it came from, declared after the document so that the
/// document is dropped first.
unsafe fn detach(document: PdfDocument<'_>) -> PdfDocument<'static> {
    mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document)
}

struct PdfiumSource {
    path: PathBuf,
    page_count: usize,
    document: Mutex<PdfDocument<'static>>,
    _pdfium: Arc<Pdfium>,
}

impl PdfiumSource {
    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let index: PdfPageIndex = page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
        let document = self.document.lock();
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page_index))?;
        f(&page)
    }
}

impl SourceDocument for PdfiumSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        self.with_page(page_index, |page| {
            Ok(PageSize::new(page.width().value, page.height().value))
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn rasterize(&self, request: RasterRequest) -> Result<RenderImage> {
        self.with_page(request.page_index, |page| {
            let config = PdfRenderConfig::new()
                .scale_page_by_factor(request.scale.max(0.01))
                .rotate(render_rotation(request.rotation), true);
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_index))?;
            let image = bitmap.as_image().to_rgba8();
            Ok(RenderImage {
                width: image.width(),
                height: image.height(),
                pixels: image.into_raw(),
            })
        })
    }
}

struct PdfiumOutput {
    document: PdfDocument<'static>,
    pages: usize,
    _pdfium: Arc<Pdfium>,
}

impl OutputDocument for PdfiumOutput {
    fn append_page(&mut self, size: PageSize, image: &RenderImage) -> Result<()> {
        let pixels = RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
            .ok_or_else(|| {
                anyhow!(
                    "pixel buffer does not hold a {}x{} image",
                    image.width,
                    image.height
                )
            })?;
        let width = PdfPoints::new(size.width);
        let height = PdfPoints::new(size.height);

        let mut page = self
            .document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .context("failed to append page")?;
        page.objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &DynamicImage::ImageRgba8(pixels),
                Some(width),
                Some(height),
            )
            .context("failed to place page image")?;
        self.pages += 1;
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    #[instrument(skip(self))]
    fn save(self: Box<Self>, path: &Path) -> Result<()> {
        self.document
            .save_to_file(path)
            .with_context(|| format!("failed to save {:?}", path))
    }
}

fn render_rotation(rotation: Rotation) -> PdfPageRenderRotation {
    match rotation.degrees() {
        90 => PdfPageRenderRotation::Degrees90,
        180 => PdfPageRenderRotation::Degrees180,
        270 => PdfPageRenderRotation::Degrees270,
        _ => PdfPageRenderRotation::None,
    }
}

fn library_candidates(explicit: Option<&Path>, from_env: Option<PathBuf>) -> Vec<PathBuf> {
    let resolve = |path: PathBuf| {
        if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        }
    };

    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(resolve(path.to_path_buf()));
    }
    if let Some(path) = from_env.filter(|path| !path.as_os_str().is_empty()) {
        candidates.push(resolve(path));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));
    candidates
}

fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium> {
    let mut errors = Vec::new();

    for candidate in library_candidates(explicit, env::var_os(LIBRARY_ENV).map(PathBuf::from)) {
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => {
                debug!(library = %candidate.display(), "bound pdfium");
                return Ok(Pdfium::new(bindings));
            }
            Err(err) => {
                warn!(library = %candidate.display(), %err, "failed to bind pdfium");
                errors.push(format!("{}: {}", candidate.display(), err));
            }
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}

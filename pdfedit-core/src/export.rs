use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::engine::{OutputDocument, RasterRequest, SourceDocument};
use crate::error::{EditError, EditResult};
use crate::pages::{render_error, DocumentView, PageId, PageReference};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub pages: usize,
    pub destination: PathBuf,
}

impl DocumentView {
    pub fn export(&self, ids: &[PageId], destination: &Path) -> EditResult<ExportReport> {
        export_pages(self, ids, destination, self.config.export_scale)
    }

    pub fn save(&self, destination: &Path) -> EditResult<ExportReport> {
        self.export(&self.ids(), destination)
    }
}

/// Rasterizes the pages in `ids` into a new document at `destination`.
/// Nothing is written when no id is in the view; otherwise the file appears
/// at `destination` only once it is complete.
#[instrument(skip_all, fields(destination = %destination.display(), requested = ids.len()))]
pub fn export_pages(
    view: &DocumentView,
    ids: &[PageId],
    destination: &Path,
    scale: f32,
) -> EditResult<ExportReport> {
    let pages: Vec<&PageReference> = ids.iter().filter_map(|id| view.page(*id)).collect();
    if pages.is_empty() {
        warn!("nothing to export");
        return Ok(ExportReport {
            pages: 0,
            destination: destination.to_path_buf(),
        });
    }

    let mut last_use: HashMap<&Path, usize> = HashMap::new();
    for (position, page) in pages.iter().enumerate() {
        last_use.insert(page.source.as_path(), position);
    }

    let mut output = view
        .engine()
        .create()
        .map_err(|err| write_error(destination, err))?;
    let mut transient: HashMap<&Path, Arc<dyn SourceDocument>> = HashMap::new();

    for (position, page) in pages.iter().enumerate() {
        let source = resolve_source(view, &mut transient, page)?;
        let size = source
            .page_size(page.source_page_index)
            .map_err(|err| render_error(page, err))?
            .rotated(page.rotation);
        let image = source
            .rasterize(RasterRequest {
                page_index: page.source_page_index,
                scale,
                rotation: page.rotation,
            })
            .map_err(|err| render_error(page, err))?;
        output
            .append_page(size, &image)
            .map_err(|err| write_error(destination, err))?;

        if last_use.get(page.source.as_path()) == Some(&position)
            && transient.remove(page.source.as_path()).is_some()
        {
            debug!(source = %page.source.display(), "released export source");
        }
    }

    let written = output.page_count();
    write_atomically(output, destination)?;
    info!(pages = written, "exported document");
    Ok(ExportReport {
        pages: written,
        destination: destination.to_path_buf(),
    })
}

fn resolve_source<'a>(
    view: &DocumentView,
    transient: &mut HashMap<&'a Path, Arc<dyn SourceDocument>>,
    page: &'a PageReference,
) -> EditResult<Arc<dyn SourceDocument>> {
    if let Some(handle) = view.sources().peek(&page.source) {
        return Ok(handle);
    }
    if let Some(handle) = transient.get(page.source.as_path()) {
        return Ok(Arc::clone(handle));
    }
    let handle = view
        .engine()
        .open(&page.source)
        .map_err(|err| EditError::source_open(&page.source, err))?;
    transient.insert(page.source.as_path(), Arc::clone(&handle));
    Ok(handle)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("export"));
    name.push(".partial");
    destination.with_file_name(name)
}

fn write_atomically(output: Box<dyn OutputDocument>, destination: &Path) -> EditResult<()> {
    let partial = partial_path(destination);
    let result = output
        .save(&partial)
        .and_then(|()| fs::rename(&partial, destination).map_err(anyhow::Error::from));
    if let Err(err) = result {
        let _ = fs::remove_file(&partial);
        return Err(write_error(destination, err));
    }
    Ok(())
}

fn write_error(destination: &Path, source: anyhow::Error) -> EditError {
    EditError::DestinationWrite {
        path: destination.to_path_buf(),
        source,
    }
}

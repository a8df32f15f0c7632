pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod pages;
pub mod script;
pub mod selection;
pub mod state;
pub mod viewer;

#[cfg(test)]
pub(crate) mod fake;

pub use cache::{source_key, HandleCache, RenderCache};
pub use config::{project_dirs, Config, CONFIG_FILE_NAME};
pub use engine::{
    OutputDocument, PageSize, PdfEngine, RasterRequest, RenderImage, SourceDocument,
};
pub use error::{EditError, EditResult};
pub use export::{export_pages, ExportReport};
pub use pages::{DocumentView, MergePosition, PageId, PageReference, Rotation};
pub use script::{parse_steps, EditStep};
pub use selection::{select_by_pattern, Selection};
pub use state::{
    document_id_for_path, DocumentId, FileStateStore, MemoryStateStore, StateStore, ViewState,
};
pub use viewer::ViewCommand;
